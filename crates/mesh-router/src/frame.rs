//! Wire frames exchanged with the router.
//!
//! Every message travels inside a `LengthDelimitedCodec` frame (u32
//! big-endian length prefix). Inside that:
//!
//! ```text
//! routed frame:   [u16 topic_len][topic bytes][payload bytes]
//! control frame:  [0x01][topic bytes]   subscribe
//!                 [0x00][topic bytes]   unsubscribe
//! ```
//!
//! Routed frames flow publisher -> router -> subscriber unchanged. Control
//! frames flow subscriber -> router only.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::RouterError;

/// Largest frame accepted on any router connection.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const SUBSCRIBE: u8 = 0x01;
const UNSUBSCRIBE: u8 = 0x00;

/// Length-delimited codec with the router's frame limit.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec()
}

/// Wrap a stream in the router's framing.
pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> Framed<T, LengthDelimitedCodec> {
    Framed::new(io, codec())
}

/// A routed frame split into topic and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedFrame {
    pub topic: Bytes,
    pub payload: Bytes,
}

impl RoutedFrame {
    pub fn new(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Encode into a frame body.
    pub fn encode(&self) -> Result<Bytes, RouterError> {
        let topic_len = u16::try_from(self.topic.len())
            .map_err(|_| RouterError::Frame(format!("topic too long: {} bytes", self.topic.len())))?;

        let mut buf = BytesMut::with_capacity(2 + self.topic.len() + self.payload.len());
        buf.put_u16(topic_len);
        buf.put_slice(&self.topic);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Split a frame body. Slices share the original buffer.
    pub fn decode(body: Bytes) -> Result<Self, RouterError> {
        let topic_len = Self::topic_len(&body)?;
        Ok(Self {
            topic: body.slice(2..2 + topic_len),
            payload: body.slice(2 + topic_len..),
        })
    }

    /// Topic of an encoded frame without copying the payload.
    pub fn peek_topic(body: &Bytes) -> Result<Bytes, RouterError> {
        let topic_len = Self::topic_len(body)?;
        Ok(body.slice(2..2 + topic_len))
    }

    pub fn topic_str(&self) -> String {
        String::from_utf8_lossy(&self.topic).into_owned()
    }

    fn topic_len(body: &[u8]) -> Result<usize, RouterError> {
        if body.len() < 2 {
            return Err(RouterError::Frame(format!(
                "frame of {} bytes has no topic header",
                body.len()
            )));
        }
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        if body.len() < 2 + topic_len {
            return Err(RouterError::Frame(format!(
                "topic length {} exceeds frame of {} bytes",
                topic_len,
                body.len()
            )));
        }
        Ok(topic_len)
    }
}

/// Subscription change sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Receive topics starting with this prefix; empty means everything
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

impl ControlFrame {
    pub fn encode(&self) -> Bytes {
        let (kind, topic) = match self {
            ControlFrame::Subscribe(topic) => (SUBSCRIBE, topic),
            ControlFrame::Unsubscribe(topic) => (UNSUBSCRIBE, topic),
        };
        let mut buf = BytesMut::with_capacity(1 + topic.len());
        buf.put_u8(kind);
        buf.put_slice(topic);
        buf.freeze()
    }

    pub fn decode(body: Bytes) -> Result<Self, RouterError> {
        match body.first() {
            Some(&SUBSCRIBE) => Ok(ControlFrame::Subscribe(body.slice(1..))),
            Some(&UNSUBSCRIBE) => Ok(ControlFrame::Unsubscribe(body.slice(1..))),
            Some(other) => Err(RouterError::Frame(format!(
                "unknown control byte 0x{other:02x}"
            ))),
            None => Err(RouterError::Frame("empty control frame".to_string())),
        }
    }
}
