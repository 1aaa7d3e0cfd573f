//! Event type for the mesh pipeline.
//!
//! Events are immutable records of a single actor utterance. Producers
//! hand the router and the recorder an [`IncomingEvent`]; the recorder
//! turns it into an [`Event`] with [`EventMetadata`] attached and appends
//! it to the session log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Sentinel used for missing senders, domains and correlation ids.
pub const UNKNOWN: &str = "unknown";

/// Upper bound on payload size accepted for recording.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Default topic when a producer does not name one.
pub const DEFAULT_TOPIC: &str = "general";

/// Decision weight of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Long-term structural decisions
    Architectural,
    /// Discussion, debate, consensus seeking
    Collaborative,
    /// Execution details
    #[default]
    Execution,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Architectural => write!(f, "architectural"),
            Tier::Collaborative => write!(f, "collaborative"),
            Tier::Execution => write!(f, "execution"),
        }
    }
}

/// Metadata attached by the recorder. Producers never populate this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Receipt order within the session log (1-based)
    #[serde(default)]
    pub sequence: u64,

    /// Domain label from the fixed taxonomy
    #[serde(default = "default_domain_tag")]
    pub domain_tag: String,

    /// Decision weight
    #[serde(default)]
    pub tier: Tier,

    /// Pattern-derived labels plus the mandatory `@Domain-<tag>` label
    #[serde(default)]
    pub highlight_tags: Vec<String>,

    /// Domain vocabulary terms found in the payload
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Digest of the normalized payload
    #[serde(default)]
    pub content_hash: String,

    #[serde(default)]
    pub word_count: usize,

    #[serde(default)]
    pub char_count: usize,

    /// Id of an earlier event with the same content hash, if one was seen recently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
}

fn default_domain_tag() -> String {
    UNKNOWN.to_string()
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            sequence: 0,
            domain_tag: default_domain_tag(),
            tier: Tier::default(),
            highlight_tags: Vec::new(),
            keywords: Vec::new(),
            content_hash: String::new(),
            word_count: 0,
            char_count: 0,
            duplicate_of: None,
        }
    }
}

/// A recorded event.
///
/// Timestamps must be non-decreasing per sender for time-gap
/// segmentation to produce meaningful threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque unique identifier (ULID when generated locally)
    pub id: String,

    /// Source timestamp
    pub timestamp: DateTime<Utc>,

    /// Producer identity
    pub sender: String,

    /// Producer role, used by tier classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,

    /// Routing destination
    pub topic: String,

    /// Explicit conversation key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Free text payload
    pub payload: String,

    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an event stamped now with a fresh ULID.
    pub fn new(
        sender: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: Utc::now(),
            sender: sender.into(),
            sender_role: None,
            topic: topic.into(),
            correlation_id: None,
            payload: payload.into(),
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.sender_role = Some(role.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Correlation id usable for explicit grouping.
    ///
    /// Empty strings and the `unknown` sentinel count as absent.
    pub fn grouping_key(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != UNKNOWN)
    }

    /// Serialize event to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize event from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// An event as submitted by a producer.
///
/// Every field except the payload is optional so that loosely written
/// producers can still be recorded. Aliases accept the field names used
/// by the older agent clients (`sender_id`, `message_id`, `context_id`,
/// `content`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(default, alias = "message_id")]
    pub id: Option<String>,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, alias = "sender_id")]
    pub sender: Option<String>,

    #[serde(default)]
    pub sender_role: Option<String>,

    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default, alias = "context_id")]
    pub correlation_id: Option<String>,

    /// Text, or any JSON value which is recorded in its serialized form
    #[serde(alias = "content")]
    pub payload: serde_json::Value,
}

impl IncomingEvent {
    /// Parse an incoming event from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MeshError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Normalize into a recordable [`Event`].
    ///
    /// `route_topic` is the topic the frame travelled on, used when the
    /// producer did not set one. Missing ids and timestamps are filled in
    /// from a fresh ULID and `received_at`.
    pub fn into_event(
        self,
        route_topic: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Result<Event, MeshError> {
        let payload = match self.payload {
            serde_json::Value::String(text) => text,
            serde_json::Value::Null => {
                return Err(MeshError::InvalidInput("payload is null".to_string()))
            }
            other => other.to_string(),
        };

        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(MeshError::InvalidInput(format!(
                "payload of {} bytes exceeds limit of {}",
                payload.len(),
                MAX_PAYLOAD_BYTES
            )));
        }

        let topic = self
            .topic
            .filter(|t| !t.is_empty())
            .or_else(|| route_topic.filter(|t| !t.is_empty()).map(String::from))
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        Ok(Event {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| ulid::Ulid::new().to_string()),
            timestamp: self.timestamp.unwrap_or(received_at),
            sender: self
                .sender
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            sender_role: self.sender_role,
            topic,
            correlation_id: self.correlation_id,
            payload,
            metadata: EventMetadata::default(),
        })
    }
}

impl From<&Event> for IncomingEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: Some(event.id.clone()),
            timestamp: Some(event.timestamp),
            sender: Some(event.sender.clone()),
            sender_role: event.sender_role.clone(),
            topic: Some(event.topic.clone()),
            correlation_id: event.correlation_id.clone(),
            payload: serde_json::Value::String(event.payload.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = Event::new("pm_alpha", "planning", "Hello, world!")
            .with_correlation_id("ctx-1")
            .with_role("Architect");

        let bytes = event.to_bytes().unwrap();
        let decoded = Event::from_bytes(&bytes).unwrap();

        assert_eq!(event, decoded);
    }

    #[test]
    fn test_grouping_key_ignores_sentinel() {
        let event = Event::new("a", "t", "p").with_correlation_id(UNKNOWN);
        assert_eq!(event.grouping_key(), None);

        let event = Event::new("a", "t", "p").with_correlation_id("");
        assert_eq!(event.grouping_key(), None);

        let event = Event::new("a", "t", "p").with_correlation_id("ctx-9");
        assert_eq!(event.grouping_key(), Some("ctx-9"));
    }

    #[test]
    fn test_incoming_accepts_legacy_field_names() {
        let raw = br#"{"message_id":"m-1","sender_id":"gemini_cli","context_id":"ctx-4","content":{"message":"ready"}}"#;
        let incoming = IncomingEvent::from_bytes(raw).unwrap();
        let received = Utc.with_ymd_and_hms(2025, 10, 15, 10, 0, 0).unwrap();
        let event = incoming.into_event(Some("claude_code"), received).unwrap();

        assert_eq!(event.id, "m-1");
        assert_eq!(event.sender, "gemini_cli");
        assert_eq!(event.correlation_id.as_deref(), Some("ctx-4"));
        assert_eq!(event.topic, "claude_code");
        assert_eq!(event.timestamp, received);
        assert_eq!(event.payload, r#"{"message":"ready"}"#);
    }

    #[test]
    fn test_incoming_defaults() {
        let incoming = IncomingEvent::from_bytes(br#"{"payload":"hi"}"#).unwrap();
        let event = incoming.into_event(None, Utc::now()).unwrap();

        assert_eq!(event.sender, UNKNOWN);
        assert_eq!(event.topic, DEFAULT_TOPIC);
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_incoming_rejects_oversized_payload() {
        let incoming = IncomingEvent {
            id: None,
            timestamp: None,
            sender: Some("a".to_string()),
            sender_role: None,
            topic: None,
            correlation_id: None,
            payload: serde_json::Value::String("x".repeat(MAX_PAYLOAD_BYTES + 1)),
        };
        assert!(matches!(
            incoming.into_event(None, Utc::now()),
            Err(MeshError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_incoming_requires_payload() {
        assert!(IncomingEvent::from_bytes(br#"{"sender":"a"}"#).is_err());
        assert!(IncomingEvent::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_tier_serializes_snake_case() {
        let json = serde_json::to_string(&Tier::Architectural).unwrap();
        assert_eq!(json, "\"architectural\"");
        assert_eq!(Tier::default(), Tier::Execution);
    }
}
