//! TCP connect with exponential backoff.

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::ClientError;

/// How long to keep retrying a connection.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

pub(crate) async fn connect_with_retry(
    addr: &str,
    policy: RetryPolicy,
) -> Result<TcpStream, ClientError> {
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(%addr, attempts, "Connected");
                return Ok(stream);
            }
            Err(e) => match backoff.next_backoff() {
                Some(delay) => {
                    warn!(%addr, error = %e, retry_in_ms = delay.as_millis(), "Connect failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ClientError::Connection {
                        addr: addr.to_string(),
                        source: e,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_gives_up() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let policy = RetryPolicy {
            initial_interval: Duration::from_millis(10),
            max_elapsed: Duration::from_millis(100),
        };
        let result = connect_with_retry(&addr, policy).await;
        assert!(matches!(result, Err(ClientError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_connect_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        assert!(connect_with_retry(&addr, RetryPolicy::once()).await.is_ok());
    }
}
