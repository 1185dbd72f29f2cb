//! NATS bus client
//!
//! Thin wrapper over `async-nats`. Authentication uses the same credentials
//! file as the identity; reconnection and buffering are the client's job.
//! The connection is opened with no-echo so we never hear our own publishes.
//!
//! Reconnects are capped at about ten minutes of retrying. Past that the
//! client closes, every subscription ends, and the session exits.

use super::traits::*;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;

/// Connection name reported to the server.
const CONNECTION_NAME: &str = "claimchat";

const MAX_RECONNECTS: usize = 600;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Fixed wait between attempts.
fn reconnect_delay(_attempts: usize) -> Duration {
    RECONNECT_DELAY
}

#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(server: &str, creds: &Path) -> BusResult<Self> {
        let options = async_nats::ConnectOptions::with_credentials_file(creds)
            .await
            .map_err(|e| BusError::Connect(format!("credentials: {e}")))?
            .name(CONNECTION_NAME)
            .no_echo()
            .max_reconnects(MAX_RECONNECTS)
            .reconnect_delay_callback(reconnect_delay)
            .event_callback(|event| async move {
                tracing::info!(%event, "bus connection event");
            });

        let client = options
            .connect(server)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        tracing::info!(server, "connected to bus");

        Ok(Self { client })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> BusResult<Subscription> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        Ok(Box::pin(subscriber.map(|message| BusMessage {
            subject: message.subject.to_string(),
            payload: message.payload.to_vec(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnects_give_up_after_ten_minutes() {
        assert_eq!(reconnect_delay(1), RECONNECT_DELAY);
        assert_eq!(reconnect_delay(MAX_RECONNECTS), RECONNECT_DELAY);

        let window: Duration = (1..=MAX_RECONNECTS).map(reconnect_delay).sum();
        assert_eq!(window, Duration::from_secs(600));
    }
}
