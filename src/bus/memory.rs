//! In-process message bus
//!
//! Every handle created with `connect()` shares one hub, like separate
//! clients on one server. `no_echo` handles do not receive their own
//! publishes. All publishes are recorded for assertions.

use super::traits::*;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Clone)]
pub struct MemoryBus {
    hub: Arc<Mutex<Hub>>,
    client_id: u64,
    no_echo: bool,
}

#[derive(Default)]
struct Hub {
    subscribers: Vec<Subscriber>,
    published: Vec<BusMessage>,
    next_client_id: u64,
}

struct Subscriber {
    pattern: String,
    client_id: u64,
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl MemoryBus {
    /// New hub with one connected handle.
    pub fn new() -> Self {
        let hub = Hub {
            next_client_id: 1,
            ..Default::default()
        };
        Self {
            hub: Arc::new(Mutex::new(hub)),
            client_id: 0,
            no_echo: false,
        }
    }

    /// Another client on the same hub.
    pub fn connect(&self) -> Self {
        let mut hub = self.hub.lock().unwrap_or_else(|e| e.into_inner());
        let client_id = hub.next_client_id;
        hub.next_client_id += 1;
        Self {
            hub: self.hub.clone(),
            client_id,
            no_echo: false,
        }
    }

    /// Stop delivering this handle's own publishes back to it.
    pub fn with_no_echo(mut self) -> Self {
        self.no_echo = true;
        self
    }

    /// Every message published on the hub, in order.
    pub fn published(&self) -> Vec<BusMessage> {
        self.hub
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .published
            .clone()
    }

    /// Published messages whose subject matches `pattern`.
    pub fn published_to(&self, pattern: &str) -> Vec<BusMessage> {
        self.published()
            .into_iter()
            .filter(|msg| subject_matches(pattern, &msg.subject))
            .collect()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        if subject.is_empty() || subject.contains(['*', '>', ' ']) {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
        let message = BusMessage {
            subject: subject.to_string(),
            payload,
        };

        let mut hub = self.hub.lock().unwrap_or_else(|e| e.into_inner());
        hub.published.push(message.clone());
        hub.subscribers.retain(|sub| {
            if self.no_echo && sub.client_id == self.client_id {
                return !sub.sender.is_closed();
            }
            if !subject_matches(&sub.pattern, subject) {
                return !sub.sender.is_closed();
            }
            sub.sender.send(message.clone()).is_ok()
        });
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<Subscription> {
        if subject.is_empty() || subject.contains(' ') {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .push(Subscriber {
                pattern: subject.to_string(),
                client_id: self.client_id,
                sender,
            });
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_wildcard_delivery() {
        let bus = MemoryBus::new();
        let mut posts = bus.subscribe("chat.posts.*").await.unwrap();

        bus.publish("chat.posts.general", b"hi".to_vec()).await.unwrap();
        bus.publish("chat.online", b"ignored".to_vec()).await.unwrap();

        let msg = posts.next().await.unwrap();
        assert_eq!(msg.subject, "chat.posts.general");
        assert_eq!(msg.payload, b"hi");
        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn test_no_echo_skips_own_publishes() {
        let alice = MemoryBus::new().with_no_echo();
        let bob = alice.connect();
        let mut alice_sub = alice.subscribe("chat.online").await.unwrap();
        let mut bob_sub = bob.subscribe("chat.online").await.unwrap();

        alice.publish("chat.online", b"alice".to_vec()).await.unwrap();
        bob.publish("chat.online", b"bob".to_vec()).await.unwrap();

        assert_eq!(bob_sub.next().await.unwrap().payload, b"alice");
        assert_eq!(bob_sub.next().await.unwrap().payload, b"bob");
        assert_eq!(alice_sub.next().await.unwrap().payload, b"bob");
    }

    #[tokio::test]
    async fn test_publish_to_wildcard_is_rejected() {
        let bus = MemoryBus::new();
        assert!(matches!(
            bus.publish("chat.*", Vec::new()).await,
            Err(BusError::InvalidSubject(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("chat.online").await.unwrap();
        drop(sub);

        bus.publish("chat.online", Vec::new()).await.unwrap();
        assert!(bus.hub.lock().unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn test_published_to_filters() {
        let bus = MemoryBus::new();
        bus.publish("chat.dms.UALICE", Vec::new()).await.unwrap();
        bus.publish("chat.posts.general", Vec::new()).await.unwrap();

        assert_eq!(bus.published_to("chat.dms.*").len(), 1);
    }
}
