//! Bus trait abstractions
//!
//! Lets the coordinator run unchanged against `MemoryBus` in tests and a
//! real NATS connection in production.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Stream of deliveries for one subscription. Ends when the connection
/// closes.
pub type Subscription = Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),
}

#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a subject, which may contain `*` (one token) or a
    /// trailing `>` (one or more tokens).
    async fn subscribe(&self, subject: &str) -> BusResult<Subscription>;
}

/// NATS subject matching.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
