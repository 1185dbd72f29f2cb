//! Shared session state
//!
//! One `Session` per process, shared by `Arc` between the coordinator, the
//! presence scheduler and the UI command loop. It owns the bus handle, the
//! identity and the directory. The directory lock is the only lock in the
//! protocol core; it is never held across an `.await`.

use crate::bus::{BusError, MessageBus, Topics};
use crate::claims::ClaimError;
use crate::directory::Directory;
use crate::identity::Identity;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Could not sign claim: {0}")]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Protocol settings that do not come from the identity.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub prefix: String,
    pub audience: Option<String>,
    pub presence_interval: Duration,
    pub channels: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prefix: "chat.demo".to_string(),
            audience: None,
            presence_interval: Duration::from_secs(60),
            channels: vec!["general".to_string()],
        }
    }
}

pub struct Session<B: MessageBus> {
    identity: Identity,
    display_name: String,
    topics: Topics,
    audience: Option<String>,
    presence_interval: Duration,
    bus: B,
    directory: Mutex<Directory>,
}

impl<B: MessageBus> Session<B> {
    /// The local user is added to its own directory so it can be messaged
    /// like anyone else.
    pub fn new(identity: Identity, display_name: &str, bus: B, config: SessionConfig) -> Self {
        let mut directory = Directory::new(config.channels, config.presence_interval);
        directory.add_user(display_name, identity.subject(), Instant::now());

        Self {
            identity,
            display_name: display_name.to_string(),
            topics: Topics::new(&config.prefix),
            audience: config.audience,
            presence_interval: config.presence_interval,
            bus,
            directory: Mutex::new(directory),
        }
    }

    /// Lock the directory.
    ///
    /// A poisoned lock is recovered: every directory mutation is a single
    /// insert or push, so a panicking holder cannot leave it half-updated.
    pub fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn directory_is_locked(&self) -> bool {
        matches!(
            self.directory.try_lock(),
            Err(std::sync::TryLockError::WouldBlock)
        )
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn subject(&self) -> &str {
        self.identity.subject()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn presence_interval(&self) -> Duration {
        self.presence_interval
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}
