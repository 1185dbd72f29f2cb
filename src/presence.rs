//! Presence announcements
//!
//! ```text
//! start ──► AnnouncedNew ──(interval/2)──► Heartbeat ──(interval/2)──► Heartbeat ...
//!           tagged "new"                   untagged, fresh expiry
//! ```
//!
//! Each announcement expires one interval after it is sent, and the next is
//! scheduled half an interval after the previous one completes, so a live
//! participant never appears stale to its peers. `announce_now` publishes a
//! single untagged announcement outside the schedule, used to answer a peer's
//! "new" announcement.

use crate::bus::MessageBus;
use crate::claims::{self, PresenceClaim};
use crate::session::{ProtocolError, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresencePhase {
    /// Nothing sent yet; the next announcement carries the "new" tag
    AnnouncedNew,
    /// Steady state
    Heartbeat,
}

pub struct PresenceScheduler<B: MessageBus> {
    session: Arc<Session<B>>,
}

impl<B: MessageBus> Clone for PresenceScheduler<B> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<B: MessageBus> PresenceScheduler<B> {
    pub fn new(session: Arc<Session<B>>) -> Self {
        Self { session }
    }

    pub fn heartbeat_period(&self) -> Duration {
        self.session.presence_interval() / 2
    }

    /// Sign and publish one presence claim.
    ///
    /// Touches no shared state.
    pub async fn announce(&self, first: bool) -> Result<(), ProtocolError> {
        let now = claims::unix_now();
        let presence = PresenceClaim::new(
            self.session.subject(),
            self.session.display_name(),
            now,
            self.session.presence_interval(),
            first,
        );
        let token = claims::encode(
            &presence.to_claim(now, self.session.audience()),
            self.session.identity().key(),
        )?;

        self.session
            .bus()
            .publish(&self.session.topics().presence(), token.into_bytes())
            .await?;
        debug!(first, "presence announced");
        Ok(())
    }

    /// Immediate untagged announcement; does not disturb the schedule.
    pub async fn announce_now(&self) -> Result<(), ProtocolError> {
        self.announce(false).await
    }

    /// Start the announce loop. Runs until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut phase = PresencePhase::AnnouncedNew;
            loop {
                if let Err(e) = self.announce(phase == PresencePhase::AnnouncedNew).await {
                    warn!("Could not announce presence: {}", e);
                }
                phase = PresencePhase::Heartbeat;
                tokio::time::sleep(self.heartbeat_period()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::claims::{decode, NEW_TAG};
    use crate::identity::test_identity;
    use crate::session::SessionConfig;

    fn session(bus: MemoryBus) -> Arc<Session<MemoryBus>> {
        Arc::new(Session::new(
            test_identity(),
            "alice",
            bus,
            SessionConfig::default(),
        ))
    }

    fn presence_tokens(bus: &MemoryBus) -> Vec<claims::Claim> {
        bus.published_to("chat.demo.online")
            .into_iter()
            .map(|msg| decode(std::str::from_utf8(&msg.payload).unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_announce_publishes_signed_presence() {
        let bus = MemoryBus::new();
        let session = session(bus.clone());
        let scheduler = PresenceScheduler::new(session.clone());

        scheduler.announce(true).await.unwrap();

        let claims = presence_tokens(&bus);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].iss, session.subject());
        assert_eq!(claims[0].name, "alice");
        assert!(claims[0].has_tag(NEW_TAG));
        assert_eq!(claims[0].exp, Some(claims[0].iat + 60));
    }

    #[tokio::test]
    async fn test_announce_now_is_untagged() {
        let bus = MemoryBus::new();
        let scheduler = PresenceScheduler::new(session(bus.clone()));

        scheduler.announce_now().await.unwrap();

        assert!(!presence_tokens(&bus)[0].has_tag(NEW_TAG));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_announce_is_new_then_heartbeats() {
        let bus = MemoryBus::new();
        let scheduler = PresenceScheduler::new(session(bus.clone()));
        let handle = scheduler.spawn();

        // Announcements at t=0, 30s and 60s; stop before 90s.
        tokio::time::sleep(Duration::from_secs(75)).await;
        handle.abort();

        let claims = presence_tokens(&bus);
        assert_eq!(claims.len(), 3);
        assert!(claims[0].has_tag(NEW_TAG));
        assert!(claims[1..].iter().all(|c| !c.has_tag(NEW_TAG)));
    }

    #[test]
    fn test_heartbeat_is_half_the_interval() {
        let scheduler = PresenceScheduler::new(session(MemoryBus::new()));
        assert_eq!(scheduler.heartbeat_period(), Duration::from_secs(30));
    }
}
