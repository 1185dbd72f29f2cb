//! Protocol coordinator
//!
//! One method per inbound event kind, plus the outbound send path. Each
//! inbound message goes through the same steps:
//!
//! ```text
//! decode + verify ──► validate ──► dedup + mutate (directory lock) ──► render
//!      │                 │                 │
//!      └── warn, drop ───┴── warn, drop ───┴── debug, drop
//! ```
//!
//! Publishing always happens after the directory guard is dropped. Render
//! requests that depend on conversation contents are queued while the guard
//! is held, so they stay in step with the snapshots `show` takes.
//! `Ui::request_render` only enqueues.

use crate::bus::{topics::is_valid_channel, BusMessage, BusResult, MessageBus, Subscription};
use crate::claims::{self, Claim, ClaimError, PostClaim, PresenceClaim};
use crate::directory::{short_subject, Directory, UserSummary, View};
use crate::identity::display_name;
use crate::presence::PresenceScheduler;
use crate::session::{ProtocolError, Session};
use crate::ui::{PostEntry, RenderUpdate, Ui};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// Undecodable, unsigned, badly signed, expired or the wrong claim type
    Invalid,
    UnknownChannel,
    /// Direct message from someone not in the directory
    UnknownIssuer,
    Duplicate,
    /// Claim's conversation disagrees with the subject it arrived on
    Misaddressed,
}

/// Which subscription a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Presence,
    ChannelPost,
    DirectPost,
}

pub struct Coordinator<B: MessageBus, U: Ui> {
    session: Arc<Session<B>>,
    ui: Arc<U>,
    presence: PresenceScheduler<B>,
}

impl<B: MessageBus, U: Ui> Clone for Coordinator<B, U> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            ui: self.ui.clone(),
            presence: self.presence.clone(),
        }
    }
}

impl<B: MessageBus, U: Ui> Coordinator<B, U> {
    pub fn new(session: Arc<Session<B>>, ui: Arc<U>) -> Self {
        let presence = PresenceScheduler::new(session.clone());
        Self {
            session,
            ui,
            presence,
        }
    }

    pub fn session(&self) -> &Arc<Session<B>> {
        &self.session
    }

    pub fn presence(&self) -> &PresenceScheduler<B> {
        &self.presence
    }

    pub async fn handle(&self, kind: Inbound, msg: &BusMessage) -> Delivery {
        match kind {
            Inbound::Presence => self.handle_presence(msg).await,
            Inbound::ChannelPost => self.handle_channel_post(msg),
            Inbound::DirectPost => self.handle_direct_post(msg),
        }
    }

    /// Learn about a peer, and answer a "new" announcement with our own.
    pub async fn handle_presence(&self, msg: &BusMessage) -> Delivery {
        let Some(presence) = self.decode::<PresenceClaim>(msg, "presence") else {
            return Delivery::Invalid;
        };

        let mut name = display_name(&presence.name);
        if name.is_empty() {
            name = short_subject(&presence.issuer).to_string();
        }

        let joined = {
            let mut directory = self.session.directory();
            let now = Instant::now();
            let joined = !directory.knows_user(&presence.issuer);
            if joined {
                directory.add_user(&name, &presence.issuer, now);
            }
            directory.touch(&presence.issuer, now);
            joined
        };

        if joined {
            info!(%name, subject = %presence.issuer, "user joined");
            self.ui.request_render(RenderUpdate::UserJoined {
                name,
                subject: presence.issuer.clone(),
            });
        }

        if presence.is_new && presence.issuer != self.session.subject() {
            if let Err(e) = self.presence.announce_now().await {
                warn!("Could not answer new peer: {}", e);
            }
        }
        Delivery::Applied
    }

    pub fn handle_channel_post(&self, msg: &BusMessage) -> Delivery {
        let Some(post) = self.decode::<PostClaim>(msg, "post") else {
            return Delivery::Invalid;
        };
        if self.session.topics().channel_of(&msg.subject) != Some(post.conversation.as_str()) {
            debug!(subject = %msg.subject, conversation = %post.conversation, "misaddressed post");
            return Delivery::Misaddressed;
        }

        let view = View::Channel(post.conversation.clone());
        let mut directory = self.session.directory();
        if !directory.has_channel(&post.conversation) {
            debug!(channel = %post.conversation, "post for unknown channel");
            return Delivery::UnknownChannel;
        }
        let entry = entry_for(&directory, &post);
        if !directory.record_channel_post(post) {
            debug!("duplicate post");
            return Delivery::Duplicate;
        }
        self.render_if_on_screen(&view, entry);
        Delivery::Applied
    }

    pub fn handle_direct_post(&self, msg: &BusMessage) -> Delivery {
        let Some(post) = self.decode::<PostClaim>(msg, "direct message") else {
            return Delivery::Invalid;
        };
        if post.conversation != self.session.subject() {
            debug!(recipient = %post.conversation, "direct message for someone else");
            return Delivery::Misaddressed;
        }

        let view = View::Direct(post.issuer.clone());
        let mut directory = self.session.directory();
        if !directory.knows_user(&post.issuer) {
            debug!(issuer = %post.issuer, "direct message from unknown user");
            return Delivery::UnknownIssuer;
        }
        let entry = entry_for(&directory, &post);
        let peer = post.issuer.clone();
        if !directory.record_direct_post(&peer, post) {
            debug!("duplicate direct message");
            return Delivery::Duplicate;
        }
        self.render_if_on_screen(&view, entry);
        Delivery::Applied
    }

    /// Call with the directory guard held.
    fn render_if_on_screen(&self, view: &View, entry: PostEntry) {
        if self.ui.current_view().as_ref() == Some(view) {
            self.ui.request_render(RenderUpdate::AppendPost(entry));
        }
    }

    /// Post `body` to the conversation on screen.
    ///
    /// Returns `Ok(None)` without publishing when nothing is on screen or the
    /// conversation is not in the directory. The post id is marked seen
    /// before publishing, so our own echo is a duplicate. The post joins the
    /// conversation history only once the publish succeeded.
    pub async fn send_post(&self, body: &str) -> Result<Option<PostClaim>, ProtocolError> {
        let Some(view) = self.ui.current_view() else {
            return Ok(None);
        };
        let (conversation, subject) = match &view {
            View::Channel(name) => (name.as_str(), self.session.topics().channel_posts(name)),
            View::Direct(peer) => (peer.as_str(), self.session.topics().direct(peer)),
        };
        let post = PostClaim::new(self.session.subject(), conversation, body, claims::unix_now());

        let known = {
            let mut directory = self.session.directory();
            let known = directory.has_conversation(&view);
            if known {
                directory.mark_seen(&post.id);
            }
            known
        };
        if !known {
            warn!(%view, "Not sending to an unknown conversation");
            return Ok(None);
        }

        let token = claims::encode(
            &post.to_claim(self.session.audience()),
            self.session.identity().key(),
        )?;
        self.session.bus().publish(&subject, token.into_bytes()).await?;

        let mut directory = self.session.directory();
        let entry = entry_for(&directory, &post);
        if directory.append_post(&view, post.clone()) {
            self.render_if_on_screen(&view, entry);
        }
        Ok(Some(post))
    }

    /// Subscribe to presence, channel posts and our own direct messages.
    ///
    /// Each subscription is drained by its own task so deliveries of one kind
    /// are handled in arrival order. The returned task finishes as soon as
    /// any subscription ends.
    pub async fn subscribe_all(&self) -> BusResult<JoinHandle<()>> {
        let topics = self.session.topics();
        let bus = self.session.bus();

        let presence = bus.subscribe(&topics.presence()).await?;
        let posts = bus.subscribe(&topics.posts_wildcard()).await?;
        let direct = bus.subscribe(&topics.direct(self.session.subject())).await?;

        let pumps = vec![
            self.pump(Inbound::Presence, presence),
            self.pump(Inbound::ChannelPost, posts),
            self.pump(Inbound::DirectPost, direct),
        ];

        Ok(tokio::spawn(async move {
            let (_, _, rest) = futures::future::select_all(pumps).await;
            for pump in rest {
                pump.abort();
            }
        }))
    }

    fn pump(&self, kind: Inbound, mut subscription: Subscription) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = subscription.next().await {
                coordinator.handle(kind, &msg).await;
            }
            warn!(?kind, "Subscription closed");
        })
    }

    /// Start tracking a channel. False if the name cannot be a subject token.
    pub fn join_channel(&self, name: &str) -> bool {
        if !is_valid_channel(name) {
            return false;
        }
        if self.session.directory().add_channel(name) {
            info!(channel = name, "joined channel");
        }
        true
    }

    pub fn find_user(&self, name: &str) -> Option<UserSummary> {
        self.session.directory().find_user_by_name(name)
    }

    pub fn users(&self) -> Vec<UserSummary> {
        self.session.directory().users(Instant::now())
    }

    pub fn channels(&self) -> Vec<String> {
        self.session.directory().channels()
    }

    /// Rendered history of a conversation.
    pub fn conversation_entries(&self, view: &View) -> Vec<PostEntry> {
        entries_for(&self.session.directory(), view)
    }

    /// `#channel` or `@name`, falling back to the short subject.
    pub fn view_title(&self, view: &View) -> String {
        title_for(&self.session.directory(), view)
    }

    /// Replace the screen with `view`'s history.
    ///
    /// Snapshot and render request share one guard, so a post arriving
    /// meanwhile is either in the snapshot or appended after it.
    pub fn show(&self, view: &View) {
        let directory = self.session.directory();
        let update = RenderUpdate::ShowConversation {
            title: title_for(&directory, view),
            entries: entries_for(&directory, view),
        };
        self.ui.request_render(update);
    }

    fn decode<T>(&self, msg: &BusMessage, what: &str) -> Option<T>
    where
        T: TryFrom<Claim, Error = ClaimError>,
    {
        let Ok(token) = std::str::from_utf8(&msg.payload) else {
            warn!(subject = %msg.subject, "bad {}: payload is not text", what);
            return None;
        };
        let decoded = claims::decode_validated(token, claims::unix_now(), self.session.audience())
            .and_then(<T as TryFrom<Claim>>::try_from);
        match decoded {
            Ok(claim) => Some(claim),
            Err(e) => {
                warn!(subject = %msg.subject, "bad {}: {}", what, e);
                None
            }
        }
    }
}

fn entries_for(directory: &Directory, view: &View) -> Vec<PostEntry> {
    directory
        .conversation(view)
        .iter()
        .map(|post| entry_for(directory, post))
        .collect()
}

fn title_for(directory: &Directory, view: &View) -> String {
    match view {
        View::Channel(_) => view.to_string(),
        View::Direct(subject) => match directory.name_of(subject) {
            Some(name) => format!("@{}", name),
            None => view.to_string(),
        },
    }
}

fn entry_for(directory: &Directory, post: &PostClaim) -> PostEntry {
    let author = directory
        .name_of(&post.issuer)
        .unwrap_or_else(|| short_subject(&post.issuer));
    PostEntry {
        author: author.to_string(),
        body: post.body.clone(),
        timestamp: post.timestamp,
    }
}
