//! Directory of known users and conversation history
//!
//! The single owner of users, channel post sequences, DM sequences and the
//! dedup set. It has no locking of its own: the session wraps it in one
//! `Mutex` and every mutation happens while that guard is held. Readers
//! get cloned snapshots, never references into live state.
//!
//! Posts are kept in arrival order. Nothing is ever evicted.

pub mod dedup;

pub use dedup::DedupSet;

use crate::claims::PostClaim;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// A conversation the UI can show.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum View {
    /// Channel by name
    Channel(String),
    /// Direct messages with the user identified by subject
    Direct(String),
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Channel(name) => write!(f, "#{}", name),
            View::Direct(subject) => write!(f, "@{}", short_subject(subject)),
        }
    }
}

/// Abbreviated subject for display.
pub fn short_subject(subject: &str) -> &str {
    subject.get(..8).unwrap_or(subject)
}

#[derive(Debug, Clone)]
pub struct User {
    pub subject: String,
    pub name: String,
    pub last_seen: Instant,
    posts: Vec<PostClaim>,
}

impl User {
    fn new(name: &str, subject: &str, now: Instant) -> Self {
        Self {
            subject: subject.to_string(),
            name: name.to_string(),
            last_seen: now,
            posts: Vec::new(),
        }
    }

    /// Direct messages exchanged with this user, arrival order.
    pub fn posts(&self) -> &[PostClaim] {
        &self.posts
    }

    /// Seen within one presence interval.
    pub fn is_online(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) <= interval
    }
}

/// Point-in-time copy of a user entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub subject: String,
    pub name: String,
    pub online: bool,
}

#[derive(Debug)]
pub struct Directory {
    users: HashMap<String, User>,
    channels: BTreeMap<String, Vec<PostClaim>>,
    dedup: DedupSet,
    presence_interval: Duration,
}

impl Directory {
    pub fn new<I, S>(channels: I, presence_interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: HashMap::new(),
            channels: channels
                .into_iter()
                .map(|name| (name.into(), Vec::new()))
                .collect(),
            dedup: DedupSet::new(),
            presence_interval,
        }
    }

    /// Insert a user unless the subject is already known.
    ///
    /// An existing entry is returned untouched, name included.
    pub fn add_user(&mut self, name: &str, subject: &str, now: Instant) -> &mut User {
        self.users
            .entry(subject.to_string())
            .or_insert_with(|| User::new(name, subject, now))
    }

    pub fn user(&self, subject: &str) -> Option<&User> {
        self.users.get(subject)
    }

    pub fn knows_user(&self, subject: &str) -> bool {
        self.users.contains_key(subject)
    }

    /// Refresh last-seen. Returns false for unknown subjects.
    pub fn touch(&mut self, subject: &str, now: Instant) -> bool {
        match self.users.get_mut(subject) {
            Some(user) => {
                user.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Start tracking a channel. Returns false if it was already known.
    pub fn add_channel(&mut self, name: &str) -> bool {
        if self.channels.contains_key(name) {
            return false;
        }
        self.channels.insert(name.to_string(), Vec::new());
        true
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn is_duplicate(&self, id: &str) -> bool {
        self.dedup.seen(id)
    }

    pub fn mark_seen(&mut self, id: &str) {
        self.dedup.mark_seen(id);
    }

    /// Whether posts to `view` can be stored.
    pub fn has_conversation(&self, view: &View) -> bool {
        match view {
            View::Channel(name) => self.has_channel(name),
            View::Direct(subject) => self.knows_user(subject),
        }
    }

    /// Append one of our own posts, already marked seen, to `view`.
    ///
    /// No dedup check. Returns false if the conversation is unknown.
    pub fn append_post(&mut self, view: &View, post: PostClaim) -> bool {
        let posts = match view {
            View::Channel(name) => self.channels.get_mut(name),
            View::Direct(subject) => self.users.get_mut(subject).map(|user| &mut user.posts),
        };
        match posts {
            Some(posts) => {
                posts.push(post);
                true
            }
            None => false,
        }
    }

    /// Append a channel post.
    ///
    /// Rejected (returns false, nothing changes) if the channel is unknown or
    /// the post id was already seen. Accepting marks the id seen.
    pub fn record_channel_post(&mut self, post: PostClaim) -> bool {
        let Some(posts) = self.channels.get_mut(&post.conversation) else {
            return false;
        };
        if !self.dedup.first_sighting(&post.id) {
            return false;
        }
        posts.push(post);
        true
    }

    /// Append a direct message to the conversation with `peer`.
    ///
    /// Unknown peers are rejected without creating an entry; duplicate ids
    /// are rejected like channel posts.
    pub fn record_direct_post(&mut self, peer: &str, post: PostClaim) -> bool {
        let Some(user) = self.users.get_mut(peer) else {
            return false;
        };
        if !self.dedup.first_sighting(&post.id) {
            return false;
        }
        user.posts.push(post);
        true
    }

    /// All users, sorted by name.
    pub fn users(&self, now: Instant) -> Vec<UserSummary> {
        let mut users: Vec<UserSummary> = self
            .users
            .values()
            .map(|user| UserSummary {
                subject: user.subject.clone(),
                name: user.name.clone(),
                online: user.is_online(now, self.presence_interval),
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.subject.cmp(&b.subject)));
        users
    }

    /// First user whose display name matches, case-insensitively.
    pub fn find_user_by_name(&self, name: &str) -> Option<UserSummary> {
        self.users(Instant::now())
            .into_iter()
            .find(|user| user.name.eq_ignore_ascii_case(name))
    }

    pub fn name_of(&self, subject: &str) -> Option<&str> {
        self.users.get(subject).map(|user| user.name.as_str())
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Snapshot of a conversation's posts. Unknown conversations are empty.
    pub fn conversation(&self, view: &View) -> Vec<PostClaim> {
        match view {
            View::Channel(name) => self.channels.get(name).cloned().unwrap_or_default(),
            View::Direct(subject) => self
                .users
                .get(subject)
                .map(|user| user.posts.clone())
                .unwrap_or_default(),
        }
    }
}
