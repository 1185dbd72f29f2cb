//! UI boundary
//!
//! The protocol core talks to the front end through two capabilities only:
//! queue a render update, and ask which conversation is on screen. Updates
//! are applied on the UI's own single-threaded cycle.

pub mod console;
pub mod mock;

pub use console::ConsoleUi;
pub use mock::RecordingUi;

use crate::directory::View;

/// A post ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEntry {
    pub author: String,
    pub body: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUpdate {
    /// A new user appeared in the directory
    UserJoined { name: String, subject: String },
    /// Append one post to the conversation on screen
    AppendPost(PostEntry),
    /// Replace the screen with a conversation's history
    ShowConversation {
        title: String,
        entries: Vec<PostEntry>,
    },
    /// Status text for the local user
    Notice(String),
}

pub trait Ui: Send + Sync + 'static {
    /// Queue an update. Must not block.
    fn request_render(&self, update: RenderUpdate);

    fn current_view(&self) -> Option<View>;
}
