//! Subject layout under a fixed prefix
//!
//! ```text
//! <prefix>.online              presence, everyone pub/sub
//! <prefix>.posts.<channel>     channel posts, subscribed as <prefix>.posts.*
//! <prefix>.dms.<subject>       direct messages, each user subscribes to its own
//! ```

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('.').to_string(),
        }
    }

    pub fn presence(&self) -> String {
        format!("{}.online", self.prefix)
    }

    pub fn posts_wildcard(&self) -> String {
        format!("{}.posts.*", self.prefix)
    }

    pub fn channel_posts(&self, channel: &str) -> String {
        format!("{}.posts.{}", self.prefix, channel)
    }

    pub fn direct(&self, subject: &str) -> String {
        format!("{}.dms.{}", self.prefix, subject)
    }

    /// Channel named by a delivery subject, if it is a post subject.
    pub fn channel_of<'a>(&self, subject: &'a str) -> Option<&'a str> {
        subject
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix(".posts.")
            .filter(|channel| is_valid_channel(channel))
    }
}

/// A channel name must be one non-empty subject token.
pub fn is_valid_channel(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !matches!(c, '.' | '*' | '>'))
}
