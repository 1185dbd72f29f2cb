//! Seen-id tracking for posts
//!
//! Grows for the life of the process; there is no eviction.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn mark_seen(&mut self, id: &str) {
        self.seen.insert(id.to_string());
    }

    /// Check-and-mark in one step. Returns true only the first time `id`
    /// is offered.
    pub fn first_sighting(&mut self, id: &str) -> bool {
        if self.seen(id) {
            return false;
        }
        self.mark_seen(id);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_only_once() {
        let mut dedup = DedupSet::new();
        assert!(dedup.first_sighting("a"));
        assert!(!dedup.first_sighting("a"));
        assert!(dedup.first_sighting("b"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_mark_seen_then_check() {
        let mut dedup = DedupSet::new();
        assert!(!dedup.seen("a"));
        dedup.mark_seen("a");
        assert!(dedup.seen("a"));
        assert!(!dedup.first_sighting("a"));
    }
}
