//! Per-operation sink lists.
//!
//! A [`SinkRegistry`] belongs to exactly one declared operation and keeps two
//! ordered lists (request, response). Entries are only appended while the
//! dispatcher is being built; once serving starts the registry is read-only.

use std::fmt;
use std::sync::Arc;

use super::types::{Direction, TagSet};
use crate::application::ports::AuditSink;

/// One registered sink with its label and tag filter.
#[derive(Clone)]
pub struct SinkEntry {
    pub label: String,
    pub tags: TagSet,
    pub sink: Arc<dyn AuditSink>,
}

impl fmt::Debug for SinkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkEntry")
            .field("label", &self.label)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct SinkRegistry {
    request: Vec<SinkEntry>,
    response: Vec<SinkEntry>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, direction: Direction, entry: SinkEntry) {
        self.entries_mut(direction).push(entry);
    }

    pub fn entries(&self, direction: Direction) -> &[SinkEntry] {
        match direction {
            Direction::Request => &self.request,
            Direction::Response => &self.response,
        }
    }

    fn entries_mut(&mut self, direction: Direction) -> &mut Vec<SinkEntry> {
        match direction {
            Direction::Request => &mut self.request,
            Direction::Response => &mut self.response,
        }
    }

    /// Entries whose filter accepts `event_tags`, in registration order.
    pub fn matching<'a>(
        &'a self,
        direction: Direction,
        event_tags: &'a TagSet,
    ) -> impl Iterator<Item = &'a SinkEntry> + 'a {
        self.entries(direction)
            .iter()
            .filter(move |entry| entry.tags.matches(event_tags))
    }

    pub fn len(&self, direction: Direction) -> usize {
        self.entries(direction).len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::sink_fn;

    fn entry(label: &str, tags: &[&str]) -> SinkEntry {
        SinkEntry {
            label: label.to_string(),
            tags: TagSet::from_iter(tags.iter().copied()),
            sink: Arc::new(sink_fn(|_| Ok(()))),
        }
    }

    #[test]
    fn directions_are_kept_apart() {
        let mut registry = SinkRegistry::new();
        assert!(registry.is_empty());

        registry.push(Direction::Request, entry("console", &["all"]));
        registry.push(Direction::Response, entry("disk", &["all"]));
        registry.push(Direction::Response, entry("push", &["all"]));

        assert_eq!(registry.len(Direction::Request), 1);
        assert_eq!(registry.len(Direction::Response), 2);
        assert!(!registry.is_empty());
    }

    #[test]
    fn matching_preserves_registration_order() {
        let mut registry = SinkRegistry::new();
        registry.push(Direction::Request, entry("first", &["remote-start"]));
        registry.push(Direction::Request, entry("skipped", &["remote-stop"]));
        registry.push(Direction::Request, entry("second", &["all"]));
        registry.push(Direction::Request, entry("third", &["authorize"]));

        let event_tags = TagSet::from_iter(["authorize", "remote-start"]);
        let labels: Vec<&str> = registry
            .matching(Direction::Request, &event_tags)
            .map(|e| e.label.as_str())
            .collect();

        assert_eq!(labels, vec!["first", "second", "third"]);
    }
}
