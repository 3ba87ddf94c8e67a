//! Deduplication of events by their run/lumi/event triple.
//!
//! Overlapping data files can contain the same recorded event more than
//! once; the first occurrence in the fixed file-processing order wins.

use crate::Event;
use std::collections::HashSet;
use zz_core::EventId;

/// A first-seen-wins set of event identities.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<EventId>,
}

impl DedupSet {
    /// Empty set.
    pub fn new() -> DedupSet {
        DedupSet::default()
    }

    /// Number of distinct identities recorded.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Keep only the first occurrence of each identity, preserving order.
    pub fn retain_first(&mut self, events: &mut Vec<Event>) {
        events.retain(|ev| self.seen.insert(ev.id));
    }
}
