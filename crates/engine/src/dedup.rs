use core_types::TradeId;
use std::collections::HashSet;

/// IDs this process has already acted upon.
///
/// Starts empty and only grows. It lives and dies with the process, so a
/// restarted consumer relies on the admission window alone to avoid replaying
/// old records.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<TradeId>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: TradeId) -> bool {
        self.seen.contains(&id)
    }

    /// Marks `id` as seen. Returns `false` if it already was.
    pub fn insert(&mut self, id: TradeId) -> bool {
        self.seen.insert(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
