// RSS Poll State domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::ids::AutomationId;

/// Default/maximum size of the rolling seen-set. Exposed as a constructor
/// parameter so a deployment can raise the knob; 100 is the crate default.
pub const DEFAULT_SEEN_SET_CAP: usize = 100;

/// Per-automation RSS polling state, mutated only by the RSS Poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssPollState {
    pub automation_id: AutomationId,
    pub last_poll_time: Option<DateTime<Utc>>,
    /// Rolling seen-set of recent item identifiers, most-recent-last.
    /// A `VecDeque` bounded at `cap` gives FIFO eviction in O(1).
    pub seen_ids: VecDeque<String>,
    pub last_feed_url: Option<String>,
    #[serde(default = "default_cap")]
    pub cap: usize,
}

fn default_cap() -> usize {
    DEFAULT_SEEN_SET_CAP
}

impl RssPollState {
    pub fn new(automation_id: AutomationId) -> Self {
        Self::with_cap(automation_id, DEFAULT_SEEN_SET_CAP)
    }

    pub fn with_cap(automation_id: AutomationId, cap: usize) -> Self {
        Self {
            automation_id,
            last_poll_time: None,
            seen_ids: VecDeque::new(),
            last_feed_url: None,
            cap,
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen_ids.iter().any(|s| s == id)
    }

    /// Record an identifier as seen, evicting the oldest entry once the
    /// cap is exceeded.
    pub fn mark_seen(&mut self, id: String) {
        if self.has_seen(&id) {
            return;
        }
        self.seen_ids.push_back(id);
        while self.seen_ids.len() > self.cap {
            self.seen_ids.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_set_evicts_oldest_beyond_cap() {
        let mut state = RssPollState::with_cap(AutomationId::new("a"), 3);
        state.mark_seen("1".into());
        state.mark_seen("2".into());
        state.mark_seen("3".into());
        state.mark_seen("4".into());
        assert_eq!(state.seen_ids.len(), 3);
        assert!(!state.has_seen("1"));
        assert!(state.has_seen("4"));
    }

    #[test]
    fn duplicate_mark_is_noop() {
        let mut state = RssPollState::new(AutomationId::new("a"));
        state.mark_seen("x".into());
        state.mark_seen("x".into());
        assert_eq!(state.seen_ids.len(), 1);
    }
}
