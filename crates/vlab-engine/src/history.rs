use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use vlab_lab::LabState;

/// Who committed the transition a history entry reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitOrigin {
    /// An action requested by the interaction layer.
    Interactive,
    /// A step completed by the auto-advance processor.
    Automatic,
    /// A deferred effect applied when a timer completed.
    Timer,
}

/// Everything undo restores: the step pointer and the whole lab state
/// (objects, instrument, measurement table, serial counters, timers).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Step pointer before the transition.
    pub step: usize,
    /// Lab state before the transition.
    pub lab: LabState,
}

/// One undoable transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Origin of the transition.
    pub origin: CommitOrigin,
    /// State before it.
    pub snapshot: Snapshot,
}

/// Bounded stack of pre-mutation snapshots.
///
/// Automatic entries belong to the interactive or timer entry pushed just
/// before them; eviction never leaves such an orphan at the bottom of the
/// stack.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// Empty history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Pushes an entry, evicting the oldest when full.
    ///
    /// An automatic entry whose whole group has been evicted is dropped too.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            while matches!(self.entries.front(), Some(front) if front.origin == CommitOrigin::Automatic) {
                self.entries.pop_front();
            }
            if self.entries.is_empty() && entry.origin == CommitOrigin::Automatic {
                return;
            }
        }
        self.entries.push_back(entry);
    }

    /// Pops the most recent entry.
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Most recent entry.
    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether undo is unavailable.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
