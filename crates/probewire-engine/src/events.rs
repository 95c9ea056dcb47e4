//! Events published to subscribers of a debug session.

use probewire_core::{WatchEntry, WatchId};

/// Capacity of the event channel; slow subscribers lag past this.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Something the target did, or a watched value that changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// One or more tasks halted; carries the decoded status codes.
    Halted(Vec<i32>),
    /// Background polling refreshed a watched entry.
    WatchUpdated {
        /// Registry key of the entry.
        id: WatchId,
        /// The entry as stored after the update.
        entry: WatchEntry,
    },
}
