//! Breakpoints the target has acknowledged.

use std::collections::BTreeMap;

/// A hardware breakpoint installed on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    /// Code address.
    pub address: u32,
    /// Task the breakpoint applies to.
    pub thread: u32,
    /// The task halted since the breakpoint was installed or last resumed.
    pub hit: bool,
}

impl Breakpoint {
    /// Create a breakpoint that has not been hit.
    pub fn new(address: u32, thread: u32) -> Self {
        Self {
            address,
            thread,
            hit: false,
        }
    }
}

/// Installed breakpoints, grouped by task.
#[derive(Debug, Clone, Default)]
pub struct BreakpointTable {
    breakpoints: BTreeMap<u32, Vec<Breakpoint>>,
}

impl BreakpointTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a breakpoint. Returns `false` if it was already present.
    pub fn add(&mut self, address: u32, thread: u32) -> bool {
        let list = self.breakpoints.entry(thread).or_default();
        if list.iter().any(|bp| bp.address == address) {
            return false;
        }
        list.push(Breakpoint::new(address, thread));
        true
    }

    /// Forget a breakpoint.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn remove(&mut self, address: u32, thread: u32) -> bool {
        let Some(list) = self.breakpoints.get_mut(&thread) else {
            return false;
        };
        let before = list.len();
        list.retain(|bp| bp.address != address);
        let removed = list.len() != before;
        if list.is_empty() {
            self.breakpoints.remove(&thread);
        }
        removed
    }

    /// Breakpoints of one task.
    pub fn get_for_thread(&self, thread: u32) -> &[Breakpoint] {
        self.breakpoints.get(&thread).map_or(&[], |v| v.as_slice())
    }

    /// Mark the breakpoints of every reported task as hit.
    pub fn mark_hit(&mut self, threads: &[i32]) {
        for thread in threads.iter().filter_map(|t| u32::try_from(*t).ok()) {
            if let Some(list) = self.breakpoints.get_mut(&thread) {
                list.iter_mut().for_each(|bp| bp.hit = true);
            }
        }
    }

    /// Clear hit marks for one task, or for all when `thread` is `None`.
    pub fn clear_hits(&mut self, thread: Option<u32>) {
        for (_, list) in self
            .breakpoints
            .iter_mut()
            .filter(|(t, _)| thread.map_or(true, |only| **t == only))
        {
            list.iter_mut().for_each(|bp| bp.hit = false);
        }
    }

    /// Remove every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// All breakpoints, ordered by task.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values().flat_map(|v| v.iter())
    }
}
