use std::collections::HashSet;

use super::snapshot::Snapshot;
use crate::layer::LayerId;

/// A before/after pair that undoes or redoes as one visible step
#[derive(Debug, Clone)]
pub struct HistoryStep {
    pub before: Snapshot,
    pub after: Snapshot,
}

/// What came off a stack: a full step, or a single snapshot with no partner
#[derive(Debug, Clone)]
pub enum Popped {
    Step(HistoryStep),
    Lone(Snapshot),
}

/// Bounded linear undo/redo history over [`Snapshot`]s.
///
/// The undo stack holds snapshots oldest-first. The redo stack mirrors it,
/// so a step undone as (before, after) sits on the redo stack with `before`
/// on top.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    maximum_size: usize,
}

impl HistoryManager {
    pub fn new(maximum_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            maximum_size,
        }
    }

    /// Commits a new snapshot. Discards the redo branch and evicts the oldest
    /// entries past the bound. Returns how many snapshots were dropped.
    pub fn push(&mut self, snapshot: Snapshot) -> usize {
        let discarded = self.redo_stack.len();
        self.redo_stack.clear();
        self.undo_stack.push(snapshot);
        discarded + self.evict()
    }

    /// Pops the newest step off the undo stack.
    pub fn pop_undo(&mut self) -> Option<Popped> {
        let top = self.undo_stack.pop()?;
        let pairs = self.undo_stack.last().is_some_and(|prev| top.pairs_with(prev));
        if pairs {
            if let Some(before) = self.undo_stack.pop() {
                return Some(Popped::Step(HistoryStep { before, after: top }));
            }
        }
        Some(Popped::Lone(top))
    }

    /// Parks an undone step for redo.
    pub fn push_redo(&mut self, step: HistoryStep) {
        self.redo_stack.push(step.after);
        self.redo_stack.push(step.before);
    }

    /// Parks a single snapshot for redo.
    pub fn push_redo_lone(&mut self, snapshot: Snapshot) {
        self.redo_stack.push(snapshot);
    }

    /// Pops the next step off the redo stack.
    pub fn pop_redo(&mut self) -> Option<Popped> {
        let top = self.redo_stack.pop()?;
        let pairs = self.redo_stack.last().is_some_and(|next| next.pairs_with(&top));
        if pairs {
            if let Some(after) = self.redo_stack.pop() {
                return Some(Popped::Step(HistoryStep { before: top, after }));
            }
        }
        Some(Popped::Lone(top))
    }

    /// Returns a redone step to the undo stack without touching the redo
    /// branch.
    pub fn push_undo_step(&mut self, step: HistoryStep) -> usize {
        self.undo_stack.push(step.before);
        self.undo_stack.push(step.after);
        self.evict()
    }

    pub fn push_undo_lone(&mut self, snapshot: Snapshot) -> usize {
        self.undo_stack.push(snapshot);
        self.evict()
    }

    /// Drops the oldest entries until the bound holds. An "after" half left
    /// at the bottom without its "before" goes too.
    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        if self.undo_stack.len() > self.maximum_size {
            let excess = self.undo_stack.len() - self.maximum_size;
            self.undo_stack.drain(..excess);
            evicted += excess;
        }
        while self.undo_stack.first().is_some_and(Snapshot::is_coalescible) {
            self.undo_stack.remove(0);
            evicted += 1;
        }
        if evicted > 0 {
            log::debug!("History evicted {} snapshot(s)", evicted);
        }
        evicted
    }

    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// Changes the bound, evicting immediately. Returns how many snapshots
    /// were dropped.
    pub fn set_maximum_size(&mut self, maximum_size: usize) -> usize {
        self.maximum_size = maximum_size;
        self.evict()
    }

    /// Returns true if there are snapshots that can be undone
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Returns true if there are snapshots that can be redone
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_entries(&self) -> &[Snapshot] {
        &self.undo_stack
    }

    pub fn redo_entries(&self) -> &[Snapshot] {
        &self.redo_stack
    }

    /// Clear both stacks. Returns how many snapshots were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.undo_stack.len() + self.redo_stack.len();
        self.undo_stack.clear();
        self.redo_stack.clear();
        dropped
    }

    /// Every layer id some snapshot could restore
    pub fn referenced_layers(&self) -> HashSet<LayerId> {
        self.undo_stack
            .iter()
            .chain(&self.redo_stack)
            .flat_map(Snapshot::referenced_layers)
            .collect()
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAXIMUM_HISTORY_SIZE)
    }
}
