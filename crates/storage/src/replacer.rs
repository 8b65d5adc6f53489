//! Eviction policies for the buffer pool. Both replacers are priority-aware:
//! frames are grouped by [`Priority`] and a victim is always chosen from the
//! lowest-priority non-empty group first, so `HIGH` frames (column headers,
//! directory pages) are evicted last. Priority never blocks eviction outright
//! — if only `HIGH` frames are evictable, one of them is still returned.

use std::collections::{HashSet, VecDeque};

/// Identifies a frame slot in the buffer pool.
pub type FrameId = usize;

/// Eviction bias for a buffer pool frame. `HIGH` is evicted last, `LOW` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Default,
    High,
}

const PRIORITIES: [Priority; 3] = [Priority::Low, Priority::Default, Priority::High];

/// Eviction policy for buffer pool frames.
pub trait Replacer {
    /// Chooses a victim frame for eviction, preferring the lowest-priority
    /// non-empty group.
    fn victim(&mut self) -> Option<FrameId>;

    /// Pins a frame, removing it from eviction consideration.
    fn pin(&mut self, frame_id: FrameId);

    /// Unpins a frame at the given priority, making it evictable.
    fn unpin(&mut self, frame_id: FrameId, priority: Priority);

    /// Total number of evictable frames across all priorities.
    fn size(&self) -> usize;
}

/// Least-recently-unpinned-first, within each priority group.
#[derive(Debug)]
pub struct LruReplacer {
    groups: [VecDeque<FrameId>; 3],
    entries: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: [
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
            ],
            entries: HashSet::with_capacity(capacity),
        }
    }

    fn group_mut(&mut self, priority: Priority) -> &mut VecDeque<FrameId> {
        &mut self.groups[priority as usize]
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        for priority in PRIORITIES {
            if let Some(victim) = self.group_mut(priority).pop_back() {
                self.entries.remove(&victim);
                return Some(victim);
            }
        }
        None
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.entries.remove(&frame_id) {
            for group in &mut self.groups {
                group.retain(|&entry| entry != frame_id);
            }
        }
    }

    fn unpin(&mut self, frame_id: FrameId, priority: Priority) {
        if self.entries.insert(frame_id) {
            self.group_mut(priority).push_front(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.groups.iter().map(VecDeque::len).sum()
    }
}

/// First-unpinned-first-evicted, within each priority group.
#[derive(Debug)]
pub struct FifoReplacer {
    groups: [VecDeque<FrameId>; 3],
    entries: HashSet<FrameId>,
}

impl FifoReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: [
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
                VecDeque::with_capacity(capacity),
            ],
            entries: HashSet::with_capacity(capacity),
        }
    }

    fn group_mut(&mut self, priority: Priority) -> &mut VecDeque<FrameId> {
        &mut self.groups[priority as usize]
    }
}

impl Replacer for FifoReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        for priority in PRIORITIES {
            if let Some(victim) = self.group_mut(priority).pop_front() {
                self.entries.remove(&victim);
                return Some(victim);
            }
        }
        None
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.entries.remove(&frame_id) {
            for group in &mut self.groups {
                group.retain(|&entry| entry != frame_id);
            }
        }
    }

    fn unpin(&mut self, frame_id: FrameId, priority: Priority) {
        if self.entries.insert(frame_id) {
            self.group_mut(priority).push_back(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.groups.iter().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_oldest_unpinned_within_a_priority() {
        let mut replacer = LruReplacer::new(4);
        replacer.unpin(1, Priority::Default);
        replacer.unpin(2, Priority::Default);
        replacer.unpin(3, Priority::Default);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn lru_prefers_low_priority_group_over_high() {
        let mut replacer = LruReplacer::new(4);
        replacer.unpin(1, Priority::High);
        replacer.unpin(2, Priority::Low);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn lru_falls_back_to_high_when_nothing_else_evictable() {
        let mut replacer = LruReplacer::new(4);
        replacer.unpin(1, Priority::High);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn pin_removes_from_any_group() {
        let mut replacer = LruReplacer::new(4);
        replacer.unpin(1, Priority::Low);
        replacer.pin(1);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn fifo_evicts_in_enqueue_order() {
        let mut replacer = FifoReplacer::new(4);
        replacer.unpin(1, Priority::Default);
        replacer.unpin(2, Priority::Default);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn fifo_prefers_low_priority_group() {
        let mut replacer = FifoReplacer::new(4);
        replacer.unpin(1, Priority::High);
        replacer.unpin(2, Priority::Low);
        replacer.unpin(3, Priority::Default);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(1));
    }
}
