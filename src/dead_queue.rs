//! Dead-node backoff queue: a binary heap ordered by resurrection `due_time`, paired with an
//! `in_dead_set` lookup so membership checks and mid-heap resurrection don't require an O(n)
//! scan.
//!
//! The heap may accumulate stale entries for nodes that were resurrected and later marked dead
//! again with a new `due_time`; `in_dead_set` is the single source of truth, so stale heap
//! entries are recognized and discarded lazily as they're popped, rather than eagerly removed.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use crate::config::NodeConfig;

#[derive(Debug, Clone)]
struct DeadEntry {
    due_time: Instant,
    failures: u32,
    config: NodeConfig,
}

impl PartialEq for DeadEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due_time == other.due_time
    }
}
impl Eq for DeadEntry {}
impl PartialOrd for DeadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DeadEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_time.cmp(&other.due_time)
    }
}

#[derive(Debug, Default)]
pub struct DeadQueue {
    heap: BinaryHeap<Reverse<DeadEntry>>,
    in_dead_set: HashMap<NodeConfig, (Instant, u32)>,
}

impl DeadQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.in_dead_set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_dead_set.is_empty()
    }

    #[must_use]
    pub fn contains(&self, config: &NodeConfig) -> bool {
        self.in_dead_set.contains_key(config)
    }

    #[must_use]
    pub fn failures(&self, config: &NodeConfig) -> Option<u32> {
        self.in_dead_set.get(config).map(|&(_, f)| f)
    }

    /// Record (or re-record) a node as dead with the given failure count and due time. Replaces
    /// any prior entry for the same config; the old heap entry, if any, becomes a tombstone.
    pub fn push(&mut self, config: NodeConfig, failures: u32, due_time: Instant) {
        self.in_dead_set.insert(config.clone(), (due_time, failures));
        self.heap.push(Reverse(DeadEntry {
            due_time,
            failures,
            config,
        }));
    }

    /// Remove a node from the dead set, e.g. because it was resurrected. Returns its last
    /// recorded failure count, if it was present.
    pub fn remove(&mut self, config: &NodeConfig) -> Option<u32> {
        self.in_dead_set.remove(config).map(|(_, f)| f)
    }

    /// Pop the next heap entry that still matches `in_dead_set`'s authoritative state,
    /// discarding any stale tombstones encountered along the way.
    fn pop_valid(&mut self) -> Option<DeadEntry> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if let Some(&(due, failures)) = self.in_dead_set.get(&entry.config) {
                if due == entry.due_time && failures == entry.failures {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// Remove and return every node whose `due_time <= now`, in ascending `due_time` order.
    /// Callers (the pool) are responsible for moving these into the alive set while preserving
    /// their failure counts.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<(NodeConfig, u32)> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pop_valid() {
            if entry.due_time > now {
                self.heap.push(Reverse(entry));
                break;
            }
            self.in_dead_set.remove(&entry.config);
            ready.push((entry.config, entry.failures));
        }
        ready
    }

    /// Peek the node with the smallest `due_time` without removing it from the dead set, even if
    /// its `due_time` is still in the future. Used for the "better to try than to fail"
    /// resurrection rule when no alive nodes remain (§4.2.2): the returned node stays dead.
    pub fn peek_min(&mut self) -> Option<(NodeConfig, u32)> {
        let entry = self.pop_valid()?;
        let result = (entry.config.clone(), entry.failures);
        self.heap.push(Reverse(entry));
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;
    use std::time::Duration;

    fn cfg(host: &str) -> NodeConfig {
        NodeConfig::new(Scheme::Http, host, 9200)
    }

    #[test]
    fn push_and_contains() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("a"), 1, now);
        assert!(q.contains(&cfg("a")));
        assert_eq!(q.failures(&cfg("a")), Some(1));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_ready_respects_due_time_order() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("late"), 1, now + Duration::from_secs(10));
        q.push(cfg("early"), 1, now - Duration::from_secs(1));
        q.push(cfg("mid"), 1, now - Duration::from_millis(500));

        let ready = q.drain_ready(now);
        let hosts: Vec<&str> = ready.iter().map(|(c, _)| c.host.as_str()).collect();
        assert_eq!(hosts, vec!["early", "mid"]);
        assert!(q.contains(&cfg("late")));
        assert!(!q.contains(&cfg("early")));
    }

    #[test]
    fn remove_tombstones_heap_entry() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("a"), 1, now - Duration::from_secs(1));
        q.remove(&cfg("a"));
        assert!(q.drain_ready(now).is_empty());
    }

    #[test]
    fn re_push_supersedes_prior_entry() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("a"), 1, now - Duration::from_secs(5));
        q.push(cfg("a"), 2, now + Duration::from_secs(100));

        // The stale first entry must not be returned as ready even though its due_time is past.
        assert!(q.drain_ready(now).is_empty());
        assert_eq!(q.failures(&cfg("a")), Some(2));
    }

    #[test]
    fn peek_min_does_not_remove() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("only"), 3, now + Duration::from_secs(30));

        let first = q.peek_min();
        let second = q.peek_min();
        assert_eq!(first.as_ref().map(|(c, _)| c.host.as_str()), Some("only"));
        assert_eq!(second.as_ref().map(|(c, _)| c.host.as_str()), Some("only"));
        assert!(q.contains(&cfg("only")));
        assert_eq!(q.failures(&cfg("only")), Some(3));
    }

    #[test]
    fn peek_min_picks_smallest_due_time() {
        let mut q = DeadQueue::new();
        let now = Instant::now();
        q.push(cfg("far"), 1, now + Duration::from_secs(100));
        q.push(cfg("near"), 1, now + Duration::from_secs(1));

        let (config, _) = q.peek_min().unwrap();
        assert_eq!(config.host, "near");
    }

    #[test]
    fn empty_queue_has_no_min() {
        let mut q = DeadQueue::new();
        assert!(q.peek_min().is_none());
        assert!(q.is_empty());
    }
}
