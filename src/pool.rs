//! `NodePool`: owns the `Node` set, partitions it into alive/dead, and exposes the
//! concurrency-safe operations the retry loop needs (§4.2, §5).
//!
//! All mutable bookkeeping (`all_nodes`, `alive_order`, the dead queue, and the
//! per-node failure counters) lives behind one `parking_lot::Mutex`, held only for the duration
//! of a synchronous method body — never across an `.await` — matching the single-mutex
//! discipline required by §5.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::config::{NodeConfig, PoolConfig};
use crate::dead_queue::DeadQueue;
use crate::node::{Node, NodeFactory};
use crate::selector::NodeSelector;

struct PoolState {
    all_nodes: std::collections::HashMap<NodeConfig, Arc<dyn Node>>,
    /// Insertion order over every config ever added (seeds, then sniffed additions). Used by
    /// `all()`; never shrinks.
    insertion_order: Vec<NodeConfig>,
    alive_order: Vec<NodeConfig>,
    dead_queue: DeadQueue,
    dead_consecutive_failures: std::collections::HashMap<NodeConfig, u32>,
}

pub struct NodePool {
    state: Mutex<PoolState>,
    factory: NodeFactory,
    selector: Box<dyn NodeSelector>,
    config: PoolConfig,
    /// The initial seed set, preserved verbatim (unshuffled) to anchor sniffing.
    seed_nodes: Vec<NodeConfig>,
}

impl NodePool {
    /// # Errors
    /// Propagates the first node-construction failure encountered while building the seed set.
    pub fn new(
        seeds: Vec<NodeConfig>,
        factory: NodeFactory,
        selector: Box<dyn NodeSelector>,
        config: PoolConfig,
    ) -> Result<Self, crate::error::TransportError> {
        let seed_nodes = seeds.clone();
        let mut alive_order = seeds.clone();
        if config.randomize_nodes {
            alive_order.shuffle(&mut rand::rng());
        }

        let mut all_nodes = std::collections::HashMap::with_capacity(seeds.len());
        for seed in &seeds {
            all_nodes.insert(seed.clone(), factory(seed.clone())?);
        }

        Ok(Self {
            state: Mutex::new(PoolState {
                all_nodes,
                insertion_order: seeds,
                alive_order,
                dead_queue: DeadQueue::new(),
                dead_consecutive_failures: std::collections::HashMap::new(),
            }),
            factory,
            selector,
            config,
            seed_nodes,
        })
    }

    #[must_use]
    pub fn seed_nodes(&self) -> &[NodeConfig] {
        &self.seed_nodes
    }

    fn resurrect_ready(state: &mut PoolState, now: Instant) {
        for (config, _failures) in state.dead_queue.drain_ready(now) {
            if !state.alive_order.contains(&config) {
                state.alive_order.push(config);
            }
        }
    }

    /// Select the next node to try. Returns `None` only when the pool owns no nodes at all.
    pub fn get(&self) -> Option<(NodeConfig, Arc<dyn Node>)> {
        let mut state = self.state.lock();
        Self::resurrect_ready(&mut state, Instant::now());

        if !state.alive_order.is_empty() {
            let idx = self.selector.select(state.alive_order.len());
            let config = state.alive_order[idx].clone();
            let node = state.all_nodes.get(&config)?.clone();
            return Some((config, node));
        }

        // No alive nodes: resurrect the dead node with the smallest due_time even if it's not
        // yet due ("better to try than to fail"), without resetting its failure count or
        // re-inserting it into the alive set.
        let (config, _failures) = state.dead_queue.peek_min()?;
        let node = state.all_nodes.get(&config)?.clone();
        Some((config, node))
    }

    /// Mark `config` dead: idempotent, increments the failure count, and recomputes
    /// `due_time = min(max_dead_backoff, 60 * dead_backoff_factor * 2^(failures - 1))`.
    pub fn mark_dead(&self, config: &NodeConfig) {
        let mut state = self.state.lock();
        state.alive_order.retain(|c| c != config);

        let failures = state
            .dead_consecutive_failures
            .get(config)
            .copied()
            .unwrap_or(0)
            + 1;
        state
            .dead_consecutive_failures
            .insert(config.clone(), failures);

        let exponent = f64::from(failures.saturating_sub(1));
        let backoff_secs = (60.0 * self.config.dead_backoff_factor * 2f64.powf(exponent))
            .min(self.config.max_dead_backoff.as_secs_f64());
        let due_time = Instant::now() + Duration::from_secs_f64(backoff_secs.max(0.0));

        state.dead_queue.push(config.clone(), failures, due_time);
    }

    /// Mark `config` live: resets its failure count (no-op if it was never failing) and ensures
    /// it is present in the alive set.
    pub fn mark_live(&self, config: &NodeConfig) {
        let mut state = self.state.lock();
        let was_failing = state.dead_consecutive_failures.remove(config).is_some();
        if !was_failing {
            return;
        }
        state.dead_queue.remove(config);
        if !state.alive_order.contains(config) {
            state.alive_order.push(config.clone());
        }
    }

    /// The current failure count for `config`, or `None` if it has never failed / was reset.
    #[must_use]
    pub fn failure_count(&self, config: &NodeConfig) -> Option<u32> {
        self.state.lock().dead_consecutive_failures.get(config).copied()
    }

    /// Every node currently owned (alive or dead), in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<(NodeConfig, Arc<dyn Node>)> {
        let state = self.state.lock();
        state
            .insertion_order
            .iter()
            .map(|c| (c.clone(), state.all_nodes.get(c).expect("insertion_order entry must exist in all_nodes").clone()))
            .collect()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.state.lock().alive_order.len()
    }

    #[must_use]
    pub fn dead_count(&self) -> usize {
        self.state.lock().dead_queue.len()
    }

    #[must_use]
    pub fn all_count(&self) -> usize {
        self.state.lock().all_nodes.len()
    }

    /// Merge sniffed `NodeConfig`s: a config already present in `all_nodes` is ignored
    /// (idempotent); a new one is built via the factory and appended to the alive set. Returns
    /// the number of genuinely new nodes added.
    pub fn merge_sniffed(&self, configs: Vec<NodeConfig>) -> usize {
        let mut added = 0;
        let mut state = self.state.lock();
        for config in configs {
            if state.all_nodes.contains_key(&config) {
                continue;
            }
            let node = match (self.factory)(config.clone()) {
                Ok(node) => node,
                Err(err) => {
                    tracing::warn!(host = %config.host, error = %err, "failed to build sniffed node, skipping");
                    continue;
                }
            };
            state.all_nodes.insert(config.clone(), node);
            state.insertion_order.push(config.clone());
            state.alive_order.push(config);
            added += 1;
        }
        added
    }
}
