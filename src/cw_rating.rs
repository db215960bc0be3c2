/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cumulative weight rating.
//!
//! The cumulative weight (CW) of a transaction is the number of distinct transactions, including
//! itself, that approve it directly or transitively. Tip selection rates every transaction in the
//! future cone of its entry point: the sub-tangle reachable from the entry point by following approver
//! edges.
//!
//! Both implementations traverse iteratively with an explicit stack or queue, so deep tangles cannot
//! exhaust the call stack, and both are bounded:
//! - The future cone may span at most `max_depth` approver levels below the entry point and at most
//!   `max_nodes` transactions. Exceeding either fails with
//!   [`TraversalBudgetExceeded`](ConsensusError::TraversalBudgetExceeded). Callers must treat that as
//!   "rating unavailable", never as zero weight.
//! - Allocation failures fail with [`OutOfMemory`](ConsensusError::OutOfMemory).
//! - An optional deadline is checked periodically, failing with [`Timeout`](ConsensusError::Timeout).
//!
//! ## Implementations
//!
//! [`DfsFromDb`](CwCalculationImplementation::DfsFromDb) runs one depth-first traversal per rated
//! transaction, reading approvers from storage. It is simple and its memory use is linear, but it
//! revisits shared approvers once per rated transaction.
//!
//! [`LightDfs`](CwCalculationImplementation::LightDfs) discovers the future cone once, orders it
//! topologically, and computes weights in reverse topological order by unioning the approver sets of
//! each transaction's approvers (as bitsets). Transactions sharing a frontier share that work.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet, VecDeque},
    time::Instant,
};

use crate::{
    config::CwCalculationImplementation,
    errors::{ConsensusError, Module, TraversalBudget},
    tangle::{pluggables::KVStore, Tangle},
    types::data_types::CryptoHash,
};

/// How often (in visited transactions) traversals check their deadline.
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Bounds on a cumulative weight traversal.
#[derive(Clone, Copy, Debug)]
pub struct TraversalLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

/// The cumulative weights of the future cone of an entry point.
#[derive(Clone, Debug)]
pub struct CwRatings {
    entry_point: CryptoHash,
    weights: HashMap<CryptoHash, u64>,
    approvers: HashMap<CryptoHash, Vec<CryptoHash>>,
    topological_order: Vec<CryptoHash>,
}

impl CwRatings {
    pub fn entry_point(&self) -> &CryptoHash {
        &self.entry_point
    }

    pub fn weight(&self, hash: &CryptoHash) -> Option<u64> {
        self.weights.get(hash).copied()
    }

    /// Direct approvers of `hash` within the rated future cone.
    pub fn approvers(&self, hash: &CryptoHash) -> &[CryptoHash] {
        self.approvers
            .get(hash)
            .map(|approvers| approvers.as_slice())
            .unwrap_or(&[])
    }

    /// The rated transactions, each after all of its rated ancestors. Starts with the entry point.
    pub fn topological_order(&self) -> &[CryptoHash] {
        &self.topological_order
    }

    pub fn contains(&self, hash: &CryptoHash) -> bool {
        self.weights.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Rate the future cone of `entry_point`.
pub fn calculate<K: KVStore>(
    tangle: &Tangle<K>,
    entry_point: &CryptoHash,
    implementation: CwCalculationImplementation,
    limits: TraversalLimits,
    deadline: Option<Instant>,
) -> Result<CwRatings, ConsensusError> {
    let cone = FutureCone::discover(tangle, entry_point, limits, deadline)?;
    let topological_order = cone.topological_order(deadline)?;
    let weights = match implementation {
        CwCalculationImplementation::DfsFromDb => dfs_from_db(tangle, &cone, limits, deadline)?,
        CwCalculationImplementation::LightDfs => light_dfs(&cone, &topological_order, deadline)?,
    };

    let weights = cone
        .nodes
        .iter()
        .copied()
        .zip(weights)
        .collect::<HashMap<_, _>>();
    let approvers = cone
        .approvers
        .iter()
        .enumerate()
        .filter(|(_, approvers)| !approvers.is_empty())
        .map(|(node, approvers)| {
            (
                cone.nodes[node],
                approvers.iter().map(|approver| cone.nodes[*approver]).collect(),
            )
        })
        .collect();
    log::debug!(
        "rated {} transactions in the future cone of {}",
        weights.len(),
        entry_point
    );

    Ok(CwRatings {
        entry_point: *entry_point,
        weights,
        approvers,
        topological_order: topological_order
            .into_iter()
            .map(|node| cone.nodes[node])
            .collect(),
    })
}

fn check_deadline(visited: usize, deadline: Option<Instant>) -> Result<(), ConsensusError> {
    match deadline {
        Some(deadline) if visited % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline => {
            Err(ConsensusError::Timeout)
        }
        _ => Ok(()),
    }
}

fn out_of_memory<E>(_: E) -> ConsensusError {
    ConsensusError::OutOfMemory {
        module: Module::CumulativeWeight,
    }
}

/// The future cone of an entry point as an adjacency list over dense node indices.
struct FutureCone {
    nodes: Vec<CryptoHash>,
    approvers: Vec<Vec<usize>>,
}

impl FutureCone {
    fn discover<K: KVStore>(
        tangle: &Tangle<K>,
        entry_point: &CryptoHash,
        limits: TraversalLimits,
        deadline: Option<Instant>,
    ) -> Result<FutureCone, ConsensusError> {
        let mut index: HashMap<CryptoHash, usize> = HashMap::new();
        let mut cone = FutureCone {
            nodes: Vec::new(),
            approvers: Vec::new(),
        };
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

        index.insert(*entry_point, 0);
        cone.nodes.push(*entry_point);
        cone.approvers.push(Vec::new());
        queue.push_back((0, 0));

        while let Some((node, depth)) = queue.pop_front() {
            check_deadline(cone.nodes.len(), deadline)?;
            let hash = cone.nodes[node];
            for approver in tangle.get_approvers(&hash)? {
                let approver_node = match index.entry(approver) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        if depth + 1 > limits.max_depth {
                            return Err(ConsensusError::TraversalBudgetExceeded {
                                budget: TraversalBudget::Depth(limits.max_depth),
                            });
                        }
                        if cone.nodes.len() >= limits.max_nodes {
                            return Err(ConsensusError::TraversalBudgetExceeded {
                                budget: TraversalBudget::Nodes(limits.max_nodes),
                            });
                        }
                        cone.nodes.try_reserve(1).map_err(out_of_memory)?;
                        cone.approvers.try_reserve(1).map_err(out_of_memory)?;
                        let approver_node = cone.nodes.len();
                        cone.nodes.push(approver);
                        cone.approvers.push(Vec::new());
                        entry.insert(approver_node);
                        queue.push_back((approver_node, depth + 1));
                        approver_node
                    }
                };
                if !cone.approvers[node].contains(&approver_node) {
                    cone.approvers[node].push(approver_node);
                }
            }
        }

        Ok(cone)
    }

    /// Kahn's algorithm over approver edges: every node comes after all of its parents in the cone.
    fn topological_order(&self, deadline: Option<Instant>) -> Result<Vec<usize>, ConsensusError> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for approvers in &self.approvers {
            for approver in approvers {
                in_degree[*approver] += 1;
            }
        }

        let mut order = Vec::new();
        order.try_reserve_exact(self.nodes.len()).map_err(out_of_memory)?;
        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|node| in_degree[*node] == 0)
            .collect();
        while let Some(node) = ready.pop_front() {
            check_deadline(order.len() + 1, deadline)?;
            order.push(node);
            for approver in &self.approvers[node] {
                in_degree[*approver] -= 1;
                if in_degree[*approver] == 0 {
                    ready.push_back(*approver);
                }
            }
        }
        Ok(order)
    }
}

fn dfs_from_db<K: KVStore>(
    tangle: &Tangle<K>,
    cone: &FutureCone,
    limits: TraversalLimits,
    deadline: Option<Instant>,
) -> Result<Vec<u64>, ConsensusError> {
    let mut weights = Vec::with_capacity(cone.nodes.len());
    let mut visits = 0usize;
    for start in &cone.nodes {
        let mut visited: HashSet<CryptoHash> = HashSet::new();
        let mut stack = vec![*start];
        visited.insert(*start);
        while let Some(hash) = stack.pop() {
            visits += 1;
            check_deadline(visits, deadline)?;
            for approver in tangle.get_approvers(&hash)? {
                if visited.contains(&approver) {
                    continue;
                }
                if visited.len() >= limits.max_nodes {
                    return Err(ConsensusError::TraversalBudgetExceeded {
                        budget: TraversalBudget::Nodes(limits.max_nodes),
                    });
                }
                visited.try_reserve(1).map_err(out_of_memory)?;
                visited.insert(approver);
                stack.push(approver);
            }
        }
        weights.push(visited.len() as u64);
    }
    Ok(weights)
}

fn light_dfs(
    cone: &FutureCone,
    topological_order: &[usize],
    deadline: Option<Instant>,
) -> Result<Vec<u64>, ConsensusError> {
    let nodes = cone.nodes.len();
    let words = (nodes + 63) / 64;

    // approved_by[node] is the bitset of the nodes that approve `node`, itself included.
    let mut approved_by: Vec<Vec<u64>> = Vec::new();
    approved_by.try_reserve_exact(nodes).map_err(out_of_memory)?;
    for _ in 0..nodes {
        let mut bitset = Vec::new();
        bitset.try_reserve_exact(words).map_err(out_of_memory)?;
        bitset.resize(words, 0u64);
        approved_by.push(bitset);
    }

    for (visited, &node) in topological_order.iter().rev().enumerate() {
        check_deadline(visited + 1, deadline)?;
        let mut bitset = std::mem::take(&mut approved_by[node]);
        bitset[node / 64] |= 1u64 << (node % 64);
        for approver in &cone.approvers[node] {
            for (word, approver_word) in bitset.iter_mut().zip(&approved_by[*approver]) {
                *word |= approver_word;
            }
        }
        approved_by[node] = bitset;
    }

    Ok(approved_by
        .iter()
        .map(|bitset| bitset.iter().map(|word| word.count_ones() as u64).sum())
        .collect())
}
