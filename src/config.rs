/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Parameters of the consensus engine.
//!
//! The configuration is built with the builder pattern, for example:
//!
//! ```ignore
//! let configuration = Configuration::builder()
//!     .coordinator_address(coordinator_address)
//!     .coordinator_public_keys(vec![coordinator_key.verifying_key()])
//!     .max_depth(15)
//!     .alpha(0.001)
//!     .log_events(true)
//!     .build();
//! ```
//!
//! Only the coordinator's address and public keys are required. Every other parameter has a default
//! suitable for a production node.
//!
//! ## Max depth
//!
//! `max_depth` bounds how far behind the latest solid milestone a transaction may be referenced by new
//! transactions. Tip selection starts its walks at most `max_depth` milestones back and never returns a
//! transaction whose past cone reaches a transaction confirmed more than `max_depth` milestones ago.
//!
//! ## Log Events
//!
//! The engine logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a [logging
//! implementation](https://docs.rs/log/latest/log/#available-logging-implementations).

use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{Address, MilestoneIndex, SecurityLevel},
};

/// Which algorithm computes cumulative weights. See [`cw_rating`](crate::cw_rating).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CwCalculationImplementation {
    /// One depth-first traversal per rated transaction, reading approvers from storage.
    DfsFromDb,
    /// One traversal to discover the rated sub-tangle, then set unions in reverse topological order.
    LightDfs,
}

/// Which algorithm turns cumulative weights into a tip. See
/// [`randomizer`](crate::tip_selection::randomizer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpRandomizerImplementation {
    /// A single weighted random walk from the entry point.
    RandomWalk,
    /// Compute the exit probability of every tip, then sample one.
    RandomizeSample,
}

/// What to do when no consistent pair of tips is found within the retry bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TipPairFallback {
    /// Fail with [`TipsInconsistent`](crate::errors::ConsensusError::TipsInconsistent).
    Fail,
    /// Return the first tip twice.
    SingleTip,
}

#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.coordinator_address(...)`
    - `.coordinator_public_keys(...)`

    Optional: every other field.
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the address that milestones are sent from. Required."))]
    pub coordinator_address: Address,
    #[builder(setter(doc = "Set the public keys that milestone signatures are checked against. Required."))]
    pub coordinator_public_keys: Vec<VerifyingKey>,
    #[builder(default = 0.001, setter(doc = "Set the bias of the random walk towards heavier approvers. 0 makes the walk unbiased. Defaults to 0.001."))]
    pub alpha: f64,
    #[builder(default = 15, setter(doc = "Set the number of milestones behind the latest solid milestone that a tip may reference. Defaults to 15."))]
    pub max_depth: u64,
    #[builder(default = 20_000, setter(doc = "Set the number of transactions analysed when checking whether a transaction is below max depth. Defaults to 20000."))]
    pub below_max_depth_cache_size: usize,
    #[builder(default, setter(doc = "Set the security level of input addresses. Defaults to 2."))]
    pub security_level: SecurityLevel,
    #[builder(default = 100, setter(doc = "Set the number of milestone ledger deltas retained for rollback and historical balances. Defaults to 100."))]
    pub snapshot_depth: u64,
    #[builder(default, setter(doc = "Set the milestone index of the initial snapshot. Defaults to 0."))]
    pub milestone_start_index: MilestoneIndex,
    #[builder(default = 2_779_530_283_277_761, setter(doc = "Set the total supply that snapshot balances always add up to."))]
    pub total_supply: u64,
    #[builder(default = CwCalculationImplementation::LightDfs, setter(doc = "Set the cumulative weight algorithm. Defaults to LightDfs."))]
    pub cw_calculation: CwCalculationImplementation,
    #[builder(default = 10_000, setter(doc = "Set how many approver levels a cumulative weight traversal may descend. Defaults to 10000."))]
    pub cw_max_traversal_depth: usize,
    #[builder(default = 1_000_000, setter(doc = "Set how many transactions a cumulative weight traversal may visit. Defaults to 1000000."))]
    pub cw_max_traversal_nodes: usize,
    #[builder(default = EpRandomizerImplementation::RandomWalk, setter(doc = "Set the exit probability randomizer. Defaults to RandomWalk."))]
    pub ep_randomizer: EpRandomizerImplementation,
    #[builder(default = 10, setter(doc = "Set how many times the second tip is re-selected when it is inconsistent with the first. Defaults to 10."))]
    pub tip_selection_max_retries: u32,
    #[builder(default = TipPairFallback::Fail, setter(doc = "Set what happens once the retries are exhausted. Defaults to Fail."))]
    pub tip_pair_fallback: TipPairFallback,
    #[builder(default = 50, setter(doc = "Set how many out-of-order milestones may wait for their predecessor. Defaults to 50."))]
    pub milestone_buffer_capacity: usize,
    #[builder(default = 5_000, setter(doc = "Set the maximum number of tips kept in the tips cache. Defaults to 5000."))]
    pub tips_cache_capacity: usize,
    #[builder(default = Duration::from_secs(300), setter(doc = "Set how long a tip stays in the tips cache without gaining an approver. Defaults to 5 minutes."))]
    pub tip_retention: Duration,
    #[builder(default = Duration::from_millis(10), setter(doc = "Set how long idle worker threads wait for new work. Defaults to 10 ms."))]
    pub worker_poll_interval: Duration,
    #[builder(default = Duration::from_secs(5), setter(doc = "Set how long `stop` waits for workers to drain. Defaults to 5 seconds."))]
    pub worker_stop_timeout: Duration,
    #[builder(default = Duration::from_secs(30), setter(doc = "Set how long a request for a missing transaction may go unanswered before it is issued again. Defaults to 30 seconds."))]
    pub request_retry_interval: Duration,
    #[builder(default, setter(doc = "Set the stack size of worker threads in bytes. Defaults to None, the platform default."))]
    pub worker_stack_size: Option<usize>,
    #[builder(default = Duration::from_secs(2 * 60 * 60), setter(doc = "Set how far in the future a received transaction's timestamp may be. Defaults to 2 hours."))]
    pub max_timestamp_drift: Duration,
    #[builder(default, setter(doc = "Set the earliest timestamp, in seconds since the Unix epoch, that a received transaction may carry. Defaults to 0."))]
    pub min_transaction_timestamp: u64,
    #[builder(default = false, setter(doc = "Enable the default event loggers? Defaults to false."))]
    pub log_events: bool,
}
