/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Consensus engine for a DAG-structured ledger ("tangle").
//!
//! Transactions in a tangle approve two earlier transactions instead of being packed into blocks. A
//! coordinator periodically issues signed **milestones** that confirm everything they approve and
//! totally order the ledger. This crate implements the node-side consensus logic:
//! - [Solidification](solidifier) of transactions arriving in any order.
//! - [Milestone tracking](milestone_tracker) and [ledger validation](ledger_validator) against a
//!   balance [snapshot](snapshot).
//! - [Tip selection](tip_selection) by [cumulative weight](cw_rating) biased random walks.
//!
//! Storage is pluggable: the library user provides a [key-value store](tangle::pluggables::KVStore)
//! and a [requester](requester::Requester) that fetches missing transactions from peers. Everything is
//! wired together by [`ConsensusSpec`](consensus::ConsensusSpec).

pub mod bundle_validator;

pub mod config;

pub mod consensus;

pub mod cw_rating;

pub mod errors;

pub(crate) mod event_bus;

pub mod events;

pub mod ledger_validator;

pub mod lifecycle;

pub mod logging;

pub mod milestone_tracker;

pub mod requester;

pub mod snapshot;

pub mod solidifier;

pub mod tangle;

pub mod tip_selection;

pub mod tips_cache;

pub mod transaction_validator;

pub mod types;
