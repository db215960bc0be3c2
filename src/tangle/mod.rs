/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Storage of the tangle over a pluggable key-value store.
//!
//! The tangle is an arena of transactions indexed by hash. Trunk and branch references, and the
//! reverse "approver" edges, are hash values that are looked up through the [`Tangle`] accessor,
//! never pointers, so a transaction that has not arrived yet (or has been pruned) is simply a hash
//! that is not found.
//!
//! Besides transactions, the accessor stores the annotations the consensus engine maintains: solidity
//! flags, milestones, the milestone that confirmed each transaction, and the ledger deltas of recent
//! milestones. The [`variables`] module documents the layout.

pub mod accessor;

pub mod pluggables;

pub mod variables;

pub mod write_batch;

pub use accessor::Tangle;
