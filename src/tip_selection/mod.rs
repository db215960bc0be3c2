/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Selection of the tips new transactions approve.
//!
//! # Overview
//!
//! A node attaching a new transaction asks the [`TipSelector`] for one or two tips to use as the
//! transaction's trunk and branch. Tip selection goes through four steps:
//! 1. **Entry point** ([`entry_point`]): pick the milestone the walks start from, at most `depth`
//!    milestones behind the latest solid milestone.
//! 2. **Rating** ([`cw_rating`](crate::cw_rating)): compute the cumulative weight of every transaction
//!    in the entry point's future cone.
//! 3. **Walks** ([`randomizer`]): walk from the entry point to a tip, preferring heavier approvers, once
//!    per requested tip.
//! 4. **Consistency**: if two tips were requested, check that their past cones do not spend the same
//!    funds twice. An inconsistent second tip is discarded and walked for again, up to
//!    [`tip_selection_max_retries`](crate::config::Configuration::tip_selection_max_retries) times.
//!
//! Every step of every walk goes through the [walk validator](walk_validator), so a walk never ends on
//! a tip that is not solid, references transactions older than
//! [`max_depth`](crate::config::Configuration::max_depth), or conflicts with the ledger.
//!
//! # Cancellation
//!
//! A [`TipSelectionRequest`] may carry a deadline. Rating and walks check it periodically and fail
//! with [`Timeout`](crate::errors::ConsensusError::Timeout) once it has passed. No partial result is
//! ever returned.

pub mod entry_point;

pub mod implementation;

pub mod randomizer;

pub mod walk_validator;

pub use implementation::{TipSelectionRequest, TipSelector};
