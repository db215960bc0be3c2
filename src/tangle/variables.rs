/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each tangle variable is stored in the user-provided key-value
//! store.
//!
//! # List of state variables
//!
//! ## Transactions
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Transactions|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`Transaction`](crate::types::transaction::Transaction)|Every transaction received, keyed by its hash.|
//! |Approvers|[`CryptoHash`](crate::types::data_types::CryptoHash) -> `Vec<CryptoHash>`|The transactions that reference a transaction as trunk or branch. A hash may have approvers before the transaction itself has arrived.|
//! |Solid|[`CryptoHash`](crate::types::data_types::CryptoHash) -> `()`|Set once the whole past cone of a transaction is stored. Never unset.|
//!
//! ## Milestones
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Milestones|[`MilestoneIndex`](crate::types::data_types::MilestoneIndex) -> [`CryptoHash`](crate::types::data_types::CryptoHash)|The transaction carrying each milestone whose signature has been verified.|
//! |Latest Milestone Index|[`MilestoneIndex`](crate::types::data_types::MilestoneIndex)|The highest index among stored milestones, solid or not.|
//! |Confirming Milestone|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`MilestoneIndex`](crate::types::data_types::MilestoneIndex)|The milestone whose validation confirmed a transaction.|
//! |Milestone Deltas|[`MilestoneIndex`](crate::types::data_types::MilestoneIndex) -> [`MilestoneDelta`](crate::snapshot::MilestoneDelta)|The ledger delta committed by each of the last `snapshot_depth` milestones, and the transactions it confirmed.|
//!
//! ## Ledger
//!
//! |Variable|Type|Description|
//! |---|---|---|
//! |Confirmed Bundles|[`CryptoHash`](crate::types::data_types::CryptoHash) -> [`MilestoneIndex`](crate::types::data_types::MilestoneIndex)|The milestone that applied the value of a bundle to the ledger. Reattachments of a confirmed bundle carry the same bundle hash and are never applied again.|
//! |Solid Milestone Index|[`MilestoneIndex`](crate::types::data_types::MilestoneIndex)|The index of the latest committed milestone. Written in the same batch as the commit itself, so a snapshot that lags behind the store can be caught up from the milestone deltas.|
//!
//! # Persistence
//!
//! Single values are stored at their one-byte key. Mappings of the form "`A` -> `B`" are stored at
//! keys formed by concatenating the variable's one-byte prefix with the serialization of `A`
//! (for milestone indices, its little-endian bytes). Values are Borsh-serialized.

// State variables
pub const TRANSACTIONS: [u8; 1] = [0];
pub const APPROVERS: [u8; 1] = [1];
pub const SOLID: [u8; 1] = [2];
pub const MILESTONES: [u8; 1] = [4];
pub const LATEST_MILESTONE_INDEX: [u8; 1] = [5];
pub const CONFIRMING_MILESTONE: [u8; 1] = [6];
pub const MILESTONE_DELTAS: [u8; 1] = [7];
pub const CONFIRMED_BUNDLES: [u8; 1] = [8];
pub const SOLID_MILESTONE_INDEX: [u8; 1] = [9];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
