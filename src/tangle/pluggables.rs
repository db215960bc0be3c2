/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable tangle persistence.
//!
//! The consensus engine does not ship a storage engine. Instead, the library user provides a type
//! implementing [`KVStore`], and the engine lays out its [state variables](super::variables) on top of
//! it. `KVGet`'s provided methods decode those variables; writes go through
//! [`TangleWriteBatch`](super::write_batch::TangleWriteBatch).

use std::fmt::{self, Display, Formatter};

use borsh::BorshDeserialize;

use crate::{
    snapshot::MilestoneDelta,
    types::{
        data_types::{CryptoHash, MilestoneIndex},
        transaction::Transaction,
    },
};

use super::variables::{self, concat};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Apply every insertion and deletion in `wb` atomically.
    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /* ↓↓↓ Transactions ↓↓↓  */

    fn transaction(&self, hash: &CryptoHash) -> Result<Option<Transaction>, TangleError> {
        self.get(&concat(&variables::TRANSACTIONS, &hash.bytes()))
            .map(|bytes| deserialize(&bytes, || Key::Transaction { hash: *hash }))
            .transpose()
    }

    fn approvers(&self, hash: &CryptoHash) -> Result<Vec<CryptoHash>, TangleError> {
        Ok(self
            .get(&concat(&variables::APPROVERS, &hash.bytes()))
            .map(|bytes| deserialize(&bytes, || Key::Approvers { hash: *hash }))
            .transpose()?
            .unwrap_or_default())
    }

    fn is_solid(&self, hash: &CryptoHash) -> bool {
        hash.is_null()
            || self
                .get(&concat(&variables::SOLID, &hash.bytes()))
                .is_some()
    }

    /* ↓↓↓ Milestones ↓↓↓  */

    fn milestone_at(&self, index: MilestoneIndex) -> Result<Option<CryptoHash>, TangleError> {
        self.get(&concat(&variables::MILESTONES, &index.to_le_bytes()))
            .map(|bytes| deserialize(&bytes, || Key::Milestone { index }))
            .transpose()
    }

    fn latest_milestone_index(&self) -> Result<Option<MilestoneIndex>, TangleError> {
        self.get(&variables::LATEST_MILESTONE_INDEX)
            .map(|bytes| deserialize(&bytes, || Key::LatestMilestoneIndex))
            .transpose()
    }

    fn confirming_milestone(
        &self,
        hash: &CryptoHash,
    ) -> Result<Option<MilestoneIndex>, TangleError> {
        self.get(&concat(&variables::CONFIRMING_MILESTONE, &hash.bytes()))
            .map(|bytes| deserialize(&bytes, || Key::ConfirmingMilestone { hash: *hash }))
            .transpose()
    }

    fn milestone_delta(&self, index: MilestoneIndex) -> Result<Option<MilestoneDelta>, TangleError> {
        self.get(&concat(&variables::MILESTONE_DELTAS, &index.to_le_bytes()))
            .map(|bytes| deserialize(&bytes, || Key::MilestoneDelta { index }))
            .transpose()
    }

    /* ↓↓↓ Ledger ↓↓↓  */

    fn bundle_confirmation(&self, bundle: &CryptoHash) -> Result<Option<MilestoneIndex>, TangleError> {
        self.get(&concat(&variables::CONFIRMED_BUNDLES, &bundle.bytes()))
            .map(|bytes| deserialize(&bytes, || Key::ConfirmedBundle { bundle: *bundle }))
            .transpose()
    }

    fn solid_milestone_index(&self) -> Result<Option<MilestoneIndex>, TangleError> {
        self.get(&variables::SOLID_MILESTONE_INDEX)
            .map(|bytes| deserialize(&bytes, || Key::SolidMilestoneIndex))
            .transpose()
    }
}

fn deserialize<T: BorshDeserialize>(bytes: &[u8], key: impl FnOnce() -> Key) -> Result<T, TangleError> {
    T::deserialize(&mut &*bytes).map_err(|err| TangleError::DeserializeValueError {
        key: key(),
        source: err,
    })
}

/// Error when trying to read a value corresponding to a given key from the [key value store][KVStore].
/// The error may arise in the following circumstances:
/// 1. The value corresponding to a given key cannot be deserialized into its expected type,
/// 2. The value corresponding to a given key cannot be found, although the values stored at other keys
///    imply that it should exist,
/// 3. A value to be written cannot be serialized.
#[derive(Debug)]
pub enum TangleError {
    DeserializeValueError { key: Key, source: std::io::Error },
    ValueExpectedButNotFound { key: Key },
    SerializeValueError { key: Key, source: std::io::Error },
}

impl Display for TangleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TangleError::DeserializeValueError { key, source } => {
                write!(f, "could not deserialize {}: {}", key, source)
            }
            TangleError::ValueExpectedButNotFound { key } => {
                write!(f, "{} expected but not found", key)
            }
            TangleError::SerializeValueError { key, source } => {
                write!(f, "could not serialize {}: {}", key, source)
            }
        }
    }
}

impl std::error::Error for TangleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TangleError::DeserializeValueError { source, .. }
            | TangleError::SerializeValueError { source, .. } => Some(source),
            TangleError::ValueExpectedButNotFound { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum Key {
    Transaction { hash: CryptoHash },
    Approvers { hash: CryptoHash },
    Milestone { index: MilestoneIndex },
    LatestMilestoneIndex,
    ConfirmingMilestone { hash: CryptoHash },
    MilestoneDelta { index: MilestoneIndex },
    ConfirmedBundle { bundle: CryptoHash },
    SolidMilestoneIndex,
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Transaction { hash } => write!(f, "Transaction {}", hash),
            Key::Approvers { hash } => write!(f, "Approvers of transaction {}", hash),
            Key::Milestone { index } => write!(f, "Milestone {}", index),
            Key::LatestMilestoneIndex => write!(f, "Latest Milestone Index"),
            Key::ConfirmingMilestone { hash } => {
                write!(f, "Confirming Milestone of transaction {}", hash)
            }
            Key::MilestoneDelta { index } => write!(f, "Ledger Delta of milestone {}", index),
            Key::ConfirmedBundle { bundle } => write!(f, "Confirmation of bundle {}", bundle),
            Key::SolidMilestoneIndex => write!(f, "Solid Milestone Index"),
        }
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
