/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed setters over a user-provided [`WriteBatch`].

use borsh::BorshSerialize;

use crate::{
    snapshot::MilestoneDelta,
    types::{
        data_types::{CryptoHash, MilestoneIndex},
        transaction::Transaction,
    },
};

use super::{
    pluggables::{Key, TangleError, WriteBatch},
    variables::{self, concat},
};

/// Forms the keys of the [tangle variables](super::variables) and serializes their values, so that
/// the rest of the crate never calls [`WriteBatch::set`] directly.
pub struct TangleWriteBatch<W: WriteBatch>(pub(super) W);

fn serialize<T: BorshSerialize + ?Sized>(
    value: &T,
    key: impl FnOnce() -> Key,
) -> Result<Vec<u8>, TangleError> {
    value
        .try_to_vec()
        .map_err(|err| TangleError::SerializeValueError {
            key: key(),
            source: err,
        })
}

impl<W: WriteBatch> TangleWriteBatch<W> {
    pub(crate) fn new() -> TangleWriteBatch<W> {
        TangleWriteBatch(W::new())
    }

    /* ↓↓↓ Transactions ↓↓↓  */

    pub fn set_transaction(&mut self, transaction: &Transaction) -> Result<(), TangleError> {
        let value = serialize(transaction, || Key::Transaction {
            hash: transaction.hash,
        })?;
        self.0
            .set(&concat(&variables::TRANSACTIONS, &transaction.hash.bytes()), &value);
        Ok(())
    }

    pub fn set_approvers(
        &mut self,
        hash: &CryptoHash,
        approvers: &[CryptoHash],
    ) -> Result<(), TangleError> {
        let value = serialize(approvers, || Key::Approvers { hash: *hash })?;
        self.0.set(&concat(&variables::APPROVERS, &hash.bytes()), &value);
        Ok(())
    }

    pub fn set_solid(&mut self, hash: &CryptoHash) {
        self.0.set(&concat(&variables::SOLID, &hash.bytes()), &[]);
    }

    /* ↓↓↓ Milestones ↓↓↓  */

    pub fn set_milestone(
        &mut self,
        index: MilestoneIndex,
        hash: &CryptoHash,
    ) -> Result<(), TangleError> {
        let value = serialize(hash, || Key::Milestone { index })?;
        self.0
            .set(&concat(&variables::MILESTONES, &index.to_le_bytes()), &value);
        Ok(())
    }

    pub fn set_latest_milestone_index(&mut self, index: MilestoneIndex) -> Result<(), TangleError> {
        let value = serialize(&index, || Key::LatestMilestoneIndex)?;
        self.0.set(&variables::LATEST_MILESTONE_INDEX, &value);
        Ok(())
    }

    pub fn set_confirming_milestone(
        &mut self,
        hash: &CryptoHash,
        index: MilestoneIndex,
    ) -> Result<(), TangleError> {
        let value = serialize(&index, || Key::ConfirmingMilestone { hash: *hash })?;
        self.0
            .set(&concat(&variables::CONFIRMING_MILESTONE, &hash.bytes()), &value);
        Ok(())
    }

    pub fn delete_confirming_milestone(&mut self, hash: &CryptoHash) {
        self.0
            .delete(&concat(&variables::CONFIRMING_MILESTONE, &hash.bytes()));
    }

    pub fn set_milestone_delta(
        &mut self,
        index: MilestoneIndex,
        milestone_delta: &MilestoneDelta,
    ) -> Result<(), TangleError> {
        let value = serialize(milestone_delta, || Key::MilestoneDelta { index })?;
        self.0
            .set(&concat(&variables::MILESTONE_DELTAS, &index.to_le_bytes()), &value);
        Ok(())
    }

    pub fn delete_milestone_delta(&mut self, index: MilestoneIndex) {
        self.0
            .delete(&concat(&variables::MILESTONE_DELTAS, &index.to_le_bytes()));
    }

    /* ↓↓↓ Ledger ↓↓↓  */

    pub fn set_bundle_confirmation(
        &mut self,
        bundle: &CryptoHash,
        index: MilestoneIndex,
    ) -> Result<(), TangleError> {
        let value = serialize(&index, || Key::ConfirmedBundle { bundle: *bundle })?;
        self.0
            .set(&concat(&variables::CONFIRMED_BUNDLES, &bundle.bytes()), &value);
        Ok(())
    }

    pub fn delete_bundle_confirmation(&mut self, bundle: &CryptoHash) {
        self.0
            .delete(&concat(&variables::CONFIRMED_BUNDLES, &bundle.bytes()));
    }

    pub fn set_solid_milestone_index(&mut self, index: MilestoneIndex) -> Result<(), TangleError> {
        let value = serialize(&index, || Key::SolidMilestoneIndex)?;
        self.0.set(&variables::SOLID_MILESTONE_INDEX, &value);
        Ok(())
    }
}
