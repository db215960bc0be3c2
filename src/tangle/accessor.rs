/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Tangle`] accessor: the consensus engine's only way into storage.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    snapshot::MilestoneDelta,
    types::{
        data_types::{CryptoHash, MilestoneIndex},
        transaction::Transaction,
    },
};

use super::{
    pluggables::{KVGet, KVStore, TangleError},
    write_batch::TangleWriteBatch,
};

/// Hash-indexed view of the tangle stored in a [`KVStore`].
///
/// `Tangle` is cheap to clone; clones share the same store and the same write lock. The write lock
/// serializes read-modify-write updates (e.g., appending to an approver list) between the threads of
/// the engine. Plain reads do not take it.
#[derive(Clone)]
pub struct Tangle<K: KVStore> {
    kv_store: K,
    write_lock: Arc<Mutex<()>>,
}

impl<K: KVStore> Tangle<K> {
    pub fn new(kv_store: K) -> Tangle<K> {
        Tangle {
            kv_store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock holds no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, write_batch: TangleWriteBatch<K::WriteBatch>) {
        self.kv_store.clone().write(write_batch.0)
    }

    /* ↓↓↓ Transactions ↓↓↓  */

    pub fn get_transaction(&self, hash: &CryptoHash) -> Result<Option<Transaction>, TangleError> {
        if hash.is_null() {
            return Ok(None);
        }
        self.kv_store.transaction(hash)
    }

    pub fn contains(&self, hash: &CryptoHash) -> Result<bool, TangleError> {
        Ok(self.get_transaction(hash)?.is_some())
    }

    pub fn get_approvers(&self, hash: &CryptoHash) -> Result<Vec<CryptoHash>, TangleError> {
        self.kv_store.approvers(hash)
    }

    /// Whether the whole past cone of `hash` is stored. The null hash is always solid.
    pub fn is_solid(&self, hash: &CryptoHash) -> bool {
        self.kv_store.is_solid(hash)
    }

    /// Store `transaction` and register it as an approver of its trunk and branch, in one atomic
    /// write.
    ///
    /// Returns `false` without writing anything if the transaction is already stored.
    pub fn put_transaction(&self, transaction: &Transaction) -> Result<bool, TangleError> {
        let _guard = self.lock();
        if self.kv_store.transaction(&transaction.hash)?.is_some() {
            return Ok(false);
        }

        let mut wb = TangleWriteBatch::new();
        wb.set_transaction(transaction)?;

        let mut parents = transaction.parents().to_vec();
        parents.dedup();
        for parent in parents {
            let mut approvers = self.kv_store.approvers(&parent)?;
            if !approvers.contains(&transaction.hash) {
                approvers.push(transaction.hash);
                wb.set_approvers(&parent, &approvers)?;
            }
        }

        self.write(wb);
        Ok(true)
    }

    /// Mark every hash in `hashes` as solid, in one atomic write.
    pub fn set_solid(&self, hashes: &[CryptoHash]) {
        let mut wb = TangleWriteBatch::new();
        for hash in hashes {
            wb.set_solid(hash);
        }
        self.write(wb);
    }

    /// Get the tail of the bundle instance that `hash` belongs to, following approvers that reference
    /// the current transaction as their trunk and carry the previous `current_index`.
    ///
    /// Returns `None` if the transaction or part of its bundle instance has not arrived yet.
    pub fn find_tail(&self, hash: &CryptoHash) -> Result<Option<CryptoHash>, TangleError> {
        let mut current = match self.get_transaction(hash)? {
            Some(transaction) => transaction,
            None => return Ok(None),
        };
        while !current.is_tail() {
            let mut previous = None;
            for approver in self.get_approvers(&current.hash)? {
                if let Some(candidate) = self.get_transaction(&approver)? {
                    if candidate.trunk == current.hash
                        && candidate.bundle == current.bundle
                        && candidate.current_index + 1 == current.current_index
                    {
                        previous = Some(candidate);
                        break;
                    }
                }
            }
            match previous {
                Some(transaction) => current = transaction,
                None => return Ok(None),
            }
        }
        Ok(Some(current.hash))
    }

    /* ↓↓↓ Milestones ↓↓↓  */

    /// Record that the transaction `hash` carries the verified milestone at `index`.
    pub fn put_milestone(&self, index: MilestoneIndex, hash: &CryptoHash) -> Result<(), TangleError> {
        let _guard = self.lock();
        let mut wb = TangleWriteBatch::new();
        wb.set_milestone(index, hash)?;
        if self
            .kv_store
            .latest_milestone_index()?
            .map_or(true, |latest| latest < index)
        {
            wb.set_latest_milestone_index(index)?;
        }
        self.write(wb);
        Ok(())
    }

    pub fn milestone_at(&self, index: MilestoneIndex) -> Result<Option<CryptoHash>, TangleError> {
        self.kv_store.milestone_at(index)
    }

    /// The highest index among the milestones received so far, solid or not.
    pub fn latest_milestone_index(&self) -> Result<Option<MilestoneIndex>, TangleError> {
        self.kv_store.latest_milestone_index()
    }

    /// The index of the milestone that confirmed `hash`, if any. The null hash is confirmed by every
    /// milestone, which is reported as `start_index`.
    pub fn confirming_milestone(
        &self,
        hash: &CryptoHash,
        start_index: MilestoneIndex,
    ) -> Result<Option<MilestoneIndex>, TangleError> {
        if hash.is_null() {
            return Ok(Some(start_index));
        }
        self.kv_store.confirming_milestone(hash)
    }

    pub fn milestone_delta(
        &self,
        index: MilestoneIndex,
    ) -> Result<Option<MilestoneDelta>, TangleError> {
        self.kv_store.milestone_delta(index)
    }

    /* ↓↓↓ Ledger ↓↓↓  */

    /// The index of the milestone that applied the value of `bundle` to the ledger, if any.
    pub fn bundle_confirmation(
        &self,
        bundle: &CryptoHash,
    ) -> Result<Option<MilestoneIndex>, TangleError> {
        self.kv_store.bundle_confirmation(bundle)
    }

    /// The index of the latest milestone committed to this store, if any.
    pub fn solid_milestone_index(&self) -> Result<Option<MilestoneIndex>, TangleError> {
        self.kv_store.solid_milestone_index()
    }

    /// Persist the commit of milestone `index` in one atomic write:
    /// 1. Its ledger delta.
    /// 2. The confirmation of every transaction and bundle it confirmed.
    /// 3. `index` as the solid milestone index.
    /// 4. The deletion of the delta of milestone `pruned`, if any.
    ///
    /// Nothing is written if any value fails to serialize.
    pub fn commit_milestone(
        &self,
        index: MilestoneIndex,
        milestone_delta: &MilestoneDelta,
        pruned: Option<MilestoneIndex>,
    ) -> Result<(), TangleError> {
        let _guard = self.lock();
        let mut wb = TangleWriteBatch::new();
        wb.set_milestone_delta(index, milestone_delta)?;
        for hash in &milestone_delta.confirmed {
            wb.set_confirming_milestone(hash, index)?;
        }
        for bundle in &milestone_delta.bundles {
            wb.set_bundle_confirmation(bundle, index)?;
        }
        wb.set_solid_milestone_index(index)?;
        if let Some(pruned) = pruned {
            wb.delete_milestone_delta(pruned);
        }
        self.write(wb);
        Ok(())
    }

    /// Undo [`commit_milestone`](Self::commit_milestone) for the latest committed milestone `index`
    /// in one atomic write, moving the solid milestone index back to `index - 1`.
    pub fn revert_milestone(
        &self,
        index: MilestoneIndex,
        milestone_delta: &MilestoneDelta,
    ) -> Result<(), TangleError> {
        let _guard = self.lock();
        let mut wb = TangleWriteBatch::new();
        for hash in &milestone_delta.confirmed {
            wb.delete_confirming_milestone(hash);
        }
        for bundle in &milestone_delta.bundles {
            wb.delete_bundle_confirmation(bundle);
        }
        wb.delete_milestone_delta(index);
        wb.set_solid_milestone_index(index.saturating_sub(1))?;
        self.write(wb);
        Ok(())
    }
}
