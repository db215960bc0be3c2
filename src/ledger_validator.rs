/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validation and commitment of milestone ledger deltas.
//!
//! When a milestone becomes the next solid milestone, every transaction in its past cone that no
//! earlier milestone confirmed becomes confirmed by it. The ledger validator:
//! 1. Collects that newly confirmed cone, stopping at already confirmed transactions. Every transaction
//!    in it must be solid.
//! 2. Checks that the milestone approves its predecessor.
//! 3. Sums the values of every bundle whose tail is in the cone into a [`StateDelta`]. Every such
//!    bundle must be valid. A bundle hash is counted once, however many times the bundle is attached,
//!    and never again once an earlier milestone has applied it.
//! 4. Checks that the delta is consistent with the [snapshot](crate::snapshot): no balance goes
//!    negative and the supply is unchanged.
//! 5. Persists the delta, the confirmed transactions and bundles, and the new solid milestone index
//!    in one write batch, then applies the delta to the snapshot.
//!
//! Per milestone, validation moves through `Unvalidated → Valid → Committed`. `Committed` is terminal:
//! validating a committed milestone again returns [`Committed`](MilestoneStatus::Committed) without
//! touching the snapshot. The only way back is [`revert_milestone`](LedgerValidator::revert_milestone)
//! on the latest committed milestone.
//!
//! The store is the source of truth for the solid milestone index. A snapshot loaded from a file
//! saved before the latest commits is brought up to date with [`catch_up`](LedgerValidator::catch_up).

use std::{
    collections::HashSet,
    sync::{mpsc::Sender, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use crate::{
    bundle_validator,
    errors::ConsensusError,
    events::{CommitMilestoneEvent, Event, RevertMilestoneEvent},
    snapshot::{MilestoneDelta, Snapshot, SnapshotHandle, StateDelta},
    tangle::{pluggables::KVStore, Tangle},
    types::{
        data_types::{Address, CryptoHash, MilestoneIndex, SecurityLevel},
        milestone::Milestone,
        transaction::Transaction,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MilestoneStatus {
    Unvalidated,
    Valid,
    Committed,
}

#[derive(Clone)]
pub struct LedgerValidator<K: KVStore> {
    tangle: Tangle<K>,
    snapshot: SnapshotHandle,
    security_level: SecurityLevel,
    snapshot_depth: u64,
    milestone_start_index: MilestoneIndex,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> LedgerValidator<K> {
    pub fn new(
        tangle: Tangle<K>,
        snapshot: SnapshotHandle,
        security_level: SecurityLevel,
        snapshot_depth: u64,
        milestone_start_index: MilestoneIndex,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            tangle,
            snapshot,
            security_level,
            snapshot_depth,
            milestone_start_index,
            event_publisher,
        }
    }

    pub(crate) fn read_snapshot(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn latest_solid_milestone_index(&self) -> MilestoneIndex {
        self.read_snapshot().milestone_index()
    }

    pub fn milestone_status(&self, milestone: &Milestone) -> Result<MilestoneStatus, ConsensusError> {
        let latest_solid_index = self.latest_solid_milestone_index();
        if milestone.index <= latest_solid_index
            && self.tangle.confirming_milestone(&milestone.hash, self.milestone_start_index)?
                == Some(milestone.index)
        {
            Ok(MilestoneStatus::Committed)
        } else {
            Ok(MilestoneStatus::Unvalidated)
        }
    }

    /// Validate the ledger delta introduced by `milestone` and, if it is consistent, commit it.
    ///
    /// `milestone` must be the successor of the latest solid milestone, or an already committed
    /// milestone.
    pub fn validate_milestone(&self, milestone: &Milestone) -> Result<MilestoneStatus, ConsensusError> {
        let mut snapshot = self.write_snapshot();
        let latest_solid_index = snapshot.milestone_index();

        if milestone.index <= latest_solid_index {
            if self.tangle.confirming_milestone(&milestone.hash, self.milestone_start_index)?
                == Some(milestone.index)
            {
                return Ok(MilestoneStatus::Committed);
            }
            return Err(ConsensusError::UnexpectedMilestoneIndex {
                expected: latest_solid_index + 1,
                actual: milestone.index,
            });
        }
        if milestone.index != latest_solid_index + 1 {
            return Err(ConsensusError::UnexpectedMilestoneIndex {
                expected: latest_solid_index + 1,
                actual: milestone.index,
            });
        }
        if !self.tangle.contains(&milestone.hash)? {
            return Err(ConsensusError::CouldNotLoadMilestone {
                index: milestone.index,
            });
        }

        // 1. Collect the newly confirmed cone.
        let mut visited = HashSet::new();
        let cone = unconfirmed_cone(
            &self.tangle,
            &[milestone.hash],
            &mut visited,
            self.milestone_start_index,
        )?;
        if let Some(transaction) = cone
            .iter()
            .find(|transaction| !self.tangle.is_solid(&transaction.hash))
        {
            return Err(ConsensusError::TransactionNotSolid {
                transaction: transaction.hash,
            });
        }

        // 2. The milestone must approve its predecessor.
        if let Some(predecessor) = self.tangle.milestone_at(latest_solid_index)? {
            let approves_predecessor = cone
                .iter()
                .any(|transaction| transaction.parents().contains(&predecessor));
            if !approves_predecessor {
                return Err(ConsensusError::MilestoneDoesNotApprovePredecessor {
                    index: milestone.index,
                });
            }
        }

        // 3. Sum the bundles confirmed by the milestone.
        let counted = HashSet::new();
        let (delta, bundles) = match cone_delta(&self.tangle, &cone, self.security_level, &counted)? {
            ConeDelta::Valid { delta, bundles } => (delta, bundles),
            ConeDelta::InvalidBundle(transaction) => {
                return Err(ConsensusError::InvalidTransaction { transaction })
            }
        };

        // 4. The delta must be consistent with the snapshot.
        if !snapshot.is_consistent(&delta) {
            return Err(ConsensusError::InconsistentDelta {
                index: milestone.index,
            });
        }
        log::debug!(
            "milestone {} is valid: {} newly confirmed transactions, {} balance changes",
            milestone.index,
            cone.len(),
            delta.iter().count()
        );

        // 5. Commit. The delta was checked against the snapshot under the same lock, so applying it
        // after the write cannot fail.
        let confirmed: Vec<CryptoHash> = cone.iter().map(|transaction| transaction.hash).collect();
        let confirmed_transactions = confirmed.len();
        let pruned = (self.snapshot_depth > 0 && milestone.index.int() > self.snapshot_depth)
            .then(|| milestone.index.saturating_sub(self.snapshot_depth));
        self.tangle.commit_milestone(
            milestone.index,
            &MilestoneDelta {
                delta: delta.clone(),
                confirmed,
                bundles,
            },
            pruned,
        )?;
        snapshot.apply_delta(&delta, milestone.index)?;

        Event::publish(
            &self.event_publisher,
            Event::CommitMilestone(CommitMilestoneEvent {
                timestamp: SystemTime::now(),
                index: milestone.index,
                milestone: milestone.hash,
                confirmed_transactions,
            }),
        );

        Ok(MilestoneStatus::Committed)
    }

    /// Undo the latest committed milestone, restoring both the snapshot and the confirmation marks
    /// of the transactions it confirmed.
    pub fn revert_milestone(&self, index: MilestoneIndex) -> Result<(), ConsensusError> {
        let mut snapshot = self.write_snapshot();
        let latest_solid_index = snapshot.milestone_index();
        if index != latest_solid_index || index <= self.milestone_start_index {
            return Err(ConsensusError::UnexpectedMilestoneIndex {
                expected: latest_solid_index,
                actual: index,
            });
        }
        let milestone_delta = self
            .tangle
            .milestone_delta(index)?
            .ok_or(ConsensusError::CouldNotLoadMilestone { index })?;

        snapshot.revert_delta(&milestone_delta.delta, index)?;
        if let Err(err) = self.tangle.revert_milestone(index, &milestone_delta) {
            snapshot.apply_delta(&milestone_delta.delta, index)?;
            return Err(err.into());
        }
        log::warn!("reverted milestone {}", index);

        Event::publish(
            &self.event_publisher,
            Event::RevertMilestone(RevertMilestoneEvent {
                timestamp: SystemTime::now(),
                index,
            }),
        );

        Ok(())
    }

    /// Re-apply the stored deltas of the milestones committed after the snapshot was taken, so that
    /// the snapshot reflects the latest milestone committed to the store.
    ///
    /// Fails with [`CouldNotLoadMilestone`](ConsensusError::CouldNotLoadMilestone) if one of those
    /// deltas has been pruned, i.e., the snapshot is more than `snapshot_depth` milestones behind.
    /// Returns the latest solid milestone index afterwards.
    pub fn catch_up(&self) -> Result<MilestoneIndex, ConsensusError> {
        let mut snapshot = self.write_snapshot();
        let stored_index = match self.tangle.solid_milestone_index()? {
            Some(stored_index) => stored_index,
            None => return Ok(snapshot.milestone_index()),
        };
        if stored_index < snapshot.milestone_index() {
            log::warn!(
                "the snapshot is at milestone {} but the store only at milestone {}",
                snapshot.milestone_index(),
                stored_index
            );
        }

        while snapshot.milestone_index() < stored_index {
            let index = snapshot.milestone_index() + 1;
            let milestone_delta = self
                .tangle
                .milestone_delta(index)?
                .ok_or(ConsensusError::CouldNotLoadMilestone { index })?;
            snapshot.apply_delta(&milestone_delta.delta, index)?;
            log::info!("caught the snapshot up to milestone {}", index);
        }
        Ok(snapshot.milestone_index())
    }

    /// Get the balance of `address` at milestone `index`, or at the latest solid milestone if `index`
    /// is `None`.
    ///
    /// Historical balances are available for the last `snapshot_depth` milestones.
    pub fn get_balance(
        &self,
        address: &Address,
        index: Option<MilestoneIndex>,
    ) -> Result<u64, ConsensusError> {
        let snapshot = self.read_snapshot();
        let latest_solid_index = snapshot.milestone_index();
        let index = index.unwrap_or(latest_solid_index);
        if index > latest_solid_index
            || index < self.milestone_start_index
            || latest_solid_index - index > self.snapshot_depth
        {
            return Err(ConsensusError::SnapshotBalanceNotFound { index });
        }

        let mut balance = snapshot.balance(address) as i128;
        let mut reverted = latest_solid_index;
        while reverted > index {
            let milestone_delta = self
                .tangle
                .milestone_delta(reverted)?
                .ok_or(ConsensusError::SnapshotBalanceNotFound { index })?;
            balance -= milestone_delta.delta.get(address) as i128;
            reverted = reverted.saturating_sub(1);
        }

        u64::try_from(balance).map_err(|_| ConsensusError::InconsistentDelta { index })
    }

    /// Whether the transaction `hash` has been confirmed by a milestone.
    pub fn is_transaction_confirmed(&self, hash: &CryptoHash) -> Result<bool, ConsensusError> {
        Ok(self
            .tangle
            .confirming_milestone(hash, self.milestone_start_index)?
            .is_some())
    }

    /// Whether the unconfirmed past cones of `tips`, taken together, are consistent with the
    /// snapshot.
    pub fn tips_consistent(&self, tips: &[CryptoHash]) -> Result<bool, ConsensusError> {
        let snapshot = self.read_snapshot();
        tips_consistent(
            &self.tangle,
            &snapshot,
            tips,
            self.security_level,
            self.milestone_start_index,
        )
    }
}

/// Whether the unconfirmed past cones of `tips`, taken together, are consistent with `snapshot`.
pub(crate) fn tips_consistent<K: KVStore>(
    tangle: &Tangle<K>,
    snapshot: &Snapshot,
    tips: &[CryptoHash],
    security_level: SecurityLevel,
    milestone_start_index: MilestoneIndex,
) -> Result<bool, ConsensusError> {
    let mut visited = HashSet::new();
    let cone = unconfirmed_cone(tangle, tips, &mut visited, milestone_start_index)?;
    Ok(match cone_delta(tangle, &cone, security_level, &HashSet::new())? {
        ConeDelta::Valid { delta, .. } => snapshot.is_consistent(&delta),
        ConeDelta::InvalidBundle(_) => false,
    })
}

/// Collect the past cone of `starts`, stopping at confirmed transactions and at hashes already in
/// `visited`. Every transaction collected is added to `visited`.
///
/// Fails with [`TransactionNotSolid`](ConsensusError::TransactionNotSolid) if part of the cone is not
/// stored.
pub(crate) fn unconfirmed_cone<K: KVStore>(
    tangle: &Tangle<K>,
    starts: &[CryptoHash],
    visited: &mut HashSet<CryptoHash>,
    milestone_start_index: MilestoneIndex,
) -> Result<Vec<Transaction>, ConsensusError> {
    let mut cone = Vec::new();
    let mut stack: Vec<CryptoHash> = starts.to_vec();
    while let Some(hash) = stack.pop() {
        if hash.is_null() || visited.contains(&hash) {
            continue;
        }
        visited.insert(hash);
        if tangle
            .confirming_milestone(&hash, milestone_start_index)?
            .is_some()
        {
            continue;
        }
        let transaction = tangle
            .get_transaction(&hash)?
            .ok_or(ConsensusError::TransactionNotSolid { transaction: hash })?;
        stack.extend(transaction.parents());
        cone.push(transaction);
    }
    Ok(cone)
}

pub(crate) enum ConeDelta {
    /// The balance changes of the cone, and the hashes of the bundles counted into them.
    Valid {
        delta: StateDelta,
        bundles: Vec<CryptoHash>,
    },
    /// The cone contains the tail of an invalid value bundle.
    InvalidBundle(CryptoHash),
}

/// Sum the values of the bundles whose tails are in `cone`.
///
/// Value transactions whose tail is not in the cone do not count: their bundle is applied when its
/// tail is confirmed. Every value bundle is validated, but its value counts only once per bundle hash,
/// and not at all if its hash is in `counted` or was applied by a committed milestone. A signed bundle
/// attached twice is a single transfer.
pub(crate) fn cone_delta<K: KVStore>(
    tangle: &Tangle<K>,
    cone: &[Transaction],
    security_level: SecurityLevel,
    counted: &HashSet<CryptoHash>,
) -> Result<ConeDelta, ConsensusError> {
    let mut delta = StateDelta::new();
    let mut bundles: Vec<CryptoHash> = Vec::new();
    for tail in cone.iter().filter(|transaction| transaction.is_tail()) {
        if tail.last_index == 0 && tail.value == 0 {
            continue;
        }
        let bundle = match bundle_validator::load_bundle(tangle, &tail.hash)? {
            Some(bundle) => bundle,
            None => return Ok(ConeDelta::InvalidBundle(tail.hash)),
        };
        if bundle.iter().all(|transaction| transaction.value == 0) {
            continue;
        }
        if !bundle_validator::validate(&bundle, security_level).is_valid() {
            return Ok(ConeDelta::InvalidBundle(tail.hash));
        }
        if counted.contains(&tail.bundle)
            || bundles.contains(&tail.bundle)
            || tangle.bundle_confirmation(&tail.bundle)?.is_some()
        {
            log::debug!("bundle {} is already counted, ignoring {}", tail.bundle, tail.hash);
            continue;
        }
        for transaction in bundle.iter() {
            delta.add(transaction.address, transaction.value);
        }
        bundles.push(tail.bundle);
    }
    Ok(ConeDelta::Valid { delta, bundles })
}
