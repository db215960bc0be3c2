/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The exit probability transaction validator: the gate every step of a walk goes through.
//!
//! A walk only ever moves onto a tail that:
//! 1. Is stored and solid.
//! 2. If confirmed, was confirmed by a milestone no older than `latest_solid_index - max_depth`.
//! 3. Belongs to a valid bundle, if that bundle moves value.
//! 4. Is not "below max depth": no transaction in its unconfirmed past cone references a transaction
//!    confirmed by a milestone older than `latest_solid_index - max_depth`. The analysis gives up, and
//!    counts the transaction as below max depth, after `below_max_depth_cache_size` transactions.
//! 5. Together with everything the walk has already accepted, leaves the ledger consistent with the
//!    snapshot. A bundle the walk has already accepted under another attachment counts once.
//!
//! The checks run during the walk, pruning transitions, so a walk never ends on a tip that would be
//! rejected afterwards.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    bundle_validator,
    errors::ConsensusError,
    ledger_validator::{cone_delta, unconfirmed_cone, ConeDelta},
    snapshot::{Snapshot, StateDelta},
    tangle::{pluggables::KVStore, Tangle},
    types::data_types::{CryptoHash, MilestoneIndex, SecurityLevel},
};

/// Transactions known to be below max depth, valid for one latest solid milestone index.
///
/// Clones share the same memo. The memo is cleared whenever it is used with a different latest solid
/// milestone index, or when it reaches its capacity.
#[derive(Clone)]
pub(crate) struct BelowMaxDepthMemo {
    entries: Arc<Mutex<(MilestoneIndex, HashSet<CryptoHash>)>>,
    capacity: usize,
}

impl BelowMaxDepthMemo {
    pub(crate) fn new(capacity: usize) -> BelowMaxDepthMemo {
        BelowMaxDepthMemo {
            entries: Arc::new(Mutex::new((MilestoneIndex::default(), HashSet::new()))),
            capacity,
        }
    }

    fn lock(
        &self,
        latest_solid_index: MilestoneIndex,
    ) -> MutexGuard<'_, (MilestoneIndex, HashSet<CryptoHash>)> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.0 != latest_solid_index {
            entries.0 = latest_solid_index;
            entries.1.clear();
        }
        entries
    }

    fn contains(&self, latest_solid_index: MilestoneIndex, hash: &CryptoHash) -> bool {
        self.lock(latest_solid_index).1.contains(hash)
    }

    fn insert(&self, latest_solid_index: MilestoneIndex, hash: CryptoHash) {
        let mut entries = self.lock(latest_solid_index);
        if entries.1.len() >= self.capacity {
            entries.1.clear();
        }
        entries.1.insert(hash);
    }
}

/// The unconfirmed past cone accepted by a walk so far, the bundles counted in it, and its ledger
/// delta.
#[derive(Clone, Default)]
struct Accepted {
    transactions: HashSet<CryptoHash>,
    bundles: HashSet<CryptoHash>,
    delta: StateDelta,
}

/// Validates the transitions of one walk. Create one per walk.
pub(crate) struct WalkValidator<'a, K: KVStore> {
    tangle: &'a Tangle<K>,
    snapshot: &'a Snapshot,
    memo: &'a BelowMaxDepthMemo,
    security_level: SecurityLevel,
    analysis_limit: usize,
    milestone_start_index: MilestoneIndex,
    latest_solid_index: MilestoneIndex,
    oldest_referenceable_index: MilestoneIndex,
    accepted: Accepted,
}

impl<'a, K: KVStore> WalkValidator<'a, K> {
    pub(crate) fn new(
        tangle: &'a Tangle<K>,
        snapshot: &'a Snapshot,
        memo: &'a BelowMaxDepthMemo,
        security_level: SecurityLevel,
        max_depth: u64,
        analysis_limit: usize,
        milestone_start_index: MilestoneIndex,
    ) -> WalkValidator<'a, K> {
        let latest_solid_index = snapshot.milestone_index();
        WalkValidator {
            tangle,
            snapshot,
            memo,
            security_level,
            analysis_limit,
            milestone_start_index,
            latest_solid_index,
            oldest_referenceable_index: latest_solid_index.saturating_sub(max_depth),
            accepted: Accepted::default(),
        }
    }

    /// Check whether the walk may move onto `tail`. If it may, `tail`'s unconfirmed past cone becomes
    /// part of the walk's accepted cone.
    pub(crate) fn is_valid(&mut self, tail: &CryptoHash) -> Result<bool, ConsensusError> {
        match self.check(tail)? {
            Some(accepted) => {
                self.accepted = accepted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check `tail` on its own, ignoring what the walk has accepted so far.
    pub(crate) fn is_valid_in_isolation(&self, tail: &CryptoHash) -> Result<bool, ConsensusError> {
        let isolated = WalkValidator {
            tangle: self.tangle,
            snapshot: self.snapshot,
            memo: self.memo,
            security_level: self.security_level,
            analysis_limit: self.analysis_limit,
            milestone_start_index: self.milestone_start_index,
            latest_solid_index: self.latest_solid_index,
            oldest_referenceable_index: self.oldest_referenceable_index,
            accepted: Accepted::default(),
        };
        Ok(isolated.check(tail)?.is_some())
    }

    fn check(&self, hash: &CryptoHash) -> Result<Option<Accepted>, ConsensusError> {
        let transaction = match self.tangle.get_transaction(hash)? {
            Some(transaction) if transaction.is_tail() => transaction,
            _ => return Ok(None),
        };
        if !self.tangle.is_solid(hash) {
            log::debug!("walk rejected {}: not solid", hash);
            return Ok(None);
        }

        if let Some(index) = self
            .tangle
            .confirming_milestone(hash, self.milestone_start_index)?
        {
            if index < self.oldest_referenceable_index {
                log::debug!("walk rejected {}: confirmed by old milestone {}", hash, index);
                return Ok(None);
            }
            return Ok(Some(self.accepted.clone()));
        }

        if (transaction.last_index > 0 || transaction.value != 0)
            && !bundle_validator::validate_tail(self.tangle, hash, self.security_level)?.is_valid()
        {
            log::debug!("walk rejected {}: invalid bundle", hash);
            return Ok(None);
        }

        if self.is_below_max_depth(hash)? {
            log::debug!("walk rejected {}: below max depth", hash);
            return Ok(None);
        }

        let mut accepted = self.accepted.clone();
        let cone = unconfirmed_cone(
            self.tangle,
            &[*hash],
            &mut accepted.transactions,
            self.milestone_start_index,
        )?;
        match cone_delta(self.tangle, &cone, self.security_level, &accepted.bundles)? {
            ConeDelta::Valid { delta, bundles } => {
                accepted.delta.merge(&delta);
                accepted.bundles.extend(bundles);
            }
            ConeDelta::InvalidBundle(_) => return Ok(None),
        }
        if !self.snapshot.is_consistent(&accepted.delta) {
            log::debug!("walk rejected {}: inconsistent with the ledger", hash);
            return Ok(None);
        }

        Ok(Some(accepted))
    }

    fn is_below_max_depth(&self, hash: &CryptoHash) -> Result<bool, ConsensusError> {
        if self.memo.contains(self.latest_solid_index, hash) {
            return Ok(true);
        }

        let mut visited: HashSet<CryptoHash> = HashSet::new();
        let mut queue: VecDeque<CryptoHash> = VecDeque::from([*hash]);
        let mut below = false;
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > self.analysis_limit {
                below = true;
                break;
            }
            if let Some(index) = self
                .tangle
                .confirming_milestone(&current, self.milestone_start_index)?
            {
                if index < self.oldest_referenceable_index {
                    below = true;
                    break;
                }
                continue;
            }
            match self.tangle.get_transaction(&current)? {
                Some(transaction) => queue.extend(transaction.parents()),
                None => {
                    below = true;
                    break;
                }
            }
        }

        if below {
            self.memo.insert(self.latest_solid_index, *hash);
        }
        Ok(below)
    }
}
