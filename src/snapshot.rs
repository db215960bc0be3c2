/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The materialized balance state of the ledger as of a milestone index.
//!
//! A [`Snapshot`] is mutated only through [`apply_delta`](Snapshot::apply_delta) and
//! [`revert_delta`](Snapshot::revert_delta), both of which are all-or-nothing: either every balance
//! the delta touches is updated and the milestone index moves, or nothing changes. Balances always add
//! up to the snapshot's total supply.
//!
//! ## File format
//!
//! ```text
//! *------*---------*---------------------*--------------------*
//! | TSNP | version | Borsh(SnapshotFile) | SHA-256 of the body |
//! *------*---------*---------------------*--------------------*
//!   4 B     1 B          variable                 32 B
//! ```

use std::{
    collections::BTreeMap,
    fs, io,
    path::Path,
    sync::{Arc, RwLock},
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    errors::ConsensusError,
    types::{
        crypto_primitives::sha256,
        data_types::{Address, CryptoHash, MilestoneIndex},
    },
};

/// The snapshot shared between the ledger validator (the only writer) and its readers.
pub type SnapshotHandle = Arc<RwLock<Snapshot>>;

const MAGIC: &[u8; 4] = b"TSNP";
const FORMAT_VERSION: u8 = 1;
const DIGEST_LEN: usize = 32;

/// Signed balance changes per address.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StateDelta(BTreeMap<Address, i64>);

impl StateDelta {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add `value` to the change of `address`. Saturates; a saturated change is never consistent
    /// with any snapshot.
    pub fn add(&mut self, address: Address, value: i64) {
        if value == 0 {
            return;
        }
        let change = self.0.entry(address).or_insert(0);
        *change = change.saturating_add(value);
        if *change == 0 {
            self.0.remove(&address);
        }
    }

    pub fn merge(&mut self, other: &StateDelta) {
        for (address, value) in other.iter() {
            self.add(*address, *value)
        }
    }

    pub fn get(&self, address: &Address) -> i64 {
        self.0.get(address).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &i64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Net change in supply. Zero for every delta produced by valid bundles.
    pub fn sum(&self) -> i128 {
        self.0.values().map(|value| *value as i128).sum()
    }
}

/// What the ledger validator persists for every committed milestone so that it can be reverted.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MilestoneDelta {
    pub delta: StateDelta,
    /// The transactions the milestone confirmed.
    pub confirmed: Vec<CryptoHash>,
    /// The bundles whose value the milestone applied.
    pub bundles: Vec<CryptoHash>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SnapshotFile {
    milestone_index: MilestoneIndex,
    balances: BTreeMap<Address, u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    milestone_index: MilestoneIndex,
    balances: BTreeMap<Address, u64>,
    total_supply: u64,
}

impl Snapshot {
    /// Create a snapshot, checking that `balances` add up to `total_supply`.
    pub fn new(
        milestone_index: MilestoneIndex,
        balances: BTreeMap<Address, u64>,
        total_supply: u64,
    ) -> Result<Snapshot, ConsensusError> {
        let actual: u128 = balances.values().map(|balance| *balance as u128).sum();
        if actual != total_supply as u128 {
            return Err(ConsensusError::SnapshotInvalidSupply {
                expected: total_supply,
                actual,
            });
        }
        let balances = balances
            .into_iter()
            .filter(|(_, balance)| *balance != 0)
            .collect();

        Ok(Snapshot {
            milestone_index,
            balances,
            total_supply,
        })
    }

    /// A snapshot where `treasury` holds the whole supply.
    pub fn genesis(treasury: Address, total_supply: u64, milestone_index: MilestoneIndex) -> Snapshot {
        let mut balances = BTreeMap::new();
        if total_supply > 0 {
            balances.insert(treasury, total_supply);
        }
        Snapshot {
            milestone_index,
            balances,
            total_supply,
        }
    }

    pub fn into_handle(self) -> SnapshotHandle {
        Arc::new(RwLock::new(self))
    }

    /// The index of the latest milestone whose delta is reflected in this snapshot.
    pub fn milestone_index(&self) -> MilestoneIndex {
        self.milestone_index
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<Address, u64> {
        &self.balances
    }

    /// Whether applying `delta` keeps every balance non-negative and the supply constant.
    pub fn is_consistent(&self, delta: &StateDelta) -> bool {
        self.updated_balances(delta).is_some()
    }

    /// Apply the delta committed by milestone `index` and move the snapshot to `index`.
    pub fn apply_delta(
        &mut self,
        delta: &StateDelta,
        index: MilestoneIndex,
    ) -> Result<(), ConsensusError> {
        let updates = self
            .updated_balances(delta)
            .ok_or(ConsensusError::InconsistentDelta { index })?;
        self.write_balances(updates);
        self.milestone_index = index;
        Ok(())
    }

    /// Undo the delta committed by milestone `index` and move the snapshot back to the index before it.
    pub fn revert_delta(
        &mut self,
        delta: &StateDelta,
        index: MilestoneIndex,
    ) -> Result<(), ConsensusError> {
        let mut inverse = StateDelta::new();
        for (address, value) in delta.iter() {
            inverse.add(*address, value.checked_neg().unwrap_or(i64::MAX));
        }
        let updates = self
            .updated_balances(&inverse)
            .ok_or(ConsensusError::InconsistentDelta { index })?;
        self.write_balances(updates);
        self.milestone_index = index.saturating_sub(1);
        Ok(())
    }

    fn updated_balances(&self, delta: &StateDelta) -> Option<Vec<(Address, u64)>> {
        if delta.sum() != 0 {
            return None;
        }
        delta
            .iter()
            .map(|(address, change)| {
                let balance = self.balance(address) as i128 + *change as i128;
                u64::try_from(balance).ok().map(|balance| (*address, balance))
            })
            .collect()
    }

    fn write_balances(&mut self, updates: Vec<(Address, u64)>) {
        for (address, balance) in updates {
            if balance == 0 {
                self.balances.remove(&address);
            } else {
                self.balances.insert(address, balance);
            }
        }
    }

    /* ↓↓↓ Persistence ↓↓↓ */

    /// Read a snapshot file written by [`save`](Self::save), checking that its balances add up to
    /// `total_supply`.
    pub fn load(path: impl AsRef<Path>, total_supply: u64) -> Result<Snapshot, ConsensusError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ConsensusError::SnapshotFileNotFound {
                path: path.to_path_buf(),
            },
            _ => ConsensusError::SnapshotIoError {
                path: path.to_path_buf(),
                source: err,
            },
        })?;
        let invalid = |reason: String| ConsensusError::SnapshotInvalidFile {
            path: path.to_path_buf(),
            reason,
        };

        if bytes.len() < MAGIC.len() + 1 + DIGEST_LEN {
            return Err(invalid(format!("file is only {} bytes long", bytes.len())));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(invalid("not a snapshot file".to_string()));
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(invalid(format!("unsupported format version {}", version)));
        }
        let (body, digest) =
            bytes[MAGIC.len() + 1..].split_at(bytes.len() - MAGIC.len() - 1 - DIGEST_LEN);
        if &sha256(body).bytes()[..] != digest {
            return Err(invalid("digest mismatch".to_string()));
        }
        let file = SnapshotFile::try_from_slice(body)
            .map_err(|err| invalid(format!("cannot decode body: {}", err)))?;

        let snapshot = Snapshot::new(file.milestone_index, file.balances, total_supply)?;
        log::info!(
            "loaded snapshot at milestone {} with {} addresses from {}",
            snapshot.milestone_index,
            snapshot.balances.len(),
            path.display()
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConsensusError> {
        let path = path.as_ref();
        let io_error = |err: io::Error| ConsensusError::SnapshotIoError {
            path: path.to_path_buf(),
            source: err,
        };
        let body = SnapshotFile {
            milestone_index: self.milestone_index,
            balances: self.balances.clone(),
        }
        .try_to_vec()
        .map_err(io_error)?;

        let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + body.len() + DIGEST_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.extend_from_slice(&body);
        bytes.extend_from_slice(&sha256(&body).bytes());

        fs::write(path, bytes).map_err(io_error)
    }
}
