//! Tests for snapshots: delta application, supply invariants, and the snapshot file.

use std::{collections::BTreeMap, env, fs, path::PathBuf, process};

use log::LevelFilter;

use tangle_consensus::{
    errors::ConsensusError,
    snapshot::{Snapshot, StateDelta},
    types::data_types::{Address, MilestoneIndex},
};

mod common;

use common::logging::setup_logger;

fn address(byte: u8) -> Address {
    Address::new([byte; 32])
}

fn sample_snapshot() -> Snapshot {
    let balances = BTreeMap::from([(address(1), 600), (address(2), 400)]);
    Snapshot::new(MilestoneIndex::new(7), balances, 1_000).unwrap()
}

/// A path in the temporary directory that no other test uses.
fn temp_path(name: &str) -> PathBuf {
    env::temp_dir().join(format!("tangle_consensus_{}_{}.snapshot", process::id(), name))
}

#[test]
fn supply_must_match_test() {
    setup_logger(LevelFilter::Debug);
    let balances = BTreeMap::from([(address(1), 600), (address(2), 300)]);
    assert!(matches!(
        Snapshot::new(MilestoneIndex::new(0), balances, 1_000),
        Err(ConsensusError::SnapshotInvalidSupply {
            expected: 1_000,
            actual: 900
        })
    ));
}

#[test]
fn apply_and_revert_delta_test() {
    setup_logger(LevelFilter::Debug);
    let original = sample_snapshot();
    let mut snapshot = original.clone();

    let mut delta = StateDelta::new();
    delta.add(address(1), -600);
    delta.add(address(3), 600);
    assert_eq!(delta.sum(), 0);

    snapshot.apply_delta(&delta, MilestoneIndex::new(8)).unwrap();
    assert_eq!(snapshot.milestone_index(), MilestoneIndex::new(8));
    assert_eq!(snapshot.balance(&address(1)), 0);
    assert_eq!(snapshot.balance(&address(3)), 600);
    assert!(!snapshot.balances().contains_key(&address(1)));

    snapshot.revert_delta(&delta, MilestoneIndex::new(8)).unwrap();
    assert_eq!(snapshot, original);
}

#[test]
fn inconsistent_delta_changes_nothing_test() {
    setup_logger(LevelFilter::Debug);
    let original = sample_snapshot();
    let mut snapshot = original.clone();

    // Overdraws address 2.
    let mut overdraw = StateDelta::new();
    overdraw.add(address(2), -401);
    overdraw.add(address(1), 401);
    assert!(!snapshot.is_consistent(&overdraw));
    assert!(matches!(
        snapshot.apply_delta(&overdraw, MilestoneIndex::new(8)),
        Err(ConsensusError::InconsistentDelta { .. })
    ));
    assert_eq!(snapshot, original);

    // Mints.
    let mut mint = StateDelta::new();
    mint.add(address(1), 1);
    assert!(!snapshot.is_consistent(&mint));
    assert!(snapshot.apply_delta(&mint, MilestoneIndex::new(8)).is_err());
    assert_eq!(snapshot, original);
}

#[test]
fn snapshot_file_test() {
    setup_logger(LevelFilter::Debug);
    let path = temp_path("round_trip");
    let snapshot = sample_snapshot();

    snapshot.save(&path).unwrap();
    assert_eq!(Snapshot::load(&path, 1_000).unwrap(), snapshot);

    // The file records balances, not the expected supply.
    assert!(matches!(
        Snapshot::load(&path, 2_000),
        Err(ConsensusError::SnapshotInvalidSupply { .. })
    ));

    // Flip a byte of the body.
    let mut bytes = fs::read(&path).unwrap();
    bytes[8] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        Snapshot::load(&path, 1_000),
        Err(ConsensusError::SnapshotInvalidFile { .. })
    ));

    fs::remove_file(&path).unwrap();
    let err = Snapshot::load(&path, 1_000).unwrap_err();
    assert!(matches!(err, ConsensusError::SnapshotFileNotFound { .. }));
    assert!(err.is_fatal());
}
