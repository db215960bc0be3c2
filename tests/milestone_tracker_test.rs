//! Tests for milestone tracking: signature checks, ordering, and the out-of-order buffer.

use log::LevelFilter;

use tangle_consensus::{
    errors::ConsensusError,
    types::data_types::{CryptoHash, MilestoneIndex},
};

mod common;

use common::{
    fixtures::{keypair, test_configuration, Harness},
    logging::setup_logger,
};

#[test]
fn milestones_commit_in_index_order_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);

    let m1 = harness.milestone(1, CryptoHash::null(), CryptoHash::null());
    let m2 = harness.milestone(2, m1.hash, m1.hash);
    let m3 = harness.milestone(3, m2.hash, m2.hash);
    for milestone in [&m1, &m2, &m3] {
        harness.receive(milestone);
    }
    harness.drain_candidates();

    // 3 and 2 wait for 1; once 1 arrives all three are committed.
    let tracker = &mut harness.milestone_tracker;
    assert_eq!(tracker.track(&m3.hash).unwrap(), MilestoneIndex::new(0));
    assert_eq!(tracker.track(&m2.hash).unwrap(), MilestoneIndex::new(0));
    assert_eq!(tracker.buffered(), 2);
    assert_eq!(tracker.track(&m1.hash).unwrap(), MilestoneIndex::new(3));
    assert_eq!(tracker.buffered(), 0);

    // Seeing a committed milestone again is a no-op.
    assert_eq!(tracker.track(&m2.hash).unwrap(), MilestoneIndex::new(3));
    assert_eq!(harness.tangle.milestone_at(MilestoneIndex::new(2)).unwrap(), Some(m2.hash));
}

#[test]
fn forged_milestone_is_rejected_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let configuration = test_configuration(&coordinator);
    let mut harness = Harness::new(configuration, keypair());

    // The harness signs with a key the configuration does not trust.
    let forged = harness.milestone(1, CryptoHash::null(), CryptoHash::null());
    assert!(matches!(
        harness.receive_milestone(&forged),
        Err(ConsensusError::InvalidMilestoneSignature { milestone }) if milestone == forged.hash
    ));
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(0));
    assert_eq!(harness.tangle.milestone_at(MilestoneIndex::new(1)).unwrap(), None);
}

#[test]
fn non_milestone_is_ignored_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let data = harness.data(CryptoHash::null(), CryptoHash::null());
    let data = harness.receive_bundle(&data);

    assert_eq!(
        harness.milestone_tracker.track(&data).unwrap(),
        MilestoneIndex::new(0)
    );
    assert_eq!(harness.milestone_tracker.buffered(), 0);
}

#[test]
fn buffer_overflow_is_reported_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut configuration = test_configuration(&coordinator);
    configuration.milestone_buffer_capacity = 1;
    let mut harness = Harness::new(configuration, coordinator);

    let m1 = harness.milestone(1, CryptoHash::null(), CryptoHash::null());
    let m2 = harness.milestone(2, m1.hash, m1.hash);
    let m3 = harness.milestone(3, m2.hash, m2.hash);
    for milestone in [&m1, &m2, &m3] {
        harness.receive(milestone);
    }
    harness.drain_candidates();

    assert_eq!(
        harness.milestone_tracker.track(&m3.hash).unwrap(),
        MilestoneIndex::new(0)
    );
    assert!(matches!(
        harness.milestone_tracker.track(&m2.hash),
        Err(ConsensusError::MilestoneGapTooLarge { buffered: 1, .. })
    ));
    // A dropped milestone is not recorded, so nothing can start a walk from it.
    let index_2 = MilestoneIndex::new(2);
    assert_eq!(harness.tangle.milestone_at(index_2).unwrap(), None);
    assert_eq!(
        harness.tangle.milestone_at(MilestoneIndex::new(3)).unwrap(),
        Some(m3.hash)
    );

    // The successor of the latest solid milestone is always accepted. Milestone 2 was dropped, so
    // milestone 3 keeps waiting until 2 is seen again.
    let tracker = &mut harness.milestone_tracker;
    assert_eq!(tracker.track(&m1.hash).unwrap(), MilestoneIndex::new(1));
    assert_eq!(tracker.buffered(), 1);
    assert_eq!(tracker.track(&m2.hash).unwrap(), MilestoneIndex::new(3));
    assert_eq!(harness.tangle.milestone_at(index_2).unwrap(), Some(m2.hash));
}
