//! Tests for milestone validation, commitment, and reversion.

use log::LevelFilter;

use tangle_consensus::{
    errors::ConsensusError,
    ledger_validator::MilestoneStatus,
    types::{
        data_types::{CryptoHash, MilestoneIndex},
        milestone::Milestone,
    },
};

mod common;

use common::{
    fixtures::{address_of, keypair, reattach, test_configuration, Harness, TOTAL_SUPPLY},
    logging::{log_with_context, setup_logger},
};

#[test]
fn commit_and_revert_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Start from a snapshot at milestone 3.
    let coordinator = keypair();
    let mut configuration = test_configuration(&coordinator);
    configuration.milestone_start_index = MilestoneIndex::new(3);
    let mut harness = Harness::new(configuration, coordinator);
    let treasury = harness.treasury.clone();
    let alice = address_of(&keypair());
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(3));

    // 2. Commit milestone 4, then a transfer confirmed by milestone 5.
    log_with_context(Some("commit_and_revert_test"), "Committing milestones 4 and 5.");
    let m4 = harness.commit_milestone(4, CryptoHash::null(), CryptoHash::null());
    let transfer = harness.transfer(&treasury, alice, 100, m4, m4);
    let bundle = transfer.hash().unwrap();
    let transfer = harness.receive_bundle(&transfer);
    assert!(!harness.ledger_validator.is_transaction_confirmed(&transfer).unwrap());
    let m5 = harness.commit_milestone(5, transfer, m4);

    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(5));
    assert_eq!(
        harness.tangle.solid_milestone_index().unwrap(),
        Some(MilestoneIndex::new(5))
    );
    assert_eq!(
        harness.tangle.bundle_confirmation(&bundle).unwrap(),
        Some(MilestoneIndex::new(5))
    );
    assert!(harness.ledger_validator.is_transaction_confirmed(&transfer).unwrap());
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 100);
    assert_eq!(
        harness
            .ledger_validator
            .get_balance(&address_of(&treasury), None)
            .unwrap(),
        TOTAL_SUPPLY - 100
    );
    assert_eq!(
        harness
            .ledger_validator
            .get_balance(&alice, Some(MilestoneIndex::new(4)))
            .unwrap(),
        0
    );

    // 3. Validating a committed milestone again changes nothing.
    let milestone_5 = Milestone::new(MilestoneIndex::new(5), m5);
    assert_eq!(
        harness.ledger_validator.milestone_status(&milestone_5).unwrap(),
        MilestoneStatus::Committed
    );
    assert_eq!(
        harness.ledger_validator.validate_milestone(&milestone_5).unwrap(),
        MilestoneStatus::Committed
    );
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 100);

    // 4. Only the latest milestone can be reverted.
    log_with_context(Some("commit_and_revert_test"), "Reverting milestone 5.");
    assert!(matches!(
        harness.ledger_validator.revert_milestone(MilestoneIndex::new(4)),
        Err(ConsensusError::UnexpectedMilestoneIndex { .. })
    ));
    harness
        .ledger_validator
        .revert_milestone(MilestoneIndex::new(5))
        .unwrap();
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(4));
    assert_eq!(
        harness.tangle.solid_milestone_index().unwrap(),
        Some(MilestoneIndex::new(4))
    );
    assert_eq!(harness.tangle.bundle_confirmation(&bundle).unwrap(), None);
    assert_eq!(harness.tangle.milestone_delta(MilestoneIndex::new(5)).unwrap(), None);
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 0);
    assert!(!harness.ledger_validator.is_transaction_confirmed(&transfer).unwrap());
    assert_eq!(
        harness.ledger_validator.milestone_status(&milestone_5).unwrap(),
        MilestoneStatus::Unvalidated
    );

    // 5. The reverted milestone can be committed again.
    assert_eq!(
        harness.ledger_validator.validate_milestone(&milestone_5).unwrap(),
        MilestoneStatus::Committed
    );
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 100);

    // 6. The snapshot's own milestone cannot be reverted.
    harness
        .ledger_validator
        .revert_milestone(MilestoneIndex::new(5))
        .unwrap();
    harness
        .ledger_validator
        .revert_milestone(MilestoneIndex::new(4))
        .unwrap();
    assert!(matches!(
        harness.ledger_validator.revert_milestone(MilestoneIndex::new(3)),
        Err(ConsensusError::UnexpectedMilestoneIndex { .. })
    ));
    assert_eq!(
        harness.tangle.solid_milestone_index().unwrap(),
        Some(MilestoneIndex::new(3))
    );
}

#[test]
fn reattached_bundle_in_one_cone_is_applied_once_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let treasury = harness.treasury.clone();
    let alice = address_of(&keypair());
    let m1 = harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());

    // The treasury's whole balance, attached twice. Counting it twice would overdraw the treasury.
    let transfer = harness.transfer(&treasury, alice, TOTAL_SUPPLY as i64, m1, m1);
    let copy = reattach(&transfer, CryptoHash::null(), m1);
    let original = harness.receive_bundle(&transfer);
    let copy = harness.receive_bundle(&copy);
    assert_ne!(original, copy);
    assert!(harness
        .ledger_validator
        .tips_consistent(&[original, copy])
        .unwrap());

    harness.commit_milestone(2, original, copy);
    assert_eq!(
        harness.ledger_validator.get_balance(&alice, None).unwrap(),
        TOTAL_SUPPLY
    );
    assert_eq!(
        harness
            .ledger_validator
            .get_balance(&address_of(&treasury), None)
            .unwrap(),
        0
    );
    assert!(harness.ledger_validator.is_transaction_confirmed(&original).unwrap());
    assert!(harness.ledger_validator.is_transaction_confirmed(&copy).unwrap());
    assert_eq!(
        harness
            .tangle
            .bundle_confirmation(&transfer.hash().unwrap())
            .unwrap(),
        Some(MilestoneIndex::new(2))
    );
}

#[test]
fn reattachment_of_confirmed_bundle_is_not_applied_again_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let treasury = harness.treasury.clone();
    let alice = address_of(&keypair());
    let m1 = harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());

    // 1. Milestone 2 confirms the transfer.
    let transfer = harness.transfer(&treasury, alice, 100, m1, m1);
    let bundle = transfer.hash().unwrap();
    let original = harness.receive_bundle(&transfer);
    let m2 = harness.commit_milestone(2, original, m1);

    // 2. Milestone 3 confirms a reattachment of it, which moves nothing.
    log_with_context(
        Some("reattachment_of_confirmed_bundle_is_not_applied_again_test"),
        "Confirming a reattachment with milestone 3.",
    );
    let copy = reattach(&transfer, m2, m2);
    let copy = harness.receive_bundle(&copy);
    assert!(harness.ledger_validator.tips_consistent(&[copy]).unwrap());
    harness.commit_milestone(3, copy, m2);
    assert!(harness.ledger_validator.is_transaction_confirmed(&copy).unwrap());
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 100);
    assert_eq!(
        harness.tangle.bundle_confirmation(&bundle).unwrap(),
        Some(MilestoneIndex::new(2))
    );

    // 3. Reverting milestone 3 keeps the confirmation by milestone 2; reverting 2 clears it.
    harness
        .ledger_validator
        .revert_milestone(MilestoneIndex::new(3))
        .unwrap();
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 100);
    assert_eq!(
        harness.tangle.bundle_confirmation(&bundle).unwrap(),
        Some(MilestoneIndex::new(2))
    );
    harness
        .ledger_validator
        .revert_milestone(MilestoneIndex::new(2))
        .unwrap();
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 0);
    assert_eq!(harness.tangle.bundle_confirmation(&bundle).unwrap(), None);
}

#[test]
fn out_of_order_validation_is_refused_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let m1 = harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());

    let m3 = harness.milestone(3, m1, m1);
    harness.receive(&m3);
    assert!(matches!(
        harness
            .ledger_validator
            .validate_milestone(&Milestone::new(MilestoneIndex::new(3), m3.hash)),
        Err(ConsensusError::UnexpectedMilestoneIndex { expected, actual })
            if expected == MilestoneIndex::new(2) && actual == MilestoneIndex::new(3)
    ));
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(1));
}

#[test]
fn overspending_milestone_is_rejected_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let treasury = harness.treasury.clone();
    let alice = address_of(&keypair());
    let m1 = harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());

    // The bundle is well formed, but spends more than the treasury holds.
    let overspend = harness.transfer(&treasury, alice, TOTAL_SUPPLY as i64 * 2, m1, m1);
    let overspend = harness.receive_bundle(&overspend);
    let m2 = harness.milestone(2, overspend, m1);

    assert!(matches!(
        harness.receive_milestone(&m2),
        Err(ConsensusError::InconsistentDelta { index }) if index == MilestoneIndex::new(2)
    ));
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(1));
    assert_eq!(harness.ledger_validator.get_balance(&alice, None).unwrap(), 0);
    assert!(!harness.ledger_validator.is_transaction_confirmed(&overspend).unwrap());
}

#[test]
fn milestone_must_approve_predecessor_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());

    let unrelated = harness.data(CryptoHash::null(), CryptoHash::null());
    let unrelated = harness.receive_bundle(&unrelated);
    let m2 = harness.milestone(2, unrelated, unrelated);

    assert!(matches!(
        harness.receive_milestone(&m2),
        Err(ConsensusError::MilestoneDoesNotApprovePredecessor { index })
            if index == MilestoneIndex::new(2)
    ));
    assert_eq!(harness.latest_solid_milestone_index(), MilestoneIndex::new(1));
}

#[test]
fn historical_balances_are_bounded_by_snapshot_depth_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut configuration = test_configuration(&coordinator);
    configuration.snapshot_depth = 2;
    let mut harness = Harness::new(configuration, coordinator);
    let treasury = harness.treasury.clone();
    let alice = address_of(&keypair());

    // Milestone i moves 10 to alice.
    let mut previous = harness.commit_milestone(1, CryptoHash::null(), CryptoHash::null());
    for index in 2..=4 {
        let transfer = harness.transfer(&treasury, alice, 10, previous, previous);
        let transfer = harness.receive_bundle(&transfer);
        previous = harness.commit_milestone(index, transfer, previous);
    }

    let balance_at = |index: u64| {
        harness
            .ledger_validator
            .get_balance(&alice, Some(MilestoneIndex::new(index)))
    };
    assert_eq!(balance_at(4).unwrap(), 30);
    assert_eq!(balance_at(3).unwrap(), 20);
    assert_eq!(balance_at(2).unwrap(), 10);
    assert!(matches!(
        balance_at(1),
        Err(ConsensusError::SnapshotBalanceNotFound { .. })
    ));
    assert!(matches!(
        balance_at(5),
        Err(ConsensusError::SnapshotBalanceNotFound { .. })
    ));
}
