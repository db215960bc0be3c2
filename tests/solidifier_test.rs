//! Tests for solidification of transactions arriving out of order.

use log::LevelFilter;

use tangle_consensus::types::data_types::CryptoHash;

mod common;

use common::{
    fixtures::{address_of, keypair, test_configuration, Harness},
    logging::setup_logger,
};

#[test]
fn missing_parent_is_requested_once_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let parent = harness.data(CryptoHash::null(), CryptoHash::null());
    let parent_hash = parent.tail().unwrap().hash;
    let child = harness.data(parent_hash, CryptoHash::null());
    let child = child.tail().unwrap().clone();

    // 1. The child arrives first: its parent is requested, and it stays non-solid.
    assert!(!harness.receive(&child));
    assert_eq!(harness.requester.requested(), vec![parent_hash]);
    assert!(harness.transaction_requester.is_pending(&parent_hash));

    // 2. Solidifying the child again does not request the parent again.
    assert!(!harness.solidifier.solidify(&child.hash).unwrap());
    assert_eq!(harness.requester.requested(), vec![parent_hash]);

    // 3. Once the parent arrives, both become solid and the child is the only tip.
    assert!(harness.receive(parent.tail().unwrap()));
    assert!(harness.tangle.is_solid(&child.hash));
    assert!(!harness.transaction_requester.is_pending(&parent_hash));
    assert_eq!(harness.requester.requested().len(), 1);
    assert_eq!(harness.tips.tips(), vec![child.hash]);
}

#[test]
fn solidity_cascades_through_bundles_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let treasury = harness.treasury.clone();
    let root = harness.data(CryptoHash::null(), CryptoHash::null());
    let root_hash = root.tail().unwrap().hash;
    let transfer = harness.transfer(&treasury, address_of(&keypair()), 5, root_hash, root_hash);

    // Tail first: every transaction waits for the one it references as trunk.
    for transaction in transfer.iter() {
        assert!(!harness.receive(transaction));
    }
    assert!(harness.requester.requested().contains(&root_hash));

    assert!(harness.receive(root.tail().unwrap()));
    assert!(transfer
        .iter()
        .all(|transaction| harness.tangle.is_solid(&transaction.hash)));
    assert_eq!(harness.tips.tips(), vec![transfer.tail().unwrap().hash]);
}

#[test]
fn milestones_are_forwarded_not_tips_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let milestone = harness.milestone(1, CryptoHash::null(), CryptoHash::null());

    assert!(harness.receive(&milestone));
    assert_eq!(harness.drain_candidates(), vec![milestone.hash]);
    assert!(harness.tips.is_empty());
}
