//! Tests for bundle validation.

use log::LevelFilter;

use tangle_consensus::{
    bundle_validator::{self, BundleStatus, InvalidBundleReason},
    types::{
        bundle::{signature_fragment, Bundle, BundleBuilder},
        data_types::{CryptoHash, SecurityLevel},
    },
};

mod common;

use common::{
    fixtures::{address_of, keypair, test_configuration, Harness},
    logging::setup_logger,
};

#[test]
fn transfer_is_valid_test() {
    setup_logger(LevelFilter::Debug);
    let sender = keypair();
    let receiver = keypair();

    for level in 1..=3 {
        let security_level = SecurityLevel::new(level).unwrap();
        let bundle = BundleBuilder::new(security_level)
            .input(&sender, 250)
            .output(address_of(&receiver), 200)
            .output(address_of(&keypair()), 50)
            .build(CryptoHash::null(), CryptoHash::null());

        assert_eq!(bundle.len(), level as usize + 2);
        assert!(bundle.iter().all(|transaction| transaction.is_correct()));
        assert_eq!(
            bundle_validator::validate(&bundle, security_level),
            BundleStatus::Valid
        );
    }
}

#[test]
fn nonzero_sum_is_rejected_test() {
    setup_logger(LevelFilter::Debug);
    let sender = keypair();
    let bundle = BundleBuilder::new(SecurityLevel::default())
        .input(&sender, 100)
        .output(address_of(&keypair()), 50)
        .build(CryptoHash::null(), CryptoHash::null());

    assert_eq!(
        bundle_validator::validate(&bundle, SecurityLevel::default()),
        BundleStatus::Invalid(InvalidBundleReason::NonZeroValue)
    );
}

#[test]
fn foreign_signature_is_rejected_test() {
    setup_logger(LevelFilter::Debug);
    let sender = keypair();
    let thief = keypair();
    let bundle = BundleBuilder::new(SecurityLevel::default())
        .input(&sender, 100)
        .output(address_of(&thief), 100)
        .build(CryptoHash::null(), CryptoHash::null());

    // Re-sign the input with a key that does not control the address. Nothing references the tail
    // within the bundle, so only its own hash changes.
    let mut transactions = bundle.into_transactions();
    let bundle_hash = transactions[0].bundle;
    transactions[0].signature_fragment = signature_fragment(&thief, &bundle_hash);
    let forged = Bundle::new(transactions);

    assert_eq!(
        bundle_validator::validate(&forged, SecurityLevel::default()),
        BundleStatus::Invalid(InvalidBundleReason::InvalidSignature)
    );
}

#[test]
fn missing_transaction_is_incomplete_test() {
    setup_logger(LevelFilter::Debug);
    let sender = keypair();
    let bundle = BundleBuilder::new(SecurityLevel::default())
        .input(&sender, 100)
        .output(address_of(&keypair()), 100)
        .build(CryptoHash::null(), CryptoHash::null());

    let truncated = Bundle::new(bundle.transactions()[..2].to_vec());
    assert_eq!(
        bundle_validator::validate(&truncated, SecurityLevel::default()),
        BundleStatus::Invalid(InvalidBundleReason::Incomplete)
    );

    let mut reordered = bundle.into_transactions();
    reordered.swap(1, 2);
    assert_eq!(
        bundle_validator::validate(&Bundle::new(reordered), SecurityLevel::default()),
        BundleStatus::Invalid(InvalidBundleReason::InvalidIndex)
    );
}

#[test]
fn bundle_is_loaded_from_storage_test() {
    setup_logger(LevelFilter::Debug);
    let coordinator = keypair();
    let mut harness = Harness::new(test_configuration(&coordinator), coordinator);
    let treasury = harness.treasury.clone();
    let bundle = harness.transfer(
        &treasury,
        address_of(&keypair()),
        10,
        CryptoHash::null(),
        CryptoHash::null(),
    );
    let tail = bundle.tail().unwrap().hash;

    // Only the tail has arrived.
    harness.tangle.put_transaction(&bundle.transactions()[0]).unwrap();
    assert_eq!(
        bundle_validator::validate_tail(&harness.tangle, &tail, SecurityLevel::default()).unwrap(),
        BundleStatus::Invalid(InvalidBundleReason::Incomplete)
    );

    harness.receive_bundle(&bundle);
    assert_eq!(
        bundle_validator::load_bundle(&harness.tangle, &tail).unwrap(),
        Some(bundle)
    );
    assert_eq!(
        bundle_validator::validate_tail(&harness.tangle, &tail, SecurityLevel::default()).unwrap(),
        BundleStatus::Valid
    );
}
