//! Tests for error classification and return codes.

use tangle_consensus::{
    errors::{ConsensusError, Module, Severity},
    lifecycle::LifecycleState,
    transaction_validator::InvalidTransactionReason,
    types::data_types::{CryptoHash, MilestoneIndex},
};

#[test]
fn retcode_packing_test() {
    let tips_inconsistent = ConsensusError::TipsInconsistent;
    assert_eq!(tips_inconsistent.module(), Module::TipSelector);
    assert_eq!(tips_inconsistent.severity(), Severity::Moderate);
    assert_eq!(tips_inconsistent.retcode(), 0x0F41);
    assert!(tips_inconsistent
        .to_string()
        .ends_with("(M=0x0F, E=0x01, S=0x1 (0x0F41))"));

    let inconsistent_delta = ConsensusError::InconsistentDelta {
        index: MilestoneIndex::new(9),
    };
    assert_eq!(inconsistent_delta.retcode(), 0x0EC5);
    assert!(inconsistent_delta.is_fatal());

    let invalid_tip_count = ConsensusError::InvalidTipCount { count: 3 };
    assert_eq!(invalid_tip_count.retcode(), 0x0F04);
    assert!(!invalid_tip_count.is_fatal());

    // The module of a general error is the one that raised it.
    let still_running = ConsensusError::StillRunning {
        module: Module::Solidifier,
    };
    assert_eq!(still_running.module(), Module::Solidifier);
    assert_eq!(still_running.retcode() >> 8, 0x10);
}

#[test]
fn lifecycle_transitions_test() {
    use LifecycleState::*;

    assert_eq!(Created.transition(Initialized, "test").unwrap(), Initialized);
    assert_eq!(Initialized.transition(Running, "test").unwrap(), Running);
    assert_eq!(Running.transition(Stopped, "test").unwrap(), Stopped);
    assert_eq!(Stopped.transition(Running, "test").unwrap(), Running);
    assert_eq!(Stopped.transition(Destroyed, "test").unwrap(), Destroyed);

    for (from, to) in [
        (Initialized, Stopped),
        (Running, Running),
        (Running, Destroyed),
        (Destroyed, Running),
        (Created, Running),
    ] {
        assert!(matches!(
            from.transition(to, "test"),
            Err(ConsensusError::InvalidLifecycleTransition { component: "test", .. })
        ));
    }
}

#[test]
fn rejected_transaction_retcode_test() {
    let rejected = ConsensusError::TransactionRejected {
        transaction: CryptoHash::null(),
        reason: InvalidTransactionReason::TimestampInFuture,
    };
    assert_eq!(rejected.module(), Module::TransactionValidator);
    assert_eq!(rejected.severity(), Severity::Moderate);
    assert_eq!(rejected.retcode(), 0x1141);
    assert!(rejected.to_string().contains("timestamp is in the future"));
    assert!(rejected.to_string().ends_with("(M=0x11, E=0x01, S=0x1 (0x1141))"));
}
