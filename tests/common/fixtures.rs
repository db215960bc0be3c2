//! A single node's worth of consensus components wired together over a [`MemDB`] (or any other
//! [`KVStore`]), driven synchronously by the test instead of by worker threads.

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use rand_core::OsRng;

use tangle_consensus::{
    config::Configuration,
    errors::ConsensusError,
    ledger_validator::LedgerValidator,
    milestone_tracker::MilestoneTracker,
    requester::TransactionRequester,
    snapshot::{Snapshot, SnapshotHandle},
    solidifier::Solidifier,
    tangle::{pluggables::KVStore, Tangle},
    tip_selection::TipSelector,
    tips_cache::TipsCache,
    types::{
        bundle::{address_from_public_key, Bundle, BundleBuilder},
        crypto_primitives::SigningKey,
        data_types::{Address, CryptoHash, MilestoneIndex, SecurityLevel},
        milestone::milestone_transaction,
        transaction::{Transaction, TransactionSpec},
    },
};

use super::{mem_db::MemDB, requester::RecordingRequester};

pub(crate) const TOTAL_SUPPLY: u64 = 1_000;

pub(crate) fn keypair() -> SigningKey {
    let mut csprg = OsRng {};
    SigningKey::generate(&mut csprg)
}

/// The address `signing_key` spends from at the default security level.
pub(crate) fn address_of(signing_key: &SigningKey) -> Address {
    address_from_public_key(&signing_key.verifying_key(), SecurityLevel::default())
}

pub(crate) fn coordinator_address() -> Address {
    Address::new([0xC0; 32])
}

pub(crate) fn test_configuration(coordinator: &SigningKey) -> Configuration {
    Configuration::builder()
        .coordinator_address(coordinator_address())
        .coordinator_public_keys(vec![coordinator.verifying_key()])
        .total_supply(TOTAL_SUPPLY)
        .worker_poll_interval(Duration::from_millis(5))
        .build()
}

/// The same bundle attached elsewhere: every transaction is rebuilt with the same essence and
/// signature, the last one referencing `trunk` and `branch`.
pub(crate) fn reattach(bundle: &Bundle, trunk: CryptoHash, branch: CryptoHash) -> Bundle {
    let mut transactions: Vec<Transaction> = Vec::with_capacity(bundle.len());
    let mut next: Option<CryptoHash> = None;
    for original in bundle.transactions().iter().rev() {
        let (tx_trunk, tx_branch) = match next {
            None => (trunk, branch),
            Some(next_hash) => (next_hash, trunk),
        };
        let transaction = TransactionSpec::builder()
            .address(original.address)
            .value(original.value)
            .tag(original.tag)
            .timestamp(original.timestamp)
            .current_index(original.current_index)
            .last_index(original.last_index)
            .bundle(original.bundle)
            .trunk(tx_trunk)
            .branch(tx_branch)
            .signature_fragment(original.signature_fragment.clone())
            .build()
            .into_transaction();
        next = Some(transaction.hash);
        transactions.push(transaction);
    }
    transactions.reverse();
    Bundle::new(transactions)
}

pub(crate) struct Harness<K: KVStore = MemDB> {
    pub(crate) coordinator: SigningKey,
    pub(crate) treasury: SigningKey,
    pub(crate) configuration: Configuration,
    pub(crate) tangle: Tangle<K>,
    pub(crate) snapshot: SnapshotHandle,
    pub(crate) ledger_validator: LedgerValidator<K>,
    pub(crate) tips: TipsCache,
    pub(crate) requester: RecordingRequester,
    pub(crate) transaction_requester: TransactionRequester<RecordingRequester>,
    pub(crate) solidifier: Solidifier<K, RecordingRequester>,
    pub(crate) milestone_tracker: MilestoneTracker<K>,
    pub(crate) tip_selector: TipSelector<K>,
    // Kept so that the solidifier's arrival channel stays connected.
    _arrivals: Sender<CryptoHash>,
    milestone_candidates: Receiver<CryptoHash>,
    nonce: u64,
}

impl Harness<MemDB> {
    /// A harness whose treasury holds the whole supply at the configured start index.
    pub(crate) fn new(configuration: Configuration, coordinator: SigningKey) -> Harness {
        let treasury = keypair();
        let snapshot = Snapshot::genesis(
            address_of(&treasury),
            configuration.total_supply,
            configuration.milestone_start_index,
        );
        Harness::with_snapshot(configuration, coordinator, treasury, snapshot)
    }

    pub(crate) fn with_snapshot(
        configuration: Configuration,
        coordinator: SigningKey,
        treasury: SigningKey,
        snapshot: Snapshot,
    ) -> Harness {
        Harness::with_store(configuration, coordinator, treasury, snapshot, MemDB::new())
    }
}

impl<K: KVStore> Harness<K> {
    /// A harness over `store`, which may already hold the tangle of an earlier run.
    pub(crate) fn with_store(
        configuration: Configuration,
        coordinator: SigningKey,
        treasury: SigningKey,
        snapshot: Snapshot,
        store: K,
    ) -> Harness<K> {
        let tangle = Tangle::new(store);
        let snapshot = snapshot.into_handle();
        let ledger_validator = LedgerValidator::new(
            tangle.clone(),
            snapshot.clone(),
            configuration.security_level,
            configuration.snapshot_depth,
            configuration.milestone_start_index,
            None,
        );
        let tips = TipsCache::new(configuration.tips_cache_capacity);
        let requester = RecordingRequester::new();
        let transaction_requester = TransactionRequester::new(
            requester.clone(),
            configuration.request_retry_interval,
            None,
        );

        let (arrivals, arrivals_receiver) = mpsc::channel();
        // The solidifier forwards candidates to the harness, which hands them to the tracker itself.
        let (candidates_sender, candidates_receiver) = mpsc::channel();
        let (_, tracker_receiver) = mpsc::channel::<CryptoHash>();

        let solidifier = Solidifier::new(
            tangle.clone(),
            transaction_requester.clone(),
            tips.clone(),
            &configuration,
            arrivals_receiver,
            candidates_sender,
            None,
        );
        let milestone_tracker = MilestoneTracker::new(
            tangle.clone(),
            ledger_validator.clone(),
            &configuration,
            tracker_receiver,
            None,
        );
        let tip_selector =
            TipSelector::new(tangle.clone(), snapshot.clone(), configuration.clone(), None);

        Harness {
            coordinator,
            treasury,
            configuration,
            tangle,
            snapshot,
            ledger_validator,
            tips,
            requester,
            transaction_requester,
            solidifier,
            milestone_tracker,
            tip_selector,
            _arrivals: arrivals,
            milestone_candidates: candidates_receiver,
            nonce: 0,
        }
    }

    fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }

    pub(crate) fn latest_solid_milestone_index(&self) -> MilestoneIndex {
        self.ledger_validator.latest_solid_milestone_index()
    }

    /// Store `transaction` and try to solidify it. Returns whether it is solid afterwards.
    pub(crate) fn receive(&mut self, transaction: &Transaction) -> bool {
        self.tangle.put_transaction(transaction).unwrap();
        self.transaction_requester.mark_received(&transaction.hash);
        self.solidifier.solidify(&transaction.hash).unwrap()
    }

    /// Store every transaction of `bundle`, last transaction first, and return the tail's hash.
    pub(crate) fn receive_bundle(&mut self, bundle: &Bundle) -> CryptoHash {
        for transaction in bundle.transactions().iter().rev() {
            self.receive(transaction);
        }
        bundle.tail().unwrap().hash
    }

    /// A signed, zero-value bundle of one transaction.
    pub(crate) fn data(&mut self, trunk: CryptoHash, branch: CryptoHash) -> Bundle {
        let tag = self.next_nonce();
        BundleBuilder::new(self.configuration.security_level)
            .output(Address::new([0xDA; 32]), 0)
            .tag(tag)
            .build(trunk, branch)
    }

    /// A signed bundle moving `value` from `from` to `to`.
    pub(crate) fn transfer(
        &mut self,
        from: &SigningKey,
        to: Address,
        value: i64,
        trunk: CryptoHash,
        branch: CryptoHash,
    ) -> Bundle {
        let tag = self.next_nonce();
        BundleBuilder::new(self.configuration.security_level)
            .input(from, value)
            .output(to, value)
            .tag(tag)
            .build(trunk, branch)
    }

    pub(crate) fn milestone(&mut self, index: u64, trunk: CryptoHash, branch: CryptoHash) -> Transaction {
        let timestamp = self.next_nonce();
        milestone_transaction(
            &self.coordinator,
            coordinator_address(),
            MilestoneIndex::new(index),
            trunk,
            branch,
            timestamp,
        )
    }

    /// Receive a milestone transaction, then hand every candidate the solidifier forwarded to the
    /// tracker. Returns the tracker's result for the last candidate.
    pub(crate) fn receive_milestone(
        &mut self,
        milestone: &Transaction,
    ) -> Result<MilestoneIndex, ConsensusError> {
        self.receive(milestone);
        let mut result = Ok(self.latest_solid_milestone_index());
        for candidate in self.drain_candidates() {
            result = self.milestone_tracker.track(&candidate);
        }
        result
    }

    /// Take the milestone candidates the solidifier forwarded so far, without tracking them.
    pub(crate) fn drain_candidates(&mut self) -> Vec<CryptoHash> {
        self.milestone_candidates.try_iter().collect()
    }

    /// Issue and commit the milestone at `index` approving `trunk` and `branch`.
    pub(crate) fn commit_milestone(
        &mut self,
        index: u64,
        trunk: CryptoHash,
        branch: CryptoHash,
    ) -> CryptoHash {
        let milestone = self.milestone(index, trunk, branch);
        assert_eq!(
            self.receive_milestone(&milestone).unwrap(),
            MilestoneIndex::new(index)
        );
        milestone.hash
    }
}
