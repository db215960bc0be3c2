/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Milestones: coordinator-issued transactions that checkpoint the tangle.
//!
//! A milestone is a single-transaction bundle sent from the configured
//! [coordinator address](crate::config::Configuration::coordinator_address). Its `tag` holds the
//! milestone index and its signature fragment holds an Ed25519 signature, by one of the coordinator's
//! keys, over the [signing payload](signing_payload): the index and the trunk and branch references.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    bundle::essence_hash,
    crypto_primitives::{verify_signature, Signer, SigningKey, VerifyingKey},
    data_types::{Address, CryptoHash, MilestoneIndex},
    transaction::{Transaction, TransactionSpec},
};

/// A milestone recorded in the tangle: its index and the hash of the transaction that carries it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Milestone {
    pub index: MilestoneIndex,
    pub hash: CryptoHash,
}

impl Milestone {
    pub fn new(index: MilestoneIndex, hash: CryptoHash) -> Self {
        Self { index, hash }
    }

    /// Interpret `transaction` as a milestone candidate if it is sent from `coordinator_address`.
    ///
    /// This only checks the marker; the signature is checked by [`verify`](Self::verify).
    pub fn candidate(transaction: &Transaction, coordinator_address: &Address) -> Option<Milestone> {
        if &transaction.address == coordinator_address && transaction.is_tail() {
            Some(Milestone::new(
                MilestoneIndex::new(transaction.tag),
                transaction.hash,
            ))
        } else {
            None
        }
    }

    /// Check whether `transaction` carries a signature over this milestone by one of
    /// `coordinator_keys`.
    pub fn verify(&self, transaction: &Transaction, coordinator_keys: &[VerifyingKey]) -> bool {
        if transaction.hash != self.hash || transaction.last_index != 0 {
            return false;
        }
        let payload = signing_payload(self.index, &transaction.trunk, &transaction.branch);
        coordinator_keys
            .iter()
            .any(|key| verify_signature(key, &payload, &transaction.signature_fragment))
    }
}

/// Bytes signed by the coordinator for the milestone at `index` referencing `trunk` and `branch`.
pub fn signing_payload(index: MilestoneIndex, trunk: &CryptoHash, branch: &CryptoHash) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + 32 + 32);
    payload.extend_from_slice(&index.to_le_bytes());
    payload.extend_from_slice(&trunk.bytes());
    payload.extend_from_slice(&branch.bytes());
    payload
}

/// Create and sign the transaction carrying the milestone at `index`.
///
/// Used by coordinators and by tests; nodes only ever verify milestones.
pub fn milestone_transaction(
    coordinator_key: &SigningKey,
    coordinator_address: Address,
    index: MilestoneIndex,
    trunk: CryptoHash,
    branch: CryptoHash,
    timestamp: u64,
) -> Transaction {
    let essence_only = TransactionSpec::builder()
        .address(coordinator_address)
        .tag(index.int())
        .timestamp(timestamp)
        .trunk(trunk)
        .branch(branch)
        .build()
        .into_transaction();
    let bundle = essence_hash([&essence_only]);
    let signature = coordinator_key.sign(&signing_payload(index, &trunk, &branch));

    TransactionSpec::builder()
        .address(coordinator_address)
        .tag(index.int())
        .timestamp(timestamp)
        .bundle(bundle)
        .trunk(trunk)
        .branch(branch)
        .signature_fragment(signature.to_bytes().to_vec())
        .build()
        .into_transaction()
}
