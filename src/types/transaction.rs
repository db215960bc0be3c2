/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'transaction' type and its associated methods.
//!
//! A transaction is a vertex of the tangle. It references two earlier transactions, its `trunk` and
//! its `branch`, and is identified by the SHA-256 hash of all of its other fields. Transactions are
//! immutable once persisted; the only mutable annotations (solidity and the milestone that confirmed
//! the transaction) are stored separately by the [tangle accessor](crate::tangle::Tangle).

use borsh::{BorshDeserialize, BorshSerialize};
use typed_builder::TypedBuilder;

use super::{
    crypto_primitives::{CryptoHasher, Digest},
    data_types::{Address, CryptoHash},
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub hash: CryptoHash,
    pub address: Address,
    pub value: i64,
    pub tag: u64,
    pub timestamp: u64,
    pub current_index: u32,
    pub last_index: u32,
    pub bundle: CryptoHash,
    pub trunk: CryptoHash,
    pub branch: CryptoHash,
    pub signature_fragment: Vec<u8>,
}

impl Transaction {
    /// Compute the hash of a transaction with the given fields.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_hash(
        address: &Address,
        value: i64,
        tag: u64,
        timestamp: u64,
        current_index: u32,
        last_index: u32,
        bundle: &CryptoHash,
        trunk: &CryptoHash,
        branch: &CryptoHash,
        signature_fragment: &[u8],
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(address.bytes());
        hasher.update(value.to_le_bytes());
        hasher.update(tag.to_le_bytes());
        hasher.update(timestamp.to_le_bytes());
        hasher.update(current_index.to_le_bytes());
        hasher.update(last_index.to_le_bytes());
        hasher.update(bundle.bytes());
        hasher.update(trunk.bytes());
        hasher.update(branch.bytes());
        hasher.update((signature_fragment.len() as u32).to_le_bytes());
        hasher.update(signature_fragment);
        CryptoHash::new(hasher.finalize().into())
    }

    /// The part of the transaction that is committed to by its bundle hash.
    ///
    /// The essence excludes the bundle hash itself, the trunk and branch references (which are chosen
    /// at attachment time, after the bundle is signed), and the signature fragment.
    pub fn essence(&self) -> Vec<u8> {
        essence(
            &self.address,
            self.value,
            self.tag,
            self.timestamp,
            self.current_index,
            self.last_index,
        )
    }

    /// Whether `hash` matches the hash of the other fields.
    pub fn is_correct(&self) -> bool {
        self.hash
            == Self::compute_hash(
                &self.address,
                self.value,
                self.tag,
                self.timestamp,
                self.current_index,
                self.last_index,
                &self.bundle,
                &self.trunk,
                &self.branch,
                &self.signature_fragment,
            )
    }

    /// Whether this is the first transaction ("tail") of its bundle.
    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }

    /// Trunk and branch references, in that order.
    pub fn parents(&self) -> [CryptoHash; 2] {
        [self.trunk, self.branch]
    }
}

pub(crate) fn essence(
    address: &Address,
    value: i64,
    tag: u64,
    timestamp: u64,
    current_index: u32,
    last_index: u32,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(32 + 8 + 8 + 8 + 4 + 4);
    bytes.extend_from_slice(&address.bytes());
    bytes.extend_from_slice(&value.to_le_bytes());
    bytes.extend_from_slice(&tag.to_le_bytes());
    bytes.extend_from_slice(&timestamp.to_le_bytes());
    bytes.extend_from_slice(&current_index.to_le_bytes());
    bytes.extend_from_slice(&last_index.to_le_bytes());
    bytes
}

/// The fields of a [`Transaction`] other than its hash.
///
/// ```ignore
/// let transaction = TransactionSpec::builder()
///     .address(address)
///     .trunk(trunk)
///     .branch(branch)
///     .build()
///     .into_transaction();
/// ```
#[derive(TypedBuilder)]
pub struct TransactionSpec {
    address: Address,
    #[builder(default)]
    value: i64,
    #[builder(default)]
    tag: u64,
    #[builder(default)]
    timestamp: u64,
    #[builder(default)]
    current_index: u32,
    #[builder(default)]
    last_index: u32,
    #[builder(default)]
    bundle: CryptoHash,
    trunk: CryptoHash,
    branch: CryptoHash,
    #[builder(default)]
    signature_fragment: Vec<u8>,
}

impl TransactionSpec {
    /// Hash the fields and produce the `Transaction`.
    pub fn into_transaction(self) -> Transaction {
        let hash = Transaction::compute_hash(
            &self.address,
            self.value,
            self.tag,
            self.timestamp,
            self.current_index,
            self.last_index,
            &self.bundle,
            &self.trunk,
            &self.branch,
            &self.signature_fragment,
        );
        Transaction {
            hash,
            address: self.address,
            value: self.value,
            tag: self.tag,
            timestamp: self.timestamp,
            current_index: self.current_index,
            last_index: self.last_index,
            bundle: self.bundle,
            trunk: self.trunk,
            branch: self.branch,
            signature_fragment: self.signature_fragment,
        }
    }
}
