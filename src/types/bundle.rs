/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bundles: ordered groups of transactions that are applied to the ledger atomically.
//!
//! A bundle of `n` transactions has transactions with `current_index` `0..n` and `last_index` `n - 1`.
//! Transaction `i` references transaction `i + 1` as its trunk, so a bundle can be loaded by following
//! trunk references from its first transaction (the "tail"). The bundle hash is the SHA-256 hash of
//! the concatenated [essences](super::transaction::Transaction::essence) of its transactions.
//!
//! # Inputs and signatures
//!
//! A transaction with a negative value spends from its address. An input spans `security_level`
//! consecutive transactions with the same address: the first carries the (negative) value and the
//! signature fragment, the others carry value 0. The signature fragment is the Ed25519 public key of
//! the address followed by a signature over the bundle hash, and the address must be
//! [derived](address_from_public_key) from that public key.

use super::{
    crypto_primitives::{sha256, CryptoHasher, Digest, Signer, SigningKey, VerifyingKey},
    data_types::{Address, CryptoHash, SecurityLevel},
    transaction::{essence, Transaction, TransactionSpec},
};

/// An ordered sequence of transactions sharing a bundle hash, tail first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle(Vec<Transaction>);

impl Bundle {
    /// Create a new `Bundle` wrapping `transactions`, which should be ordered tail first.
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self(transactions)
    }

    /// Get a reference to the transactions in this bundle, tail first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.0
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.0
    }

    /// Get the first transaction of this bundle.
    pub fn tail(&self) -> Option<&Transaction> {
        self.0.first()
    }

    /// Get the bundle hash shared by the transactions of this bundle.
    pub fn hash(&self) -> Option<CryptoHash> {
        self.tail().map(|tail| tail.bundle)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.0.iter()
    }
}

/// Compute the bundle hash of `transactions`, given in bundle order.
pub fn essence_hash<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    for transaction in transactions {
        hasher.update(transaction.essence());
    }
    CryptoHash::new(hasher.finalize().into())
}

/// Derive the address that `public_key` controls at `security_level`.
pub fn address_from_public_key(public_key: &VerifyingKey, security_level: SecurityLevel) -> Address {
    let mut bytes = Vec::with_capacity(33);
    bytes.push(security_level.int());
    bytes.extend_from_slice(public_key.as_bytes());
    Address::new(sha256(&bytes).bytes())
}

/// Produce the signature fragment that authorizes spending from `signing_key`'s address in the bundle
/// with hash `bundle_hash`.
pub fn signature_fragment(signing_key: &SigningKey, bundle_hash: &CryptoHash) -> Vec<u8> {
    let mut fragment = Vec::with_capacity(32 + 64);
    fragment.extend_from_slice(signing_key.verifying_key().as_bytes());
    fragment.extend_from_slice(&signing_key.sign(&bundle_hash.bytes()).to_bytes());
    fragment
}

enum BundleEntry {
    Output {
        address: Address,
        value: i64,
    },
    Input {
        signing_key: SigningKey,
        value: i64,
    },
}

/// Builds signed bundles ready to be attached to the tangle.
///
/// ```ignore
/// let bundle = BundleBuilder::new(SecurityLevel::default())
///     .input(&alice, 100)
///     .output(bob, 100)
///     .timestamp(now)
///     .build(trunk, branch);
/// ```
pub struct BundleBuilder {
    security_level: SecurityLevel,
    entries: Vec<BundleEntry>,
    tag: u64,
    timestamp: u64,
}

impl BundleBuilder {
    pub fn new(security_level: SecurityLevel) -> Self {
        Self {
            security_level,
            entries: Vec::new(),
            tag: 0,
            timestamp: 0,
        }
    }

    /// Transfer `value` to `address`. A value of 0 adds a plain data transaction.
    pub fn output(mut self, address: Address, value: i64) -> Self {
        self.entries.push(BundleEntry::Output { address, value });
        self
    }

    /// Spend `value` from the address controlled by `signing_key`.
    pub fn input(mut self, signing_key: &SigningKey, value: i64) -> Self {
        self.entries.push(BundleEntry::Input {
            signing_key: signing_key.clone(),
            value,
        });
        self
    }

    pub fn tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sign the bundle and chain its transactions, the last transaction referencing `trunk` and
    /// `branch`.
    pub fn build(self, trunk: CryptoHash, branch: CryptoHash) -> Bundle {
        // 1. Lay out one row per transaction: (address, value, signer of the row if it starts an input).
        let mut rows: Vec<(Address, i64, Option<&SigningKey>)> = Vec::new();
        for entry in &self.entries {
            match entry {
                BundleEntry::Output { address, value } => rows.push((*address, *value, None)),
                BundleEntry::Input { signing_key, value } => {
                    let address =
                        address_from_public_key(&signing_key.verifying_key(), self.security_level);
                    rows.push((address, -value.abs(), Some(signing_key)));
                    for _ in 1..self.security_level.int() {
                        rows.push((address, 0, None));
                    }
                }
            }
        }
        let last_index = rows.len().saturating_sub(1) as u32;

        // 2. Compute the bundle hash over the essences.
        let mut hasher = CryptoHasher::new();
        for (current_index, (address, value, _)) in rows.iter().enumerate() {
            hasher.update(essence(
                address,
                *value,
                self.tag,
                self.timestamp,
                current_index as u32,
                last_index,
            ));
        }
        let bundle_hash = CryptoHash::new(hasher.finalize().into());

        // 3. Create the transactions back to front so that each can reference the next as its trunk.
        let mut transactions: Vec<Transaction> = Vec::with_capacity(rows.len());
        let mut next: Option<CryptoHash> = None;
        for (current_index, (address, value, signer)) in rows.iter().enumerate().rev() {
            let (tx_trunk, tx_branch) = match next {
                None => (trunk, branch),
                Some(next_hash) => (next_hash, trunk),
            };
            let transaction = TransactionSpec::builder()
                .address(*address)
                .value(*value)
                .tag(self.tag)
                .timestamp(self.timestamp)
                .current_index(current_index as u32)
                .last_index(last_index)
                .bundle(bundle_hash)
                .trunk(tx_trunk)
                .branch(tx_branch)
                .signature_fragment(
                    signer
                        .map(|signing_key| signature_fragment(signing_key, &bundle_hash))
                        .unwrap_or_default(),
                )
                .build()
                .into_transaction();
            next = Some(transaction.hash);
            transactions.push(transaction);
        }
        transactions.reverse();

        Bundle::new(transactions)
    }
}
