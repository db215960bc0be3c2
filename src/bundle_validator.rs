/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Validation of [bundles](crate::types::bundle).
//!
//! A bundle is valid if and only if:
//! 1. It is complete: it has `last_index + 1` transactions, indexed `0..=last_index` in order, all
//!    sharing the same bundle hash and `last_index`.
//! 2. Each transaction but the last references the next as its trunk.
//! 3. The SHA-256 hash of the concatenated essences equals the bundle hash.
//! 4. Its values sum to zero, without overflow.
//! 5. Every input (negative value) spans `security_level` transactions with the same address, and its
//!    signature fragment holds a public key that derives the address and a valid signature over the
//!    bundle hash by that key.
//!
//! Validation never writes anything; a bundle is either [`Valid`](BundleStatus::Valid) or
//! [`Invalid`](BundleStatus::Invalid) with the first reason found.

use crate::{
    errors::ConsensusError,
    tangle::{pluggables::KVStore, Tangle},
    types::{
        bundle::{address_from_public_key, essence_hash, Bundle},
        crypto_primitives::{verify_signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH},
        data_types::{CryptoHash, SecurityLevel},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleStatus {
    Valid,
    Invalid(InvalidBundleReason),
}

impl BundleStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, BundleStatus::Valid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidBundleReason {
    /// The bundle has fewer transactions than its `last_index` implies, or none at all.
    Incomplete,
    /// A transaction's `current_index`, `last_index`, or bundle hash does not match its position.
    InvalidIndex,
    /// A transaction does not reference the next transaction of the bundle as its trunk.
    BrokenTrunkChain,
    /// The bundle hash is not the hash of the bundle's essence.
    InvalidBundleHash,
    /// The values of the bundle do not sum to zero.
    NonZeroValue,
    /// An input is not correctly signed by the owner of its address.
    InvalidSignature,
    /// Summing the values of the bundle overflows.
    ValueOverflow,
}

/// Check `bundle`, whose transactions are given tail first.
pub fn validate(bundle: &Bundle, security_level: SecurityLevel) -> BundleStatus {
    match check(bundle, security_level) {
        Ok(()) => BundleStatus::Valid,
        Err(reason) => BundleStatus::Invalid(reason),
    }
}

fn check(bundle: &Bundle, security_level: SecurityLevel) -> Result<(), InvalidBundleReason> {
    let transactions = bundle.transactions();
    let tail = transactions.first().ok_or(InvalidBundleReason::Incomplete)?;
    let last_index = tail.last_index;
    if transactions.len() as u64 != last_index as u64 + 1 {
        return Err(InvalidBundleReason::Incomplete);
    }

    // Structure.
    for (position, transaction) in transactions.iter().enumerate() {
        if transaction.current_index as usize != position
            || transaction.last_index != last_index
            || transaction.bundle != tail.bundle
        {
            return Err(InvalidBundleReason::InvalidIndex);
        }
    }
    for pair in transactions.windows(2) {
        if pair[0].trunk != pair[1].hash {
            return Err(InvalidBundleReason::BrokenTrunkChain);
        }
    }
    if essence_hash(transactions) != tail.bundle {
        return Err(InvalidBundleReason::InvalidBundleHash);
    }

    // Value.
    let mut sum: i64 = 0;
    for transaction in transactions {
        sum = sum
            .checked_add(transaction.value)
            .ok_or(InvalidBundleReason::ValueOverflow)?;
    }
    if sum != 0 {
        return Err(InvalidBundleReason::NonZeroValue);
    }

    // Signatures.
    let span = security_level.int() as usize;
    let mut position = 0;
    while position < transactions.len() {
        let input = &transactions[position];
        if input.value >= 0 {
            position += 1;
            continue;
        }
        let continuations = transactions
            .get(position + 1..position + span)
            .ok_or(InvalidBundleReason::InvalidSignature)?;
        if continuations
            .iter()
            .any(|continuation| continuation.address != input.address || continuation.value != 0)
        {
            return Err(InvalidBundleReason::InvalidSignature);
        }

        let fragment = &input.signature_fragment;
        if fragment.len() != PUBLIC_KEY_LENGTH + SIGNATURE_LENGTH {
            return Err(InvalidBundleReason::InvalidSignature);
        }
        let (public_key_bytes, signature_bytes) = fragment.split_at(PUBLIC_KEY_LENGTH);
        let public_key = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key_bytes)
            .ok()
            .and_then(|bytes| VerifyingKey::from_bytes(&bytes).ok())
            .ok_or(InvalidBundleReason::InvalidSignature)?;
        if address_from_public_key(&public_key, security_level) != input.address
            || !verify_signature(&public_key, &tail.bundle.bytes(), signature_bytes)
        {
            return Err(InvalidBundleReason::InvalidSignature);
        }

        position += span;
    }

    Ok(())
}

/// Load the bundle instance starting at `tail` by following trunk references.
///
/// Returns `None` if `tail` is not stored or is not a tail. A bundle instance that is only partially
/// stored is returned as is, and [`validate`] reports it as incomplete.
pub fn load_bundle<K: KVStore>(
    tangle: &Tangle<K>,
    tail: &CryptoHash,
) -> Result<Option<Bundle>, ConsensusError> {
    let tail = match tangle.get_transaction(tail)? {
        Some(transaction) if transaction.is_tail() => transaction,
        _ => return Ok(None),
    };
    let mut current = tail.clone();
    let mut transactions = vec![tail];
    while current.current_index < current.last_index {
        match tangle.get_transaction(&current.trunk)? {
            Some(next)
                if next.bundle == current.bundle
                    && next.current_index == current.current_index + 1 =>
            {
                current = next.clone();
                transactions.push(next);
            }
            _ => break,
        }
    }
    Ok(Some(Bundle::new(transactions)))
}

/// Load and validate the bundle instance starting at `tail`.
pub fn validate_tail<K: KVStore>(
    tangle: &Tangle<K>,
    tail: &CryptoHash,
    security_level: SecurityLevel,
) -> Result<BundleStatus, ConsensusError> {
    Ok(match load_bundle(tangle, tail)? {
        Some(bundle) => validate(&bundle, security_level),
        None => BundleStatus::Invalid(InvalidBundleReason::Incomplete),
    })
}
