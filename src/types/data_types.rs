/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes or numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// 32-byte cryptographic hash.
///
/// Transactions in the tangle are identified by the SHA-256 hash of their contents. Trunk and branch
/// references are plain `CryptoHash` values that are looked up through the
/// [tangle accessor](crate::tangle::Tangle), never pointers.
///
/// The all-zero hash is the [`null`](Self::null) hash. It is the reference used by the very first
/// transactions of a tangle and is treated as solid and confirmed everywhere.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash.
    pub const fn null() -> Self {
        Self([0u8; 32])
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Whether this is the all-zero hash.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for CryptoHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoHash({})", STANDARD_NO_PAD.encode(self.0))
    }
}

/// Address that holds a balance in the ledger.
///
/// Addresses that receive inputs are derived from an Ed25519 public key and a security level; see
/// [`address_from_public_key`](super::bundle::address_from_public_key).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshDeserialize, BorshSerialize,
)]
pub struct Address([u8; 32]);

impl Address {
    /// Create a new `Address` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `Address`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", STANDARD_NO_PAD.encode(self.0))
    }
}

/// Index of a milestone.
///
/// Milestone indices impose a total order on the otherwise partially-ordered tangle. The index of the
/// snapshot a node starts from is configured by
/// [`milestone_start_index`](crate::config::Configuration::milestone_start_index); every later
/// milestone increases the index by exactly 1.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    BorshDeserialize,
    BorshSerialize,
)]
pub struct MilestoneIndex(u64);

impl MilestoneIndex {
    /// Create a new `MilestoneIndex` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `MilestoneIndex`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the little-endian representation of the inner `u64` value of this `MilestoneIndex`.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Subtract `rhs` from this index, stopping at 0.
    pub fn saturating_sub(&self, rhs: u64) -> MilestoneIndex {
        MilestoneIndex(self.0.saturating_sub(rhs))
    }
}

impl Display for MilestoneIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for MilestoneIndex {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for MilestoneIndex {
    type Output = MilestoneIndex;
    fn add(self, rhs: u64) -> Self::Output {
        MilestoneIndex::new(self.0.add(rhs))
    }
}

impl Sub<MilestoneIndex> for MilestoneIndex {
    type Output = u64;
    fn sub(self, rhs: MilestoneIndex) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Security level of an input address: the number of consecutive bundle transactions an input spans.
///
/// Valid security levels are 1, 2, and 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 3;

    /// Create a new `SecurityLevel`, or `None` if `int` is outside `1..=3`.
    pub const fn new(int: u8) -> Option<Self> {
        if int >= Self::MIN && int <= Self::MAX {
            Some(Self(int))
        } else {
            None
        }
    }

    /// Get the inner `u8` value of this `SecurityLevel`.
    pub const fn int(&self) -> u8 {
        self.0
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self(2)
    }
}
