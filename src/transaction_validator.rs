/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Checks a received transaction must pass before it is stored.
//!
//! These checks look at the transaction alone. Whether its bundle is valid is decided later by the
//! [bundle validator](crate::bundle_validator), once the whole bundle is stored.

use std::{
    fmt::{self, Display, Formatter},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{config::Configuration, errors::ConsensusError, types::transaction::Transaction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidTransactionReason {
    /// The hash is not the hash of the transaction's fields.
    HashMismatch,
    /// `current_index` is greater than `last_index`.
    IndexOutOfRange,
    /// The value moves more than the total supply.
    ValueOutOfRange,
    /// The timestamp is further in the future than the allowed drift.
    TimestampInFuture,
    /// The timestamp is earlier than the configured minimum.
    TimestampTooOld,
}

impl Display for InvalidTransactionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidTransactionReason::HashMismatch => "hash does not match its fields",
            InvalidTransactionReason::IndexOutOfRange => "current index exceeds last index",
            InvalidTransactionReason::ValueOutOfRange => "value exceeds the total supply",
            InvalidTransactionReason::TimestampInFuture => "timestamp is in the future",
            InvalidTransactionReason::TimestampTooOld => "timestamp is too old",
        };
        write!(f, "{}", reason)
    }
}

#[derive(Clone, Debug)]
pub struct TransactionValidator {
    total_supply: u64,
    max_timestamp_drift: Duration,
    min_timestamp: u64,
}

impl TransactionValidator {
    pub fn new(configuration: &Configuration) -> TransactionValidator {
        TransactionValidator {
            total_supply: configuration.total_supply,
            max_timestamp_drift: configuration.max_timestamp_drift,
            min_timestamp: configuration.min_transaction_timestamp,
        }
    }

    /// Check `transaction` against the current time.
    pub fn validate(&self, transaction: &Transaction) -> Result<(), ConsensusError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since_epoch| since_epoch.as_secs())
            .unwrap_or(0);
        self.validate_at(transaction, now)
    }

    /// Check `transaction` as if the time were `now`, in seconds since the Unix epoch.
    pub fn validate_at(&self, transaction: &Transaction, now: u64) -> Result<(), ConsensusError> {
        let reason = if !transaction.is_correct() {
            Some(InvalidTransactionReason::HashMismatch)
        } else if transaction.current_index > transaction.last_index {
            Some(InvalidTransactionReason::IndexOutOfRange)
        } else if transaction.value.unsigned_abs() > self.total_supply {
            Some(InvalidTransactionReason::ValueOutOfRange)
        } else if transaction.timestamp > now.saturating_add(self.max_timestamp_drift.as_secs()) {
            Some(InvalidTransactionReason::TimestampInFuture)
        } else if transaction.timestamp < self.min_timestamp {
            Some(InvalidTransactionReason::TimestampTooOld)
        } else {
            None
        };

        match reason {
            None => Ok(()),
            Some(reason) => {
                log::debug!("rejected transaction {}: {}", transaction.hash, reason);
                Err(ConsensusError::TransactionRejected {
                    transaction: transaction.hash,
                    reason,
                })
            }
        }
    }
}
