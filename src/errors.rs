/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error type returned by every fallible operation of the consensus engine.
//!
//! Every [`ConsensusError`] carries three orthogonal facets:
//! 1. The [`Module`] the error originated from.
//! 2. Its [`Severity`].
//! 3. A module-local error code.
//!
//! The three facets can be packed into a single 16-bit return code with [`ConsensusError::retcode`]:
//!
//! ```text
//!  16      9        1
//! *--------*--------*
//! |MMMMMMMM|SSCCCCCC|
//! *--------*--------*
//! ```
//!
//! ## Severity policy
//!
//! - `Fatal` errors (e.g., snapshot corruption, an inconsistent ledger delta) abort the affected
//!   subsystem's startup or commit. Callers should stop the node or ask for manual intervention.
//! - `Major` and `Moderate` errors abandon the triggering operation only. Sibling operations (e.g.,
//!   solidification of unrelated transactions) continue.
//! - `Minor` errors are retried locally up to a bound before surfacing.

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
};

use crate::{
    lifecycle::LifecycleState,
    tangle::pluggables::TangleError,
    transaction_validator::InvalidTransactionReason,
    types::data_types::{CryptoHash, MilestoneIndex},
};

/// The module a [`ConsensusError`] originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Module {
    General,
    Storage,
    Consensus,
    CumulativeWeight,
    ExitProbabilities,
    MilestoneTracker,
    Snapshot,
    LedgerValidator,
    TipSelector,
    Solidifier,
    TransactionValidator,
}

impl Module {
    /// The 8-bit module identifier used in [`ConsensusError::retcode`].
    pub const fn id(&self) -> u8 {
        match self {
            Module::General => 0x01,
            Module::Storage => 0x02,
            Module::Consensus => 0x09,
            Module::CumulativeWeight => 0x0A,
            Module::ExitProbabilities => 0x0B,
            Module::MilestoneTracker => 0x0C,
            Module::Snapshot => 0x0D,
            Module::LedgerValidator => 0x0E,
            Module::TipSelector => 0x0F,
            Module::Solidifier => 0x10,
            Module::TransactionValidator => 0x11,
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Module::General => "general",
            Module::Storage => "storage",
            Module::Consensus => "consensus",
            Module::CumulativeWeight => "cumulative weight",
            Module::ExitProbabilities => "exit probabilities",
            Module::MilestoneTracker => "milestone tracker",
            Module::Snapshot => "snapshot",
            Module::LedgerValidator => "ledger validator",
            Module::TipSelector => "tip selector",
            Module::Solidifier => "transaction solidifier",
            Module::TransactionValidator => "transaction validator",
        };
        write!(f, "{}", name)
    }
}

/// How serious a [`ConsensusError`] is. See [severity policy](self#severity-policy).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Minor,
    Moderate,
    Major,
    Fatal,
}

impl Severity {
    /// The 2-bit severity identifier used in [`ConsensusError::retcode`].
    pub const fn id(&self) -> u8 {
        match self {
            Severity::Minor => 0x0,
            Severity::Moderate => 0x1,
            Severity::Major => 0x2,
            Severity::Fatal => 0x3,
        }
    }
}

/// Which traversal bound a [`ConsensusError::TraversalBudgetExceeded`] hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalBudget {
    Depth(usize),
    Nodes(usize),
}

#[derive(Debug)]
pub enum ConsensusError {
    /* ↓↓↓ General ↓↓↓ */
    /// A collection could not grow to hold the transactions being traversed.
    OutOfMemory { module: Module },

    /// The OS refused to spawn a worker thread.
    FailedThreadSpawn { module: Module },

    /// A worker did not drain its in-flight work within the stop timeout. Calling `stop` again may
    /// succeed.
    StillRunning { module: Module },

    /// A lifecycle method was called in a state that does not allow it, e.g., `stop` before `start`.
    InvalidLifecycleTransition {
        component: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// A caller-provided deadline expired before the operation completed.
    Timeout,

    /* ↓↓↓ Storage ↓↓↓ */
    Storage(TangleError),

    /* ↓↓↓ Cumulative weight ↓↓↓ */
    /// The cumulative weight traversal hit its depth or node budget. Callers must treat this as
    /// "rating unavailable", never as zero weight.
    TraversalBudgetExceeded { budget: TraversalBudget },

    /* ↓↓↓ Exit probabilities ↓↓↓ */
    /// No solid milestone exists yet to start a walk from.
    NoEntryPoint,

    /// A transaction reached during a walk has no cumulative weight rating.
    MissingRating { transaction: CryptoHash },

    /// A walk reached a transaction without valid approvers that is not solid itself, or did not
    /// terminate within the size of the rated sub-tangle.
    InconsistentWalk { transaction: CryptoHash },

    /* ↓↓↓ Milestone tracker ↓↓↓ */
    /// More out-of-order milestones are buffered than configured. Not automatically recoverable.
    MilestoneGapTooLarge {
        latest_solid_index: MilestoneIndex,
        buffered: usize,
    },

    /// A milestone candidate is not signed by any of the coordinator's keys.
    InvalidMilestoneSignature { milestone: CryptoHash },

    /* ↓↓↓ Snapshot ↓↓↓ */
    SnapshotFileNotFound { path: PathBuf },

    SnapshotInvalidFile { path: PathBuf, reason: String },

    SnapshotIoError { path: PathBuf, source: std::io::Error },

    /// The balances of a snapshot do not add up to the total supply.
    SnapshotInvalidSupply { expected: u64, actual: u128 },

    /// A historical balance was requested for a milestone index outside the retained window.
    SnapshotBalanceNotFound { index: MilestoneIndex },

    /* ↓↓↓ Ledger validator ↓↓↓ */
    /// A confirmed transaction belongs to an invalid bundle.
    InvalidTransaction { transaction: CryptoHash },

    CouldNotLoadMilestone { index: MilestoneIndex },

    /// Applying (or reverting) a milestone's delta would make a balance negative or change the
    /// total supply.
    InconsistentDelta { index: MilestoneIndex },

    /// A transaction in a milestone's past cone is not solid.
    TransactionNotSolid { transaction: CryptoHash },

    /// A milestone does not directly or transitively approve its predecessor.
    MilestoneDoesNotApprovePredecessor { index: MilestoneIndex },

    /// A milestone was submitted for validation out of index order.
    UnexpectedMilestoneIndex {
        expected: MilestoneIndex,
        actual: MilestoneIndex,
    },

    /* ↓↓↓ Tip selector ↓↓↓ */
    /// Every attempt to select a consistent pair of tips found a double spend between their past cones.
    TipsInconsistent,

    /// The reference transaction passed to tip selection fails the walk validator.
    ReferenceTooOld { transaction: CryptoHash },

    /// Entry point selection failed.
    TipSelectorInvalidEntryPoint { source: Box<ConsensusError> },

    /// Tip selection was asked for a number of tips other than 1 or 2.
    InvalidTipCount { count: usize },

    /* ↓↓↓ Transaction validator ↓↓↓ */
    /// A received transaction failed a structural check and was not stored.
    TransactionRejected {
        transaction: CryptoHash,
        reason: InvalidTransactionReason,
    },
}

impl ConsensusError {
    pub fn module(&self) -> Module {
        match self {
            ConsensusError::OutOfMemory { module }
            | ConsensusError::FailedThreadSpawn { module }
            | ConsensusError::StillRunning { module } => *module,
            ConsensusError::InvalidLifecycleTransition { .. } => Module::General,
            ConsensusError::Timeout => Module::Consensus,
            ConsensusError::Storage(_) => Module::Storage,
            ConsensusError::TraversalBudgetExceeded { .. } => Module::CumulativeWeight,
            ConsensusError::NoEntryPoint
            | ConsensusError::MissingRating { .. }
            | ConsensusError::InconsistentWalk { .. } => Module::ExitProbabilities,
            ConsensusError::MilestoneGapTooLarge { .. }
            | ConsensusError::InvalidMilestoneSignature { .. } => Module::MilestoneTracker,
            ConsensusError::SnapshotFileNotFound { .. }
            | ConsensusError::SnapshotInvalidFile { .. }
            | ConsensusError::SnapshotIoError { .. }
            | ConsensusError::SnapshotInvalidSupply { .. }
            | ConsensusError::SnapshotBalanceNotFound { .. } => Module::Snapshot,
            ConsensusError::InvalidTransaction { .. }
            | ConsensusError::CouldNotLoadMilestone { .. }
            | ConsensusError::InconsistentDelta { .. }
            | ConsensusError::TransactionNotSolid { .. }
            | ConsensusError::MilestoneDoesNotApprovePredecessor { .. }
            | ConsensusError::UnexpectedMilestoneIndex { .. } => Module::LedgerValidator,
            ConsensusError::TipsInconsistent
            | ConsensusError::ReferenceTooOld { .. }
            | ConsensusError::TipSelectorInvalidEntryPoint { .. }
            | ConsensusError::InvalidTipCount { .. } => Module::TipSelector,
            ConsensusError::TransactionRejected { .. } => Module::TransactionValidator,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ConsensusError::OutOfMemory { module } => match module {
                Module::Snapshot | Module::LedgerValidator => Severity::Fatal,
                _ => Severity::Major,
            },
            ConsensusError::FailedThreadSpawn { .. } => Severity::Fatal,
            ConsensusError::StillRunning { .. } => Severity::Moderate,
            ConsensusError::InvalidLifecycleTransition { .. } => Severity::Major,
            ConsensusError::Timeout => Severity::Moderate,
            ConsensusError::Storage(_) => Severity::Major,
            ConsensusError::TraversalBudgetExceeded { .. } => Severity::Major,
            ConsensusError::NoEntryPoint => Severity::Major,
            ConsensusError::MissingRating { .. } => Severity::Moderate,
            ConsensusError::InconsistentWalk { .. } => Severity::Major,
            ConsensusError::MilestoneGapTooLarge { .. } => Severity::Major,
            ConsensusError::InvalidMilestoneSignature { .. } => Severity::Moderate,
            ConsensusError::SnapshotFileNotFound { .. }
            | ConsensusError::SnapshotInvalidFile { .. }
            | ConsensusError::SnapshotIoError { .. }
            | ConsensusError::SnapshotInvalidSupply { .. } => Severity::Fatal,
            ConsensusError::SnapshotBalanceNotFound { .. } => Severity::Moderate,
            ConsensusError::InvalidTransaction { .. } => Severity::Major,
            ConsensusError::CouldNotLoadMilestone { .. } => Severity::Major,
            ConsensusError::InconsistentDelta { .. } => Severity::Fatal,
            ConsensusError::TransactionNotSolid { .. } => Severity::Fatal,
            ConsensusError::MilestoneDoesNotApprovePredecessor { .. } => Severity::Major,
            ConsensusError::UnexpectedMilestoneIndex { .. } => Severity::Major,
            ConsensusError::TipsInconsistent => Severity::Moderate,
            ConsensusError::ReferenceTooOld { .. } => Severity::Moderate,
            ConsensusError::TipSelectorInvalidEntryPoint { .. } => Severity::Major,
            ConsensusError::InvalidTipCount { .. } => Severity::Minor,
            ConsensusError::TransactionRejected { .. } => Severity::Moderate,
        }
    }

    /// The 6-bit module-local error code.
    pub fn code(&self) -> u8 {
        match self {
            ConsensusError::OutOfMemory { module } => match module {
                Module::General => 0x02,
                Module::Consensus | Module::CumulativeWeight | Module::ExitProbabilities => 0x04,
                Module::LedgerValidator => 0x03,
                Module::MilestoneTracker => 0x06,
                Module::Snapshot => 0x09,
                _ => 0x01,
            },
            ConsensusError::FailedThreadSpawn { .. } => 0x03,
            ConsensusError::StillRunning { .. } => 0x05,
            ConsensusError::InvalidLifecycleTransition { .. } => 0x06,
            ConsensusError::Timeout => 0x03,
            ConsensusError::Storage(_) => 0x02,
            ConsensusError::TraversalBudgetExceeded { .. } => 0x02,
            ConsensusError::NoEntryPoint => 0x06,
            ConsensusError::MissingRating { .. } => 0x07,
            ConsensusError::InconsistentWalk { .. } => 0x08,
            ConsensusError::MilestoneGapTooLarge { .. } => 0x07,
            ConsensusError::InvalidMilestoneSignature { .. } => 0x08,
            ConsensusError::SnapshotFileNotFound { .. } => 0x05,
            ConsensusError::SnapshotInvalidFile { .. } => 0x06,
            ConsensusError::SnapshotInvalidSupply { .. } => 0x07,
            ConsensusError::SnapshotBalanceNotFound { .. } => 0x0B,
            ConsensusError::SnapshotIoError { .. } => 0x0E,
            ConsensusError::InvalidTransaction { .. } => 0x02,
            ConsensusError::CouldNotLoadMilestone { .. } => 0x04,
            ConsensusError::InconsistentDelta { .. } => 0x05,
            ConsensusError::TransactionNotSolid { .. } => 0x06,
            ConsensusError::MilestoneDoesNotApprovePredecessor { .. } => 0x07,
            ConsensusError::UnexpectedMilestoneIndex { .. } => 0x08,
            ConsensusError::TipsInconsistent => 0x01,
            ConsensusError::ReferenceTooOld { .. } => 0x02,
            ConsensusError::TipSelectorInvalidEntryPoint { .. } => 0x03,
            ConsensusError::InvalidTipCount { .. } => 0x04,
            ConsensusError::TransactionRejected { .. } => 0x01,
        }
    }

    /// Pack module, severity, and code into a single 16-bit return code.
    pub fn retcode(&self) -> u16 {
        ((self.module().id() as u16) << 8)
            | ((self.severity().id() as u16) << 6)
            | (self.code() as u16 & 0x3F)
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl Display for ConsensusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::OutOfMemory { module } => write!(f, "out of memory in {}", module),
            ConsensusError::FailedThreadSpawn { module } => {
                write!(f, "failed to spawn the {} thread", module)
            }
            ConsensusError::StillRunning { module } => {
                write!(f, "the {} is still running", module)
            }
            ConsensusError::InvalidLifecycleTransition {
                component,
                from,
                to,
            } => write!(f, "{} cannot go from {:?} to {:?}", component, from, to),
            ConsensusError::Timeout => write!(f, "deadline expired"),
            ConsensusError::Storage(err) => write!(f, "storage error: {}", err),
            ConsensusError::TraversalBudgetExceeded { budget } => match budget {
                TraversalBudget::Depth(depth) => {
                    write!(f, "traversal exceeded the depth budget of {}", depth)
                }
                TraversalBudget::Nodes(nodes) => {
                    write!(f, "traversal exceeded the budget of {} transactions", nodes)
                }
            },
            ConsensusError::NoEntryPoint => write!(f, "no solid milestone to start a walk from"),
            ConsensusError::MissingRating { transaction } => {
                write!(f, "no cumulative weight rating for {}", transaction)
            }
            ConsensusError::InconsistentWalk { transaction } => {
                write!(f, "walk got stuck at {}", transaction)
            }
            ConsensusError::MilestoneGapTooLarge {
                latest_solid_index,
                buffered,
            } => write!(
                f,
                "{} milestones are waiting for a predecessor of milestone {}",
                buffered,
                *latest_solid_index + 1
            ),
            ConsensusError::InvalidMilestoneSignature { milestone } => {
                write!(f, "milestone {} has an invalid signature", milestone)
            }
            ConsensusError::SnapshotFileNotFound { path } => {
                write!(f, "snapshot file {} not found", path.display())
            }
            ConsensusError::SnapshotInvalidFile { path, reason } => {
                write!(f, "snapshot file {} is invalid: {}", path.display(), reason)
            }
            ConsensusError::SnapshotIoError { path, source } => {
                write!(f, "i/o error on snapshot file {}: {}", path.display(), source)
            }
            ConsensusError::SnapshotInvalidSupply { expected, actual } => write!(
                f,
                "snapshot balances add up to {} instead of {}",
                actual, expected
            ),
            ConsensusError::SnapshotBalanceNotFound { index } => {
                write!(f, "no balances retained for milestone {}", index)
            }
            ConsensusError::InvalidTransaction { transaction } => {
                write!(f, "transaction {} belongs to an invalid bundle", transaction)
            }
            ConsensusError::CouldNotLoadMilestone { index } => {
                write!(f, "could not load milestone {}", index)
            }
            ConsensusError::InconsistentDelta { index } => {
                write!(f, "the ledger delta of milestone {} is inconsistent", index)
            }
            ConsensusError::TransactionNotSolid { transaction } => {
                write!(f, "transaction {} is not solid", transaction)
            }
            ConsensusError::MilestoneDoesNotApprovePredecessor { index } => write!(
                f,
                "milestone {} does not approve its predecessor",
                index
            ),
            ConsensusError::UnexpectedMilestoneIndex { expected, actual } => write!(
                f,
                "expected milestone {}, got milestone {}",
                expected, actual
            ),
            ConsensusError::TipsInconsistent => write!(f, "could not select consistent tips"),
            ConsensusError::ReferenceTooOld { transaction } => {
                write!(f, "reference transaction {} is too old", transaction)
            }
            ConsensusError::TipSelectorInvalidEntryPoint { source } => {
                write!(f, "invalid entry point: {}", source)
            }
            ConsensusError::InvalidTipCount { count } => {
                write!(f, "cannot select {} tips, only 1 or 2", count)
            }
            ConsensusError::TransactionRejected {
                transaction,
                reason,
            } => write!(f, "rejected transaction {}: {}", transaction, reason),
        }?;
        write!(
            f,
            " (M=0x{:02X}, E=0x{:02X}, S=0x{:X} (0x{:04X}))",
            self.module().id(),
            self.code(),
            self.severity().id(),
            self.retcode()
        )
    }
}

impl std::error::Error for ConsensusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsensusError::Storage(err) => Some(err),
            ConsensusError::SnapshotIoError { source, .. } => Some(source),
            ConsensusError::TipSelectorInvalidEntryPoint { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<TangleError> for ConsensusError {
    fn from(value: TangleError) -> Self {
        ConsensusError::Storage(value)
    }
}
