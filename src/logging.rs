/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the engine's
//! [configuration](crate::config::Configuration::log_events).
//!
//! The engine logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [CommitMilestone](crate::events::CommitMilestoneEvent) is printed:
//!
//! ```text
//! CommitMilestone, 1701329264, 42, fNGCJyk, 17
//! ```
//!
//! In the snippet:
//! - The third value is the index of the milestone.
//! - The fourth value is the first seven characters of the Base64 encoding of the hash of the
//!   milestone transaction.
//! - The fifth value is the number of transactions the milestone confirmed.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const RECEIVE_TRANSACTION: &str = "ReceiveTransaction";
pub const SOLIDIFY_TRANSACTION: &str = "SolidifyTransaction";
pub const REQUEST_TRANSACTION: &str = "RequestTransaction";

pub const RECEIVE_MILESTONE: &str = "ReceiveMilestone";
pub const COMMIT_MILESTONE: &str = "CommitMilestone";
pub const REJECT_MILESTONE: &str = "RejectMilestone";
pub const REVERT_MILESTONE: &str = "RevertMilestone";
pub const MILESTONE_GAP: &str = "MilestoneGap";

pub const SELECT_TIPS: &str = "SelectTips";

pub const START_WORKER: &str = "StartWorker";
pub const STOP_WORKER: &str = "StopWorker";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for ReceiveTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_transaction_event: &ReceiveTransactionEvent| {
            log::info!(
                "{}, {}, {}",
                RECEIVE_TRANSACTION,
                secs_since_unix_epoch(receive_transaction_event.timestamp),
                first_seven_base64_chars(&receive_transaction_event.transaction.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for SolidifyTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |solidify_transaction_event: &SolidifyTransactionEvent| {
            log::info!(
                "{}, {}, {}",
                SOLIDIFY_TRANSACTION,
                secs_since_unix_epoch(solidify_transaction_event.timestamp),
                first_seven_base64_chars(&solidify_transaction_event.transaction.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RequestTransactionEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |request_transaction_event: &RequestTransactionEvent| {
            log::info!(
                "{}, {}, {}",
                REQUEST_TRANSACTION,
                secs_since_unix_epoch(request_transaction_event.timestamp),
                first_seven_base64_chars(&request_transaction_event.transaction.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveMilestoneEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_milestone_event: &ReceiveMilestoneEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_MILESTONE,
                secs_since_unix_epoch(receive_milestone_event.timestamp),
                receive_milestone_event.index,
                first_seven_base64_chars(&receive_milestone_event.milestone.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitMilestoneEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_milestone_event: &CommitMilestoneEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_MILESTONE,
                secs_since_unix_epoch(commit_milestone_event.timestamp),
                commit_milestone_event.index,
                first_seven_base64_chars(&commit_milestone_event.milestone.bytes()),
                commit_milestone_event.confirmed_transactions
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectMilestoneEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_milestone_event: &RejectMilestoneEvent| {
            log::warn!(
                "{}, {}, {}, {}, 0x{:04X}",
                REJECT_MILESTONE,
                secs_since_unix_epoch(reject_milestone_event.timestamp),
                reject_milestone_event.index,
                first_seven_base64_chars(&reject_milestone_event.milestone.bytes()),
                reject_milestone_event.retcode
            )
        };
        Box::new(logger)
    }
}

impl Logger for RevertMilestoneEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |revert_milestone_event: &RevertMilestoneEvent| {
            log::warn!(
                "{}, {}, {}",
                REVERT_MILESTONE,
                secs_since_unix_epoch(revert_milestone_event.timestamp),
                revert_milestone_event.index
            )
        };
        Box::new(logger)
    }
}

impl Logger for MilestoneGapEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |milestone_gap_event: &MilestoneGapEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                MILESTONE_GAP,
                secs_since_unix_epoch(milestone_gap_event.timestamp),
                milestone_gap_event.latest_solid_index,
                milestone_gap_event.buffered
            )
        };
        Box::new(logger)
    }
}

impl Logger for SelectTipsEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |select_tips_event: &SelectTipsEvent| {
            let tips = select_tips_event
                .tips
                .iter()
                .map(|tip| first_seven_base64_chars(&tip.bytes()))
                .collect::<Vec<String>>()
                .join(" ");
            log::info!(
                "{}, {}, {}, {}",
                SELECT_TIPS,
                secs_since_unix_epoch(select_tips_event.timestamp),
                tips,
                select_tips_event.attempts
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartWorkerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |start_worker_event: &StartWorkerEvent| {
            log::info!(
                "{}, {}, {}",
                START_WORKER,
                secs_since_unix_epoch(start_worker_event.timestamp),
                start_worker_event.worker
            )
        };
        Box::new(logger)
    }
}

impl Logger for StopWorkerEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |stop_worker_event: &StopWorkerEvent| {
            log::info!(
                "{}, {}, {}",
                STOP_WORKER,
                secs_since_unix_epoch(stop_worker_event.timestamp),
                stop_worker_event.worker
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
