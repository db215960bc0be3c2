/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted by the consensus engine, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Library users can
//! register handlers for each kind of event through the setters of
//! [`ConsensusSpec`](crate::consensus::ConsensusSpec); with
//! [`log_events`](crate::config::Configuration::log_events) enabled, the default handlers in
//! [`logging`](crate::logging) print every event.

use std::{sync::mpsc::Sender, time::SystemTime};

use crate::types::data_types::{CryptoHash, MilestoneIndex};

pub enum Event {
    // Events that change the tangle.
    ReceiveTransaction(ReceiveTransactionEvent),
    SolidifyTransaction(SolidifyTransactionEvent),
    RequestTransaction(RequestTransactionEvent),
    // Events that change the ledger.
    ReceiveMilestone(ReceiveMilestoneEvent),
    CommitMilestone(CommitMilestoneEvent),
    RejectMilestone(RejectMilestoneEvent),
    RevertMilestone(RevertMilestoneEvent),
    MilestoneGap(MilestoneGapEvent),
    // Tip selection.
    SelectTips(SelectTipsEvent),
    // Worker lifecycle.
    StartWorker(StartWorkerEvent),
    StopWorker(StopWorkerEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // The event bus only goes away when the engine is destroyed.
            let _ = event_publisher.send(event);
        }
    }
}

pub struct ReceiveTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
}

pub struct SolidifyTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
}

pub struct RequestTransactionEvent {
    pub timestamp: SystemTime,
    pub transaction: CryptoHash,
}

/// A milestone candidate was seen among the solid transactions.
pub struct ReceiveMilestoneEvent {
    pub timestamp: SystemTime,
    pub index: MilestoneIndex,
    pub milestone: CryptoHash,
}

/// The ledger delta of a milestone was committed to the snapshot.
pub struct CommitMilestoneEvent {
    pub timestamp: SystemTime,
    pub index: MilestoneIndex,
    pub milestone: CryptoHash,
    pub confirmed_transactions: usize,
}

/// A milestone failed signature verification or ledger validation.
pub struct RejectMilestoneEvent {
    pub timestamp: SystemTime,
    pub index: MilestoneIndex,
    pub milestone: CryptoHash,
    /// The [`retcode`](crate::errors::ConsensusError::retcode) of the error the milestone was rejected
    /// with.
    pub retcode: u16,
}

pub struct RevertMilestoneEvent {
    pub timestamp: SystemTime,
    pub index: MilestoneIndex,
}

/// More milestones are waiting for a predecessor than the milestone buffer can hold.
pub struct MilestoneGapEvent {
    pub timestamp: SystemTime,
    pub latest_solid_index: MilestoneIndex,
    pub buffered: usize,
}

pub struct SelectTipsEvent {
    pub timestamp: SystemTime,
    pub tips: Vec<CryptoHash>,
    pub attempts: u32,
}

pub struct StartWorkerEvent {
    pub timestamp: SystemTime,
    pub worker: &'static str,
}

pub struct StopWorkerEvent {
    pub timestamp: SystemTime,
    pub worker: &'static str,
}
