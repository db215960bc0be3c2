/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The worker that turns solid milestone transactions into ledger commits.
//!
//! The [solidifier](crate::solidifier) forwards every newly solid transaction sent from the coordinator
//! address. For each one, the tracker:
//! 1. Reads the milestone index from the transaction (**Seen**).
//! 2. Checks the coordinator's signature (**SignatureVerified**), rejecting the milestone otherwise.
//! 3. Records the milestone in the tangle and buffers it by index (**AwaitingPredecessor**). A
//!    milestone that is already solid, or that does not fit in the buffer, is not recorded.
//! 4. Hands buffered milestones to the [ledger validator](crate::ledger_validator) strictly in index
//!    order, starting at the successor of the latest solid milestone, until the next index is missing
//!    (**Committed** or **Rejected**).
//!
//! The buffer holds at most
//! [`milestone_buffer_capacity`](crate::config::Configuration::milestone_buffer_capacity) milestones.
//! A milestone that does not fit is dropped and reported as
//! [`MilestoneGapTooLarge`](ConsensusError::MilestoneGapTooLarge), since the gap below it cannot be
//! closed by waiting.

use std::{
    collections::BTreeMap,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, SystemTime},
};

use crate::{
    config::Configuration,
    errors::ConsensusError,
    events::{Event, MilestoneGapEvent, ReceiveMilestoneEvent, RejectMilestoneEvent},
    ledger_validator::LedgerValidator,
    lifecycle::{check_shutdown, Signal},
    tangle::{pluggables::KVStore, Tangle},
    types::{
        crypto_primitives::VerifyingKey,
        data_types::{Address, CryptoHash, MilestoneIndex},
        milestone::Milestone,
    },
};

pub struct MilestoneTracker<K: KVStore> {
    tangle: Tangle<K>,
    ledger_validator: LedgerValidator<K>,
    coordinator_address: Address,
    coordinator_public_keys: Vec<VerifyingKey>,
    buffer: BTreeMap<MilestoneIndex, Milestone>,
    buffer_capacity: usize,
    candidates: Receiver<CryptoHash>,
    poll_interval: Duration,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> MilestoneTracker<K> {
    pub fn new(
        tangle: Tangle<K>,
        ledger_validator: LedgerValidator<K>,
        configuration: &Configuration,
        candidates: Receiver<CryptoHash>,
        event_publisher: Option<Sender<Event>>,
    ) -> MilestoneTracker<K> {
        MilestoneTracker {
            tangle,
            ledger_validator,
            coordinator_address: configuration.coordinator_address,
            coordinator_public_keys: configuration.coordinator_public_keys.clone(),
            buffer: BTreeMap::new(),
            buffer_capacity: configuration.milestone_buffer_capacity,
            candidates,
            poll_interval: configuration.worker_poll_interval,
            event_publisher,
        }
    }

    /// Process the solid transaction `hash` if it is a milestone candidate.
    ///
    /// Returns the latest solid milestone index after every buffered milestone that could be
    /// committed has been committed.
    pub fn track(&mut self, hash: &CryptoHash) -> Result<MilestoneIndex, ConsensusError> {
        let transaction = match self.tangle.get_transaction(hash)? {
            Some(transaction) => transaction,
            None => return Ok(self.ledger_validator.latest_solid_milestone_index()),
        };
        let milestone = match Milestone::candidate(&transaction, &self.coordinator_address) {
            Some(milestone) => milestone,
            None => return Ok(self.ledger_validator.latest_solid_milestone_index()),
        };

        Event::publish(
            &self.event_publisher,
            Event::ReceiveMilestone(ReceiveMilestoneEvent {
                timestamp: SystemTime::now(),
                index: milestone.index,
                milestone: milestone.hash,
            }),
        );

        if !milestone.verify(&transaction, &self.coordinator_public_keys) {
            let err = ConsensusError::InvalidMilestoneSignature {
                milestone: milestone.hash,
            };
            self.reject(&milestone, &err);
            return Err(err);
        }

        let latest_solid_index = self.ledger_validator.latest_solid_milestone_index();
        if milestone.index <= latest_solid_index {
            log::debug!("milestone {} is already solid", milestone.index);
            return Ok(latest_solid_index);
        }
        if milestone.index != latest_solid_index + 1
            && !self.buffer.contains_key(&milestone.index)
            && self.buffer.len() >= self.buffer_capacity
        {
            Event::publish(
                &self.event_publisher,
                Event::MilestoneGap(MilestoneGapEvent {
                    timestamp: SystemTime::now(),
                    latest_solid_index,
                    buffered: self.buffer.len(),
                }),
            );
            return Err(ConsensusError::MilestoneGapTooLarge {
                latest_solid_index,
                buffered: self.buffer.len(),
            });
        }
        // Only a milestone that will be committed or buffered is recorded.
        self.tangle.put_milestone(milestone.index, &milestone.hash)?;
        self.buffer.insert(milestone.index, milestone);

        self.commit_buffered()
    }

    /// Validate buffered milestones in index order for as long as the successor of the latest solid
    /// milestone is buffered.
    fn commit_buffered(&mut self) -> Result<MilestoneIndex, ConsensusError> {
        loop {
            let latest_solid_index = self.ledger_validator.latest_solid_milestone_index();
            let next_index = latest_solid_index + 1;
            self.buffer = self.buffer.split_off(&next_index);

            let milestone = match self.buffer.remove(&next_index) {
                Some(milestone) => milestone,
                None => return Ok(latest_solid_index),
            };
            if let Err(err) = self.ledger_validator.validate_milestone(&milestone) {
                self.reject(&milestone, &err);
                return Err(err);
            }
            log::debug!("milestone {} is now the latest solid milestone", milestone.index);
        }
    }

    fn reject(&self, milestone: &Milestone, err: &ConsensusError) {
        log::warn!("rejected milestone {} ({}): {}", milestone.index, milestone.hash, err);
        Event::publish(
            &self.event_publisher,
            Event::RejectMilestone(RejectMilestoneEvent {
                timestamp: SystemTime::now(),
                index: milestone.index,
                milestone: milestone.hash,
                retcode: err.retcode(),
            }),
        );
    }

    /// Number of milestones waiting for their predecessor.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Track candidates forwarded by the solidifier until `shutdown_signal` fires.
    pub(crate) fn run(mut self, shutdown_signal: Receiver<()>) -> Self {
        loop {
            if let Signal::Shutdown = check_shutdown(&shutdown_signal) {
                return self;
            }

            match self.candidates.recv_timeout(self.poll_interval) {
                Ok(hash) => {
                    if let Err(err) = self.track(&hash) {
                        if err.is_fatal() {
                            log::error!("milestone tracking failed: {}", err);
                        } else {
                            log::warn!("milestone tracking failed: {}", err);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll_interval),
            }
        }
    }
}
