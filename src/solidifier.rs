/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The worker that makes transactions solid.
//!
//! A transaction is solid once its whole past cone is stored. Transactions arrive in any order, so a
//! newly received transaction may reference parents that have not arrived yet. For each arrival, the
//! solidifier walks the stored part of the transaction's past cone with an explicit stack:
//! - A parent that is already solid ends that branch of the walk.
//! - A parent that is not stored is requested through the
//!   [`TransactionRequester`](crate::requester::TransactionRequester), which keeps at most one request
//!   per hash outstanding, and ends that branch of the walk. The transaction stays non-solid.
//!
//! While idle, the solidifier evicts stale tips and issues again the requests that went unanswered
//! for longer than [`request_retry_interval`](crate::config::Configuration::request_retry_interval).
//!
//! If no parent was missing, every transaction visited is marked solid in one write. Solidity then
//! cascades: every approver of a newly solid transaction whose parents are now both solid becomes
//! solid too. This is how a transaction waiting on a requested parent becomes solid once the parent
//! arrives.
//!
//! For every newly solid transaction, the solidifier also:
//! - Updates the [tips cache](crate::tips_cache): the parents stop being tips, and the transaction
//!   becomes one if nothing approves it yet and it is not a milestone.
//! - Forwards milestone candidates to the [milestone tracker](crate::milestone_tracker).

use std::{
    collections::{HashSet, VecDeque},
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, SystemTime},
};

use crate::{
    config::Configuration,
    errors::ConsensusError,
    events::{Event, SolidifyTransactionEvent},
    lifecycle::{check_shutdown, Signal},
    requester::{Requester, TransactionRequester},
    tangle::{pluggables::KVStore, Tangle},
    tips_cache::TipsCache,
    types::{
        data_types::{Address, CryptoHash},
        milestone::Milestone,
        transaction::Transaction,
    },
};

pub struct Solidifier<K: KVStore, R: Requester> {
    tangle: Tangle<K>,
    requester: TransactionRequester<R>,
    tips: TipsCache,
    coordinator_address: Address,
    arrivals: Receiver<CryptoHash>,
    milestone_candidates: Sender<CryptoHash>,
    poll_interval: Duration,
    tip_retention: Duration,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore, R: Requester> Solidifier<K, R> {
    pub fn new(
        tangle: Tangle<K>,
        requester: TransactionRequester<R>,
        tips: TipsCache,
        configuration: &Configuration,
        arrivals: Receiver<CryptoHash>,
        milestone_candidates: Sender<CryptoHash>,
        event_publisher: Option<Sender<Event>>,
    ) -> Solidifier<K, R> {
        Solidifier {
            tangle,
            requester,
            tips,
            coordinator_address: configuration.coordinator_address,
            arrivals,
            milestone_candidates,
            poll_interval: configuration.worker_poll_interval,
            tip_retention: configuration.tip_retention,
            event_publisher,
        }
    }

    /// Try to make the transaction `hash` solid, requesting missing ancestors.
    ///
    /// Returns whether `hash` is solid afterwards.
    pub fn solidify(&mut self, hash: &CryptoHash) -> Result<bool, ConsensusError> {
        if self.tangle.is_solid(hash) {
            return Ok(true);
        }

        let mut visited: HashSet<CryptoHash> = HashSet::new();
        let mut stack = vec![*hash];
        let mut newly_solid: Vec<Transaction> = Vec::new();
        let mut complete = true;
        while let Some(current) = stack.pop() {
            if !visited.insert(current) || self.tangle.is_solid(&current) {
                continue;
            }
            match self.tangle.get_transaction(&current)? {
                Some(transaction) => {
                    stack.extend(transaction.parents());
                    newly_solid.push(transaction);
                }
                None => {
                    complete = false;
                    if self.requester.request(current) {
                        log::debug!("requested missing transaction {}", current);
                    }
                }
            }
        }
        if !complete {
            return Ok(false);
        }

        self.mark_solid(newly_solid)?;
        Ok(true)
    }

    /// Mark `transactions` solid, then cascade to their approvers.
    fn mark_solid(&mut self, transactions: Vec<Transaction>) -> Result<(), ConsensusError> {
        let mut queue: VecDeque<Vec<Transaction>> = VecDeque::from([transactions]);
        while let Some(batch) = queue.pop_front() {
            let hashes: Vec<CryptoHash> = batch.iter().map(|transaction| transaction.hash).collect();
            self.tangle.set_solid(&hashes);

            let mut next_batch = Vec::new();
            let mut queued: HashSet<CryptoHash> = HashSet::new();
            for transaction in &batch {
                self.on_solid(transaction)?;
                for approver in self.tangle.get_approvers(&transaction.hash)? {
                    if queued.contains(&approver) || self.tangle.is_solid(&approver) {
                        continue;
                    }
                    if let Some(approver) = self.tangle.get_transaction(&approver)? {
                        if approver
                            .parents()
                            .iter()
                            .all(|parent| self.tangle.is_solid(parent))
                        {
                            queued.insert(approver.hash);
                            next_batch.push(approver);
                        }
                    }
                }
            }
            if !next_batch.is_empty() {
                queue.push_back(next_batch);
            }
        }
        Ok(())
    }

    fn on_solid(&self, transaction: &Transaction) -> Result<(), ConsensusError> {
        Event::publish(
            &self.event_publisher,
            Event::SolidifyTransaction(SolidifyTransactionEvent {
                timestamp: SystemTime::now(),
                transaction: transaction.hash,
            }),
        );

        for parent in transaction.parents() {
            self.tips.remove(&parent);
        }
        if Milestone::candidate(transaction, &self.coordinator_address).is_some() {
            // The tracker outlives the solidifier while the engine runs.
            let _ = self.milestone_candidates.send(transaction.hash);
        } else if self.tangle.get_approvers(&transaction.hash)?.is_empty() {
            self.tips.add(transaction.hash);
        }
        Ok(())
    }

    /// Solidify arrivals until `shutdown_signal` fires.
    pub(crate) fn run(mut self, shutdown_signal: Receiver<()>) -> Self {
        loop {
            if let Signal::Shutdown = check_shutdown(&shutdown_signal) {
                return self;
            }

            match self.arrivals.recv_timeout(self.poll_interval) {
                Ok(hash) => {
                    if let Err(err) = self.solidify(&hash) {
                        log::error!("failed to solidify {}: {}", hash, err);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let evicted = self.tips.evict_stale(self.tip_retention);
                    if evicted > 0 {
                        log::debug!("evicted {} stale tips", evicted);
                    }
                    let retried = self.requester.retry_expired();
                    if retried > 0 {
                        log::debug!("requested {} missing transactions again", retried);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll_interval),
            }
        }
    }
}
