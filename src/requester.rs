/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Requests for transactions that are referenced but not stored locally.
//!
//! The engine does not talk to peers itself. The library user provides a [`Requester`] that asks the
//! network for a transaction by hash; the response, if any, comes back through
//! [`Consensus::receive_transaction`](crate::consensus::Consensus::receive_transaction).

use std::{
    collections::HashMap,
    sync::{mpsc::Sender, Arc, Mutex, MutexGuard},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    events::{Event, RequestTransactionEvent},
    types::data_types::CryptoHash,
};

/// Asks peers for a missing transaction. Must be idempotent and must not block.
pub trait Requester: Clone + Send + 'static {
    fn request(&mut self, hash: CryptoHash);
}

/// Wraps a [`Requester`] so that at most one request per hash is outstanding at any time.
///
/// A request that has not been answered within `retry_interval` is considered lost and may be issued
/// again, either by the next [`request`](Self::request) for the same hash or by
/// [`retry_expired`](Self::retry_expired). Clones share the same set of outstanding requests.
#[derive(Clone)]
pub struct TransactionRequester<R: Requester> {
    requester: R,
    pending: Arc<Mutex<HashMap<CryptoHash, Instant>>>,
    retry_interval: Duration,
    event_publisher: Option<Sender<Event>>,
}

impl<R: Requester> TransactionRequester<R> {
    pub fn new(
        requester: R,
        retry_interval: Duration,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            requester,
            pending: Arc::new(Mutex::new(HashMap::new())),
            retry_interval,
            event_publisher,
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<CryptoHash, Instant>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Request `hash` unless a request for it is already outstanding and has not expired.
    ///
    /// Returns whether a request was issued.
    pub fn request(&mut self, hash: CryptoHash) -> bool {
        if hash.is_null() {
            return false;
        }
        let issue = {
            let mut pending = self.pending();
            match pending.get(&hash) {
                Some(requested_at) if requested_at.elapsed() < self.retry_interval => false,
                _ => {
                    pending.insert(hash, Instant::now());
                    true
                }
            }
        };
        if issue {
            self.issue(hash);
        }
        issue
    }

    /// Issue again every outstanding request older than the retry interval. Returns how many were
    /// issued.
    pub fn retry_expired(&mut self) -> usize {
        let expired: Vec<CryptoHash> = {
            let mut pending = self.pending();
            let now = Instant::now();
            pending
                .iter_mut()
                .filter(|(_, requested_at)| now.duration_since(**requested_at) >= self.retry_interval)
                .map(|(hash, requested_at)| {
                    *requested_at = now;
                    *hash
                })
                .collect()
        };
        for hash in &expired {
            log::debug!("request for {} expired, requesting again", hash);
            self.issue(*hash);
        }
        expired.len()
    }

    fn issue(&mut self, hash: CryptoHash) {
        self.requester.request(hash);
        Event::publish(
            &self.event_publisher,
            Event::RequestTransaction(RequestTransactionEvent {
                timestamp: SystemTime::now(),
                transaction: hash,
            }),
        );
    }

    /// Forget the outstanding request for `hash`, if any, because it has arrived.
    pub fn mark_received(&self, hash: &CryptoHash) {
        self.pending().remove(hash);
    }

    pub fn is_pending(&self, hash: &CryptoHash) -> bool {
        self.pending().contains_key(hash)
    }
}
