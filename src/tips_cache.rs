/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The current frontier of solid, non-milestone transactions without known approvers.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::types::data_types::CryptoHash;

/// Bounded set of tips, each stamped with the time it was added. Clones share the same set.
#[derive(Clone)]
pub struct TipsCache {
    tips: Arc<Mutex<HashMap<CryptoHash, Instant>>>,
    capacity: usize,
}

impl TipsCache {
    pub fn new(capacity: usize) -> TipsCache {
        TipsCache {
            tips: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CryptoHash, Instant>> {
        self.tips
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add `hash`, evicting the oldest tip if the cache is full.
    pub fn add(&self, hash: CryptoHash) {
        if self.capacity == 0 {
            return;
        }
        let mut tips = self.lock();
        if !tips.contains_key(&hash) && tips.len() >= self.capacity {
            let oldest = tips
                .iter()
                .min_by_key(|(_, added)| **added)
                .map(|(hash, _)| *hash);
            if let Some(oldest) = oldest {
                tips.remove(&oldest);
            }
        }
        tips.insert(hash, Instant::now());
    }

    /// Remove `hash`, e.g., because it gained an approver.
    pub fn remove(&self, hash: &CryptoHash) -> bool {
        self.lock().remove(hash).is_some()
    }

    /// Remove every tip added more than `retention` ago. Returns the number of tips removed.
    pub fn evict_stale(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut tips = self.lock();
        let before = tips.len();
        tips.retain(|_, added| now.duration_since(*added) <= retention);
        before - tips.len()
    }

    pub fn contains(&self, hash: &CryptoHash) -> bool {
        self.lock().contains_key(hash)
    }

    pub fn tips(&self) -> Vec<CryptoHash> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
