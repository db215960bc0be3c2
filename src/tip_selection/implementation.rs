/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`TipSelector`] and the requests it serves.

use std::{
    sync::mpsc::Sender,
    time::{Instant, SystemTime},
};

use typed_builder::TypedBuilder;

use crate::{
    config::{Configuration, EpRandomizerImplementation, TipPairFallback},
    cw_rating::{self, CwRatings, TraversalLimits},
    errors::ConsensusError,
    events::{Event, SelectTipsEvent},
    ledger_validator::tips_consistent,
    snapshot::{Snapshot, SnapshotHandle},
    tangle::{pluggables::KVStore, Tangle},
    types::data_types::CryptoHash,
};

use super::{
    entry_point, randomizer,
    walk_validator::{BelowMaxDepthMemo, WalkValidator},
};

/// Parameters of one call to [`TipSelector::select_tips`].
///
/// ```ignore
/// let request = TipSelectionRequest::builder()
///     .count(2)
///     .reference(reference)
///     .deadline(Instant::now() + Duration::from_secs(1))
///     .build();
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct TipSelectionRequest {
    /// Number of tips to return: 1 or 2.
    pub count: usize,

    /// A transaction that must be one of the returned tips. It goes through the same checks as any
    /// walk step and fails the request with
    /// [`ReferenceTooOld`](ConsensusError::ReferenceTooOld) if it does not pass them.
    #[builder(default, setter(strip_option))]
    pub reference: Option<CryptoHash>,

    /// How many milestones behind the latest solid milestone walks start. Capped at `max_depth`.
    #[builder(default, setter(strip_option))]
    pub depth: Option<u64>,

    #[builder(default, setter(strip_option))]
    pub deadline: Option<Instant>,
}

/// Orchestrates entry point selection, rating, and walks. Clones share the same state.
#[derive(Clone)]
pub struct TipSelector<K: KVStore> {
    tangle: Tangle<K>,
    snapshot: SnapshotHandle,
    configuration: Configuration,
    below_max_depth: BelowMaxDepthMemo,
    event_publisher: Option<Sender<Event>>,
}

impl<K: KVStore> TipSelector<K> {
    pub fn new(
        tangle: Tangle<K>,
        snapshot: SnapshotHandle,
        configuration: Configuration,
        event_publisher: Option<Sender<Event>>,
    ) -> TipSelector<K> {
        let below_max_depth = BelowMaxDepthMemo::new(configuration.below_max_depth_cache_size);
        TipSelector {
            tangle,
            snapshot,
            configuration,
            below_max_depth,
            event_publisher,
        }
    }

    /// Select `request.count` tips that are consistent with each other and with the ledger.
    pub fn select_tips(&self, request: &TipSelectionRequest) -> Result<Vec<CryptoHash>, ConsensusError> {
        if request.count != 1 && request.count != 2 {
            return Err(ConsensusError::InvalidTipCount {
                count: request.count,
            });
        }

        // Walks must see one snapshot throughout, so milestones wait until the selection is done.
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let depth = request
            .depth
            .unwrap_or(self.configuration.max_depth)
            .min(self.configuration.max_depth);
        let mut ratings = self.rate(&snapshot, depth, request.deadline)?;

        let mut tips = Vec::with_capacity(request.count);
        match request.reference {
            Some(reference) => {
                if !self.validator(&snapshot).is_valid(&reference)? {
                    return Err(ConsensusError::ReferenceTooOld {
                        transaction: reference,
                    });
                }
                tips.push(reference);
            }
            None => tips.push(self.walk(&snapshot, &ratings, request.deadline)?),
        }

        let mut attempts = 1;
        if request.count == 2 {
            let first = tips[0];
            let mut second = None;
            for attempt in 0..=self.configuration.tip_selection_max_retries {
                attempts = attempt + 1;
                if attempt > 0 {
                    // Retry from a fresh entry point, rating what arrived since the last attempt.
                    ratings = self.rate(&snapshot, depth, request.deadline)?;
                }
                let candidate = self.walk(&snapshot, &ratings, request.deadline)?;
                if tips_consistent(
                    &self.tangle,
                    &snapshot,
                    &[first, candidate],
                    self.configuration.security_level,
                    self.configuration.milestone_start_index,
                )? {
                    second = Some(candidate);
                    break;
                }
                log::debug!(
                    "tips {} and {} are inconsistent (attempt {})",
                    first,
                    candidate,
                    attempts
                );
            }

            match (second, self.configuration.tip_pair_fallback) {
                (Some(second), _) => tips.push(second),
                (None, TipPairFallback::SingleTip) => {
                    log::warn!("no tip consistent with {} found, using it twice", first);
                    tips.push(first)
                }
                (None, TipPairFallback::Fail) => return Err(ConsensusError::TipsInconsistent),
            }
        }

        Event::publish(
            &self.event_publisher,
            Event::SelectTips(SelectTipsEvent {
                timestamp: SystemTime::now(),
                tips: tips.clone(),
                attempts,
            }),
        );

        Ok(tips)
    }

    /// Select an entry point `depth` milestones back and rate the sub-tangle that approves it.
    fn rate(
        &self,
        snapshot: &Snapshot,
        depth: u64,
        deadline: Option<Instant>,
    ) -> Result<CwRatings, ConsensusError> {
        let entry_point = entry_point::select(
            &self.tangle,
            snapshot,
            depth,
            self.configuration.milestone_start_index,
        )
        .map_err(|err| ConsensusError::TipSelectorInvalidEntryPoint {
            source: Box::new(err),
        })?;

        cw_rating::calculate(
            &self.tangle,
            &entry_point,
            self.configuration.cw_calculation,
            TraversalLimits {
                max_depth: self.configuration.cw_max_traversal_depth,
                max_nodes: self.configuration.cw_max_traversal_nodes,
            },
            deadline,
        )
    }

    fn validator<'a>(&'a self, snapshot: &'a Snapshot) -> WalkValidator<'a, K> {
        WalkValidator::new(
            &self.tangle,
            snapshot,
            &self.below_max_depth,
            self.configuration.security_level,
            self.configuration.max_depth,
            self.configuration.below_max_depth_cache_size,
            self.configuration.milestone_start_index,
        )
    }

    fn walk(
        &self,
        snapshot: &Snapshot,
        ratings: &CwRatings,
        deadline: Option<Instant>,
    ) -> Result<CryptoHash, ConsensusError> {
        let mut validator = self.validator(snapshot);
        let mut rng = rand::thread_rng();
        match self.configuration.ep_randomizer {
            EpRandomizerImplementation::RandomWalk => randomizer::random_walk(
                &self.tangle,
                ratings,
                &mut validator,
                self.configuration.alpha,
                &mut rng,
                deadline,
            ),
            EpRandomizerImplementation::RandomizeSample => randomizer::randomize_sample(
                &self.tangle,
                ratings,
                &mut validator,
                self.configuration.alpha,
                &mut rng,
                deadline,
            ),
        }
    }
}
