/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Exit probability randomizers: turn cumulative weights into a tip.
//!
//! Both randomizers move between bundle tails. From a tail `t`, the candidate next steps are the tails
//! of the bundles that contain a direct approver of `t`. A candidate `c` is chosen with probability
//! proportional to `exp(alpha * (CW(c) - CW(t)))`, normalized over the candidates that pass the
//! [walk validator](super::walk_validator). With `alpha = 0` every candidate is equally likely.
//!
//! [`RandomWalk`](crate::config::EpRandomizerImplementation::RandomWalk) performs one such walk.
//! [`RandomizeSample`](crate::config::EpRandomizerImplementation::RandomizeSample) propagates the whole
//! probability mass of the entry point through the rated sub-tangle in topological order, and samples
//! a tip from the resulting exit probabilities.

use std::{collections::HashMap, time::Instant};

use rand::Rng;

use crate::{
    cw_rating::CwRatings,
    errors::ConsensusError,
    tangle::{pluggables::KVStore, Tangle},
    types::data_types::CryptoHash,
};

use super::walk_validator::WalkValidator;

/// Walk from the entry point of `ratings` to a tip.
pub(crate) fn random_walk<K: KVStore, R: Rng>(
    tangle: &Tangle<K>,
    ratings: &CwRatings,
    validator: &mut WalkValidator<'_, K>,
    alpha: f64,
    rng: &mut R,
    deadline: Option<Instant>,
) -> Result<CryptoHash, ConsensusError> {
    let mut current = *ratings.entry_point();
    // Every step moves to a transaction that comes later in the topological order.
    for _ in 0..=ratings.len() {
        check_deadline(deadline)?;

        let mut candidates = approving_tails(tangle, ratings, &current)?;
        let next = loop {
            if candidates.is_empty() {
                break None;
            }
            let weights = transition_weights(ratings, &current, &candidates, alpha)?;
            let chosen = sample(&weights, rng);
            let candidate = candidates.swap_remove(chosen);
            if validator.is_valid(&candidate)? {
                break Some(candidate);
            }
        };

        match next {
            Some(next) => current = next,
            None if tangle.is_solid(&current) => return Ok(current),
            None => return Err(ConsensusError::InconsistentWalk { transaction: current }),
        }
    }

    Err(ConsensusError::InconsistentWalk { transaction: current })
}

/// Compute the exit probabilities of the rated sub-tangle, then sample a tip from them.
pub(crate) fn randomize_sample<K: KVStore, R: Rng>(
    tangle: &Tangle<K>,
    ratings: &CwRatings,
    validator: &mut WalkValidator<'_, K>,
    alpha: f64,
    rng: &mut R,
    deadline: Option<Instant>,
) -> Result<CryptoHash, ConsensusError> {
    let entry_point = *ratings.entry_point();
    let mut mass: HashMap<CryptoHash, f64> = HashMap::from([(entry_point, 1.0)]);
    let mut exits: Vec<(CryptoHash, f64)> = Vec::new();
    let mut validity: HashMap<CryptoHash, bool> = HashMap::new();

    for hash in ratings.topological_order() {
        check_deadline(deadline)?;
        let probability = match mass.remove(hash) {
            Some(probability) if probability > 0.0 => probability,
            _ => continue,
        };

        let mut candidates = Vec::new();
        for candidate in approving_tails(tangle, ratings, hash)? {
            let valid = match validity.get(&candidate) {
                Some(valid) => *valid,
                None => {
                    let valid = validator.is_valid_in_isolation(&candidate)?;
                    validity.insert(candidate, valid);
                    valid
                }
            };
            if valid {
                candidates.push(candidate);
            }
        }

        if candidates.is_empty() {
            exits.push((*hash, probability));
            continue;
        }
        let weights = transition_weights(ratings, hash, &candidates, alpha)?;
        let total: f64 = weights.iter().sum();
        for (candidate, weight) in candidates.into_iter().zip(weights) {
            *mass.entry(candidate).or_insert(0.0) += probability * weight / total;
        }
    }

    // The sampled tip must also be consistent with the cones of the whole walk.
    while !exits.is_empty() {
        let weights: Vec<f64> = exits.iter().map(|(_, probability)| *probability).collect();
        let (tip, _) = exits.swap_remove(sample(&weights, rng));
        if tip == entry_point || validator.is_valid(&tip)? {
            return Ok(tip);
        }
    }

    if tangle.is_solid(&entry_point) {
        Ok(entry_point)
    } else {
        Err(ConsensusError::InconsistentWalk {
            transaction: entry_point,
        })
    }
}

/// The tails of the bundles that approve `hash`, deduplicated.
///
/// Tails are found through the live tangle, so a tail that arrived after the ratings were computed
/// has no rating. It is left out of this walk.
fn approving_tails<K: KVStore>(
    tangle: &Tangle<K>,
    ratings: &CwRatings,
    hash: &CryptoHash,
) -> Result<Vec<CryptoHash>, ConsensusError> {
    let mut tails = Vec::new();
    for approver in ratings.approvers(hash) {
        if let Some(tail) = tangle.find_tail(approver)? {
            if tail == *hash || tails.contains(&tail) {
                continue;
            }
            if !ratings.contains(&tail) {
                log::debug!("skipping {}: arrived after rating", tail);
                continue;
            }
            tails.push(tail);
        }
    }
    Ok(tails)
}

/// Unnormalized transition weights `exp(alpha * (CW(candidate) - CW(current)))`.
///
/// Exponents are shifted so that the heaviest candidate gets weight 1.
fn transition_weights(
    ratings: &CwRatings,
    current: &CryptoHash,
    candidates: &[CryptoHash],
    alpha: f64,
) -> Result<Vec<f64>, ConsensusError> {
    let current_weight = ratings
        .weight(current)
        .ok_or(ConsensusError::MissingRating {
            transaction: *current,
        })?;
    let relative_weights = candidates
        .iter()
        .map(|candidate| {
            ratings
                .weight(candidate)
                .map(|weight| weight as f64 - current_weight as f64)
                .ok_or(ConsensusError::MissingRating {
                    transaction: *candidate,
                })
        })
        .collect::<Result<Vec<f64>, ConsensusError>>()?;
    let max = relative_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    Ok(relative_weights
        .into_iter()
        .map(|relative_weight| (alpha * (relative_weight - max)).exp())
        .collect())
}

/// Sample an index of `weights` with probability proportional to its weight.
fn sample<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return rng.gen_range(0, weights.len());
    }
    let mut target = rng.gen::<f64>() * total;
    for (index, weight) in weights.iter().enumerate() {
        if target < *weight {
            return index;
        }
        target -= weight;
    }
    weights.len() - 1
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), ConsensusError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(ConsensusError::Timeout),
        _ => Ok(()),
    }
}
