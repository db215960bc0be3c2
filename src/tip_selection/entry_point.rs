/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Selection of the transaction random walks start from.

use crate::{
    errors::ConsensusError,
    snapshot::Snapshot,
    tangle::{pluggables::KVStore, Tangle},
    types::data_types::{CryptoHash, MilestoneIndex},
};

/// Select the entry point for walks that may reach at most `depth` milestones behind the latest solid
/// milestone of `snapshot`.
///
/// The entry point is the stored milestone with the smallest index in
/// `[latest_solid_index - depth, latest_solid_index]`, never below `milestone_start_index`. With
/// `depth == 0` this is the latest solid milestone itself.
pub(crate) fn select<K: KVStore>(
    tangle: &Tangle<K>,
    snapshot: &Snapshot,
    depth: u64,
    milestone_start_index: MilestoneIndex,
) -> Result<CryptoHash, ConsensusError> {
    let latest_solid_index = snapshot.milestone_index();
    let mut index = latest_solid_index
        .saturating_sub(depth)
        .max(milestone_start_index);

    while index <= latest_solid_index {
        if let Some(milestone) = tangle.milestone_at(index)? {
            log::debug!(
                "entry point is milestone {} (latest solid milestone is {})",
                index,
                latest_solid_index
            );
            return Ok(milestone);
        }
        index += 1;
    }

    Err(ConsensusError::NoEntryPoint)
}
