// Consensus-critical. Changes require a network upgrade + tests.
//! Contextual validation and block acceptance.
//!
//! Checks that need the chain (expected difficulty, median-time-past, the
//! stake-era work rule) live here. Self-contained checks stay on the core
//! types.

use kestrel_core::{Block, BlockHeader, PROTOCOL_VERSION};
use kestrel_state::{match_merkle_root, BlockStore, SupplyLedger};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::chain::{ChainIndex, ChainView, NodeId, MEDIAN_TIME_SPAN};
use crate::error::ConsensusError;
use crate::params::ConsensusParams;
use crate::penalty::check_proof_of_stake_work;
use crate::pow::{check_proof_of_work, pow_hash};
use crate::retarget::get_next_work_required;

/// How far a header timestamp may run ahead of local time.
pub const MAX_FUTURE_DRIFT_SECS: u64 = 2 * 60 * 60;

/// Current Unix time in seconds.
pub fn now_unix() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

/// Validate a header against its parent in `index`.
///
/// Checks version, expected `bits`, timestamp above median-time-past and the
/// future-drift bound relative to `now`. Proof-of-work is checked separately.
pub fn check_header_contextual(
    index: &ChainIndex,
    header: &BlockHeader,
    params: &ConsensusParams,
    now: u64,
) -> Result<(), ConsensusError> {
    if header.version != PROTOCOL_VERSION {
        return Err(ConsensusError::InvalidHeader("unsupported header version"));
    }

    // Timestamp must be non-zero.
    if header.timestamp == 0 {
        return Err(ConsensusError::InvalidHeader("timestamp must be non-zero"));
    }

    let parent = if header.prev.is_zero() && index.is_empty() {
        None
    } else {
        Some(
            index
                .lookup(&header.prev)
                .ok_or(ConsensusError::UnknownParent(header.prev))?,
        )
    };

    let expected = get_next_work_required(index, parent, header, params);
    if header.bits != expected {
        return Err(ConsensusError::BadDifficultyBits {
            expected,
            got: header.bits,
        });
    }

    // Genesis is permitted to have an arbitrary fixed timestamp; skip MTP/drift.
    if let Some(parent) = parent {
        if header.timestamp <= index.node(parent).median_time_past {
            return Err(ConsensusError::InvalidHeader("timestamp below MTP"));
        }
        if header.timestamp > now
            && !is_timestamp_within_drift(header.timestamp, now, MAX_FUTURE_DRIFT_SECS)
        {
            return Err(ConsensusError::InvalidHeader(
                "timestamp too far from local time",
            ));
        }
    }

    Ok(())
}

/// Work rule for an indexed block: plain PoW before the fork, PoW with the
/// missing-helper penalty after.
pub fn check_block_work(view: &ChainView<'_>, id: NodeId, params: &ConsensusParams) -> bool {
    let node = view.node(id);
    if view.fork_active(node.prev, params) {
        check_proof_of_stake_work(view, id, params)
    } else {
        check_proof_of_work(&node.hash, node.bits, params)
    }
}

/// Validate `block` and add it to `index`.
///
/// A block that fails the work rule is removed from the index again.
pub fn accept_block(
    index: &mut ChainIndex,
    blocks: &dyn BlockStore,
    supply: &dyn SupplyLedger,
    block: Block,
    params: &ConsensusParams,
    now: u64,
) -> Result<NodeId, ConsensusError> {
    block
        .validate_sanity()
        .map_err(|_| ConsensusError::InvalidHeader("block sanity failed"))?;
    if !match_merkle_root(&block, &block.header.merkle_root) {
        return Err(ConsensusError::InvalidHeader("merkle root mismatch"));
    }
    check_header_contextual(index, &block.header, params, now)?;

    let known = pow_hash(&block.header)?;
    if let Some(id) = index.lookup(&known) {
        return Ok(id);
    }

    let id = index.insert_block(block)?;
    let view = ChainView::new(index, blocks, supply);
    if !check_block_work(&view, id, params) {
        let height = index.node(id).height;
        warn!(height, "block failed work check");
        index.discard_last(id);
        return Err(ConsensusError::InsufficientPoW);
    }

    debug!(height = index.node(id).height, "accepted block");
    Ok(id)
}

/// [`accept_block`] against the local wall clock.
pub fn accept_block_now(
    index: &mut ChainIndex,
    blocks: &dyn BlockStore,
    supply: &dyn SupplyLedger,
    block: Block,
    params: &ConsensusParams,
) -> Result<NodeId, ConsensusError> {
    accept_block(index, blocks, supply, block, params, now_unix())
}

/// Check if a candidate timestamp is within an absolute drift window.
pub fn is_timestamp_within_drift(candidate: u64, reference: u64, max_drift_secs: u64) -> bool {
    let delta = if candidate >= reference {
        candidate - reference
    } else {
        reference - candidate
    };
    delta <= max_drift_secs
}

/// Compute Median-Time-Past over the last up-to-11 timestamps.
pub fn median_time_past(timestamps: &[u64]) -> Option<u64> {
    if timestamps.is_empty() {
        return None;
    }
    let start = timestamps.len().saturating_sub(MEDIAN_TIME_SPAN);
    let mut buf: Vec<u64> = timestamps[start..].to_vec();
    buf.sort_unstable();
    let mid = buf.len() / 2;
    Some(buf[mid])
}
