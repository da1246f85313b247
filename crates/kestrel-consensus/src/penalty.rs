// Consensus-critical. Changes require a network upgrade + tests.
//! Missing-helper difficulty penalty.
//!
//! Each run of consecutive blocks without a valid helper makes the next block
//! harder to mine. The penalty is phased in over the first 6048 blocks after
//! the fork: initially every 8 missing helpers halve the target, finally
//! every single one does.

use num_traits::Zero;
use tracing::debug;

use crate::chain::{ChainIndex, ChainView, NodeId};
use crate::difficulty::{decode_compact, target_to_bits};
use crate::helper::has_helper_block;
use crate::params::ConsensusParams;
use crate::pow::check_proof_of_work;

/// Fork-active blocks per phase step.
pub const POS_PHASE_BLOCKS: u64 = 2016;

/// Highest phase.
pub const MAX_POS_PHASE: u8 = 3;

/// Consecutive heights, from `node` downward, without a valid helper block.
pub fn get_n_blocks_without_helper(
    view: &ChainView<'_>,
    node: NodeId,
    params: &ConsensusParams,
) -> u32 {
    let mut height = view.node(node).height;
    let mut count = 0u32;
    while !has_helper_block(view, node, height, params) {
        count += 1;
        match height.checked_sub(1) {
            Some(h) => height = h,
            None => break,
        }
    }
    count
}

/// Penalty phase (0 to 3) at `node`, by how long the fork has been active.
pub fn get_pos_phase(index: &ChainIndex, node: NodeId, params: &ConsensusParams) -> u8 {
    let mut phase = 0u8;
    let mut blocks = 1u64;
    let mut cursor = index.prev(node);
    while let Some(id) = cursor {
        if !params.enforce_proof_of_stake(Some(index.node(id))) {
            break;
        }
        if blocks >= u64::from(MAX_POS_PHASE) * POS_PHASE_BLOCKS {
            phase = MAX_POS_PHASE;
            break;
        } else if blocks >= 2 * POS_PHASE_BLOCKS {
            phase = 2;
        } else if blocks >= POS_PHASE_BLOCKS {
            phase = 1;
        }
        cursor = index.prev(id);
        blocks += 1;
    }
    phase
}

/// Proof-of-work check for a stake-era block, with the missing-helper penalty.
///
/// Records the missing-helper count on the node, replacing the previous one.
pub fn check_proof_of_stake_work(
    view: &ChainView<'_>,
    node: NodeId,
    params: &ConsensusParams,
) -> bool {
    let chain_node = view.node(node);
    let phase = get_pos_phase(view.index, node, params);
    let divisor = 8u32 >> phase;
    let missing = get_n_blocks_without_helper(view, node, params) / divisor;

    let mut bits = chain_node.bits;
    if missing > 0 {
        let decoded = decode_compact(bits);
        if decoded.negative || decoded.overflow {
            return false;
        }
        let target = if params.helper_penalty {
            decoded.target >> missing
        } else {
            decoded.target
        };
        bits = if target.is_zero() { 0 } else { target_to_bits(&target) };
    }
    chain_node.record_blocks_without_helper(missing);

    debug!(
        height = chain_node.height,
        phase,
        missing,
        bits,
        "stake work check"
    );
    check_proof_of_work(&chain_node.hash, bits, params)
}
