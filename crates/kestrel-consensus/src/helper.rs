// Consensus-critical. Changes require a network upgrade + tests.
//! Helper-block validation.
//!
//! After the stake fork every block is expected to embed a helper block: a
//! payload linked to the previous block's full hash, committing to the
//! block's own transaction Merkle root, and signed by the lottery winner of
//! the previous height.

use kestrel_core::{block_full_hash, verify_helper_signature};
use kestrel_state::match_merkle_root;
use tracing::{debug, warn};

use crate::chain::{ChainView, NodeId};
use crate::lottery::{draw, NoWinner};
use crate::params::ConsensusParams;

/// Outcome of checking one height for a valid helper block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HelperStatus {
    /// No block at that height on this chain.
    NoAncestor,
    /// The fork is not active at the block's predecessor.
    ForkInactive,
    /// Heights 0 and 1 are exempt.
    GenesisExempt,
    /// No supply matured yet, so there is no lottery.
    NoMatureSupply,
    /// Well-formed helper signed by the winner.
    Valid,
    /// Well-formed helper whose signature does not recover to the winner.
    SignatureIgnored,
    /// The lottery produced no winner.
    NoWinner(NoWinner),
    /// The block body could not be read.
    BlockUnavailable,
    /// The block carries no helper.
    MissingHelper,
    /// The predecessor's body could not be read.
    PrevBlockUnavailable,
    /// The helper does not link to the predecessor's full hash.
    PrevHashMismatch,
    /// The helper's Merkle root is not the block's.
    MerkleMismatch,
    /// Signature mismatch under `enforce_helper_signature`.
    BadSignature,
}

impl HelperStatus {
    /// Whether the helper requirement is met at this height.
    pub fn is_satisfied(&self) -> bool {
        matches!(
            self,
            HelperStatus::NoAncestor
                | HelperStatus::ForkInactive
                | HelperStatus::GenesisExempt
                | HelperStatus::NoMatureSupply
                | HelperStatus::Valid
                | HelperStatus::SignatureIgnored
        )
    }
}

/// Check the helper block at `height` on the chain ending at `tip`.
pub fn helper_block_status(
    view: &ChainView<'_>,
    tip: NodeId,
    height: u64,
    params: &ConsensusParams,
) -> HelperStatus {
    let Some(id) = view.index.ancestor(tip, height) else {
        return HelperStatus::NoAncestor;
    };
    let node = view.node(id);
    if !view.fork_active(node.prev, params) {
        return HelperStatus::ForkInactive;
    }
    let Some(prev_id) = node.prev.filter(|_| height > 1) else {
        return HelperStatus::GenesisExempt;
    };
    if view.mature_supply(height - 1) == 0 {
        return HelperStatus::NoMatureSupply;
    }

    let prev = view.node(prev_id);
    let winning_address = match prev.winning_address() {
        Some(address) => address,
        None => match draw(view, prev_id, height - 1, params) {
            Ok(winner) => prev.memoize_winning_address(winner.address),
            Err(reason) => {
                debug!(height, %reason, "no winning address");
                return HelperStatus::NoWinner(reason);
            }
        },
    };

    let block = match view.read_block(id) {
        Ok(block) => block,
        Err(err) => {
            debug!(height, %err, "block unavailable");
            return HelperStatus::BlockUnavailable;
        }
    };
    let Some(helper) = block.helper.as_ref() else {
        debug!(height, "block has no helper");
        return HelperStatus::MissingHelper;
    };

    let prev_full_hash = match view.read_block(prev_id).map(|b| block_full_hash(&b)) {
        Ok(Ok(hash)) => hash,
        _ => {
            debug!(height, "previous block unavailable");
            return HelperStatus::PrevBlockUnavailable;
        }
    };
    if helper.hash_prev_block != prev_full_hash {
        debug!(height, "helper prev hash mismatch");
        return HelperStatus::PrevHashMismatch;
    }

    if !match_merkle_root(&block, &helper.hash_merkle_root) {
        debug!(height, "helper merkle root mismatch");
        return HelperStatus::MerkleMismatch;
    }

    if !verify_helper_signature(helper, &winning_address) {
        warn!(height, winner = %winning_address, "bad helper signature");
        if params.enforce_helper_signature {
            return HelperStatus::BadSignature;
        }
        return HelperStatus::SignatureIgnored;
    }

    debug!(height, "good helper block");
    HelperStatus::Valid
}

/// Whether the helper requirement is met at `height`.
pub fn has_helper_block(
    view: &ChainView<'_>,
    tip: NodeId,
    height: u64,
    params: &ConsensusParams,
) -> bool {
    helper_block_status(view, tip, height, params).is_satisfied()
}
