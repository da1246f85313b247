// Consensus-critical. Changes require a network upgrade + tests.
//! Difficulty adjustment.
//!
//! The next block's required `bits` are a function of the predecessor and
//! the candidate header's timestamp. Two rule eras exist. Which one applies
//! is decided once per call from the stake-fork predicate at the predecessor
//! and at its parent:
//!
//! - [`PreForkRules`]: Bitcoin-style retarget every `interval(false)` blocks,
//!   anchored on raw block times and clamped to a factor of four.
//! - [`PostForkRules`]: a window `pos_timespan_divisor` times shorter, anchored
//!   on median-time-past. The first block after activation retargets
//!   immediately and unclamped.

use kestrel_core::BlockHeader;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use tracing::debug;

use crate::chain::{ChainIndex, ChainNode, NodeId};
use crate::difficulty::{decode_compact, target_to_bits, EASY_TARGET_BITS};
use crate::params::ConsensusParams;

/// Era-specific parts of the retarget algorithm.
pub trait RetargetRules {
    /// Whether stake-fork timing applies.
    fn fork(&self) -> bool;

    /// Whether this is the first block under the fork.
    fn activating(&self) -> bool {
        false
    }

    /// Blocks per retarget window.
    fn interval(&self, params: &ConsensusParams) -> u64 {
        params.difficulty_adjustment_interval(self.fork())
    }

    /// Seconds per retarget window.
    fn target_timespan(&self, params: &ConsensusParams) -> i64 {
        params.target_timespan(self.fork())
    }

    /// Timestamp a window is measured from or to.
    fn anchor_time(&self, node: &ChainNode) -> i64;

    /// Off a window boundary, keep the predecessor's bits.
    fn holds_bits_off_boundary(&self) -> bool {
        !self.activating()
    }

    /// Clamp the measured timespan to `[tt/4, tt*4]`.
    fn clamps_timespan(&self) -> bool {
        !self.activating()
    }
}

/// Proof-of-work only era.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreForkRules;

impl RetargetRules for PreForkRules {
    fn fork(&self) -> bool {
        false
    }

    fn anchor_time(&self, node: &ChainNode) -> i64 {
        secs(node.time)
    }
}

/// Stake-fork era.
#[derive(Clone, Copy, Debug, Default)]
pub struct PostForkRules {
    /// The predecessor is the first node with the fork active.
    pub activating: bool,
}

impl RetargetRules for PostForkRules {
    fn fork(&self) -> bool {
        true
    }

    fn activating(&self) -> bool {
        self.activating
    }

    fn anchor_time(&self, node: &ChainNode) -> i64 {
        secs(node.median_time_past)
    }
}

static PRE_FORK: PreForkRules = PreForkRules;
static POST_FORK: PostForkRules = PostForkRules { activating: false };
static POST_FORK_ACTIVATION: PostForkRules = PostForkRules { activating: true };

/// Rule set governing the block after `last`.
pub fn select_rules(
    index: &ChainIndex,
    last: NodeId,
    params: &ConsensusParams,
) -> &'static dyn RetargetRules {
    let node = index.node(last);
    let fork = params.enforce_proof_of_stake(Some(node));
    let fork_prev = params.enforce_proof_of_stake(node.prev.map(|p| index.node(p)));
    match (fork, fork_prev) {
        (false, _) => &PRE_FORK,
        (true, true) => &POST_FORK,
        (true, false) => &POST_FORK_ACTIVATION,
    }
}

fn secs(t: u64) -> i64 {
    i64::try_from(t).unwrap_or(i64::MAX)
}

/// Required `bits` for the block following `last`.
///
/// `last` is `None` for genesis.
pub fn get_next_work_required(
    index: &ChainIndex,
    last: Option<NodeId>,
    candidate: &BlockHeader,
    params: &ConsensusParams,
) -> u32 {
    let pow_limit_bits = params.pow_limit_bits();

    let Some(last_id) = last else {
        return pow_limit_bits;
    };
    let last_node = index.node(last_id);

    if last_node.height <= params.height_cp {
        return EASY_TARGET_BITS;
    }
    if params
        .easy_target_after
        .is_some_and(|h| last_node.height > h)
    {
        return EASY_TARGET_BITS;
    }

    let rules = select_rules(index, last_id, params);
    let interval = rules.interval(params).max(1);

    if (last_node.height + 1) % interval != 0 {
        if params.allow_min_difficulty_blocks && last_node.height >= params.height_min_diff {
            let gap = params.pow_target_spacing.saturating_mul(2);
            if secs(candidate.timestamp) > secs(last_node.time).saturating_add(gap) {
                return EASY_TARGET_BITS;
            }
            return last_real_difficulty(index, last_id, interval, pow_limit_bits);
        }
        if rules.holds_bits_off_boundary() {
            return last_node.bits;
        }
    }

    let first_height = last_node.height.saturating_sub(interval - 1);
    let first = index.ancestor(last_id, first_height).unwrap_or(last_id);
    let first_time = rules.anchor_time(index.node(first));

    calculate_with_rules(rules, last_node, first_time, params)
}

/// Bits of the nearest block that is a window boundary or was not mined
/// under the min-difficulty carve-out.
fn last_real_difficulty(index: &ChainIndex, from: NodeId, interval: u64, pow_limit_bits: u32) -> u32 {
    let mut id = from;
    loop {
        let node = index.node(id);
        match node.prev {
            Some(prev) if node.height % interval != 0 && node.bits == pow_limit_bits => id = prev,
            _ => return node.bits,
        }
    }
}

/// Retarget from `last` given the window's anchor time.
pub fn calculate_next_work_required(
    index: &ChainIndex,
    last: NodeId,
    first_block_time: i64,
    params: &ConsensusParams,
) -> u32 {
    let rules = select_rules(index, last, params);
    calculate_with_rules(rules, index.node(last), first_block_time, params)
}

fn calculate_with_rules(
    rules: &dyn RetargetRules,
    last: &ChainNode,
    first_block_time: i64,
    params: &ConsensusParams,
) -> u32 {
    if params.no_retargeting {
        return last.bits;
    }

    let target_timespan = rules.target_timespan(params);
    let mut actual = rules.anchor_time(last).saturating_sub(first_block_time);

    if rules.clamps_timespan() {
        actual = actual
            .max(target_timespan / 4)
            .min(target_timespan.saturating_mul(4));
    }
    if actual <= 0 {
        actual = target_timespan / 4;
    }

    let old = decode_compact(last.bits).target;
    let numerator = BigUint::from(u64::try_from(actual).unwrap_or(0));
    let denominator = BigUint::from(u64::try_from(target_timespan).unwrap_or(0).max(1));
    let mut new = old * numerator / denominator;

    let limit = params.pow_limit_target();
    if new > limit {
        new = limit;
    }
    if new.is_zero() {
        new = BigUint::one();
    }

    let bits = target_to_bits(&new);
    debug!(
        height = last.height + 1,
        fork = rules.fork(),
        activating = rules.activating(),
        actual_timespan = actual,
        target_timespan,
        old_bits = last.bits,
        new_bits = bits,
        "retarget"
    );
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{Hash32, PROTOCOL_VERSION};

    fn header(prev: Hash32, timestamp: u64, bits: u32) -> BlockHeader {
        BlockHeader {
            version: PROTOCOL_VERSION,
            prev,
            merkle_root: Hash32::zero(),
            timestamp,
            bits,
            nonce: 0,
        }
    }

    fn grow(index: &mut ChainIndex, tip: Option<NodeId>, n: u64, spacing: u64, bits: u32) -> NodeId {
        let mut prev = tip.map_or(Hash32::zero(), |t| index.node(t).hash);
        let mut time = tip.map_or(1_000_000, |t| index.node(t).time);
        let mut id = tip;
        for _ in 0..n {
            time += spacing;
            let new = index.insert_header(&header(prev, time, bits)).expect("insert");
            prev = index.node(new).hash;
            id = Some(new);
        }
        id.expect("grew at least one")
    }

    fn small_params() -> ConsensusParams {
        ConsensusParams {
            height_cp: 0,
            pos_fork_height: u64::MAX,
            pow_target_spacing: 600,
            pow_target_timespan: 600 * 8,
            pos_timespan_divisor: 2,
            ..ConsensusParams::mainnet()
        }
    }

    #[test]
    fn rule_selection_by_fork_edge() {
        let mut index = ChainIndex::new();
        let tip = grow(&mut index, None, 12, 600, 0x1d00_ffff);
        let params = ConsensusParams {
            pos_fork_height: 10,
            ..small_params()
        };
        let at = |h| index.ancestor(tip, h).expect("ancestor");

        assert!(!select_rules(&index, at(9), &params).fork());
        let activation = select_rules(&index, at(10), &params);
        assert!(activation.fork() && activation.activating());
        let steady = select_rules(&index, at(11), &params);
        assert!(steady.fork() && !steady.activating());
    }

    #[test]
    fn boundary_retargets_by_measured_timespan() {
        let params = small_params();
        let mut index = ChainIndex::new();
        // Heights 0..=7; boundary at last.height + 1 == 8.
        let tip = grow(&mut index, None, 8, 600, 0x1c12_3456);
        let next = header(index.node(tip).hash, index.node(tip).time + 600, 0);
        // Seven spacings measured against an eight-spacing window.
        let expected = {
            let old = decode_compact(0x1c12_3456).target;
            target_to_bits(&(old * BigUint::from(7u32 * 600) / BigUint::from(8u32 * 600)))
        };
        assert_eq!(get_next_work_required(&index, Some(tip), &next, &params), expected);
    }

    #[test]
    fn clamps_pre_fork() {
        let params = small_params();
        let mut index = ChainIndex::new();
        // Window took one second per block: clamp to tt/4.
        let tip = grow(&mut index, None, 8, 1, 0x1c12_3456);
        let fast = calculate_next_work_required(&index, tip, 1_000_001, &params);
        let quarter = target_to_bits(&(decode_compact(0x1c12_3456).target / BigUint::from(4u32)));
        assert_eq!(fast, quarter);

        // Far too slow: clamp to tt*4.
        let slow = calculate_next_work_required(&index, tip, -10_000_000, &params);
        let quadruple = target_to_bits(&(decode_compact(0x1c12_3456).target * BigUint::from(4u32)));
        assert_eq!(slow, quadruple);
    }

    #[test]
    fn result_never_exceeds_pow_limit() {
        let params = small_params();
        let mut index = ChainIndex::new();
        let tip = grow(&mut index, None, 8, 600, params.pow_limit_bits());
        let bits = calculate_next_work_required(&index, tip, -10_000_000, &params);
        assert_eq!(bits, params.pow_limit_bits());
    }

    #[test]
    fn no_retargeting_keeps_bits() {
        let params = ConsensusParams {
            no_retargeting: true,
            ..small_params()
        };
        let mut index = ChainIndex::new();
        let tip = grow(&mut index, None, 8, 1, 0x1c12_3456);
        assert_eq!(calculate_next_work_required(&index, tip, 0, &params), 0x1c12_3456);
    }

    #[test]
    fn min_difficulty_walk_skips_carve_out_blocks() {
        let params = ConsensusParams {
            allow_min_difficulty_blocks: true,
            height_min_diff: 0,
            ..small_params()
        };
        let limit = params.pow_limit_bits();
        let mut index = ChainIndex::new();
        let real = grow(&mut index, None, 3, 600, 0x1c12_3456);
        let tip = grow(&mut index, Some(real), 2, 600, limit);
        assert_eq!(index.node(tip).height, 4);

        let on_time = header(index.node(tip).hash, index.node(tip).time + 600, 0);
        assert_eq!(get_next_work_required(&index, Some(tip), &on_time, &params), 0x1c12_3456);

        let late = header(index.node(tip).hash, index.node(tip).time + 1_201, 0);
        assert_eq!(get_next_work_required(&index, Some(tip), &late, &params), EASY_TARGET_BITS);
    }
}
