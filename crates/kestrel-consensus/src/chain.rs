//! Chain index: an arena of accepted headers.
//!
//! Nodes are owned by [`ChainIndex`] and refer to each other by [`NodeId`].
//! Every node carries a skip pointer laid out like Bitcoin's `pskip`, which
//! makes [`ChainIndex::ancestor`] O(log n).
//!
//! `winning_address` is a once-cell: the winner is a pure function of
//! ancestor history, so the first write wins. `blocks_without_helper` holds
//! the count from the most recent penalty check and is overwritten each time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use kestrel_core::{block_header_hash, Block, BlockHash, BlockHeader, KeyId};
use kestrel_state::{BlockStore, StateError, SupplyLedger};
use num_bigint::BigUint;
use tracing::debug;

use crate::error::ConsensusError;
use crate::params::ConsensusParams;
use crate::validate::median_time_past;
use crate::work::{tip_is_better, work_from_bits};

/// Number of trailing block times feeding median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Arena index of a [`ChainNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One accepted block header.
#[derive(Debug)]
pub struct ChainNode {
    /// Header hash (also the proof-of-work hash).
    pub hash: BlockHash,
    /// Height; genesis is 0.
    pub height: u64,
    /// Compact target carried by the header.
    pub bits: u32,
    /// Header timestamp.
    pub time: u64,
    /// Median of the last [`MEDIAN_TIME_SPAN`] block times, this block included.
    pub median_time_past: u64,
    /// Predecessor; `None` only at genesis.
    pub prev: Option<NodeId>,
    /// Cumulative work up to and including this block.
    pub chain_work: BigUint,
    skip: Option<NodeId>,
    block: Option<Arc<Block>>,
    winning_address: OnceLock<KeyId>,
    blocks_without_helper: AtomicU64,
}

/// `blocks_without_helper` value meaning "never computed".
const NO_COUNT: u64 = u64::MAX;

impl ChainNode {
    /// Cached block body, if it was attached.
    pub fn block(&self) -> Option<&Arc<Block>> {
        self.block.as_ref()
    }

    /// Memoized lottery winner for this node's height.
    pub fn winning_address(&self) -> Option<KeyId> {
        self.winning_address.get().copied()
    }

    /// Memoize the lottery winner; returns the stored value.
    pub fn memoize_winning_address(&self, address: KeyId) -> KeyId {
        *self.winning_address.get_or_init(|| address)
    }

    /// Last computed missing-helper count, if any.
    pub fn blocks_without_helper(&self) -> Option<u32> {
        match self.blocks_without_helper.load(Ordering::Relaxed) {
            NO_COUNT => None,
            count => u32::try_from(count).ok(),
        }
    }

    /// Store the missing-helper count, replacing any earlier value.
    pub fn record_blocks_without_helper(&self, count: u32) {
        self.blocks_without_helper
            .store(u64::from(count), Ordering::Relaxed);
    }
}

/// Arena of chain nodes with hash lookup and best-tip tracking.
#[derive(Debug, Default)]
pub struct ChainIndex {
    nodes: Vec<ChainNode>,
    by_hash: HashMap<BlockHash, NodeId>,
    best: Option<NodeId>,
}

impl ChainIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id.
    ///
    /// Ids are only minted by this index, so lookup cannot miss.
    pub fn node(&self, id: NodeId) -> &ChainNode {
        &self.nodes[id.0]
    }

    /// Node id by header hash.
    pub fn lookup(&self, hash: &BlockHash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    /// Predecessor of `id`.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    /// Tip with the most cumulative work.
    pub fn best_tip(&self) -> Option<NodeId> {
        self.best
    }

    /// Insert a header whose parent is already indexed (or a genesis header
    /// with a zero `prev` into an empty index).
    ///
    /// Inserting a known header returns its existing id.
    pub fn insert_header(&mut self, header: &BlockHeader) -> Result<NodeId, ConsensusError> {
        let hash = block_header_hash(header).map_err(StateError::from)?;
        if let Some(id) = self.lookup(&hash) {
            return Ok(id);
        }

        let prev = if header.prev.is_zero() && self.nodes.is_empty() {
            None
        } else {
            Some(
                self.lookup(&header.prev)
                    .ok_or(ConsensusError::UnknownParent(header.prev))?,
            )
        };

        let height = prev.map_or(0, |p| self.node(p).height + 1);
        let skip = prev.and_then(|p| self.ancestor(p, skip_height(height)));

        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        times.push(header.timestamp);
        let mut walk = prev;
        while let Some(id) = walk {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            let node = self.node(id);
            times.push(node.time);
            walk = node.prev;
        }
        times.reverse();
        let median_time_past = median_time_past(&times).unwrap_or(header.timestamp);

        // Invalid bits contribute no work.
        let own_work = work_from_bits(header.bits).unwrap_or_default();
        let chain_work = match prev {
            Some(p) => &self.node(p).chain_work + own_work,
            None => own_work,
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(ChainNode {
            hash,
            height,
            bits: header.bits,
            time: header.timestamp,
            median_time_past,
            prev,
            chain_work,
            skip,
            block: None,
            winning_address: OnceLock::new(),
            blocks_without_helper: AtomicU64::new(NO_COUNT),
        });
        self.by_hash.insert(hash, id);

        let better = match self.best {
            Some(best) => {
                let (b, n) = (self.node(best), self.node(id));
                tip_is_better(&n.chain_work, &n.hash, &b.chain_work, &b.hash)
            }
            None => true,
        };
        if better {
            self.best = Some(id);
        }

        debug!(height, %hash, bits = header.bits, "indexed header");
        Ok(id)
    }

    /// Insert a full block: index its header and cache the body.
    pub fn insert_block(&mut self, block: Block) -> Result<NodeId, ConsensusError> {
        let id = self.insert_header(&block.header)?;
        self.attach_block(id, block);
        Ok(id)
    }

    /// Cache a block body on an indexed node.
    pub fn attach_block(&mut self, id: NodeId, block: Block) {
        self.nodes[id.0].block = Some(Arc::new(block));
    }

    /// Remove the most recently inserted node.
    ///
    /// Used to roll back a block that failed validation after indexing. Any
    /// other node is left alone and `false` is returned.
    pub fn discard_last(&mut self, id: NodeId) -> bool {
        if id.0 + 1 != self.nodes.len() {
            return false;
        }
        let Some(node) = self.nodes.pop() else {
            return false;
        };
        self.by_hash.remove(&node.hash);
        if self.best == Some(id) {
            self.best = (0..self.nodes.len()).map(NodeId).reduce(|best, cand| {
                let (b, c) = (self.node(best), self.node(cand));
                if tip_is_better(&c.chain_work, &c.hash, &b.chain_work, &b.hash) {
                    cand
                } else {
                    best
                }
            });
        }
        debug!(height = node.height, hash = %node.hash, "discarded header");
        true
    }

    /// Ancestor of `id` at `height` on the same chain.
    ///
    /// `None` when `height` is above the node.
    pub fn ancestor(&self, id: NodeId, height: u64) -> Option<NodeId> {
        let mut walk = id;
        let mut height_walk = self.node(walk).height;
        if height > height_walk {
            return None;
        }

        while height_walk > height {
            let node = self.node(walk);
            let height_skip = skip_height(height_walk);
            let height_skip_prev = skip_height(height_walk - 1);
            let take_skip = match node.skip {
                Some(_) => {
                    height_skip == height
                        || (height_skip > height
                            && !(height_skip_prev + 2 < height_skip
                                && height_skip_prev >= height))
                }
                None => false,
            };
            if let (true, Some(skip)) = (take_skip, node.skip) {
                walk = skip;
                height_walk = height_skip;
            } else {
                walk = node.prev?;
                height_walk -= 1;
            }
        }

        Some(walk)
    }
}

/// Turn the lowest set bit off.
fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// Height a node's skip pointer targets.
fn skip_height(height: u64) -> u64 {
    if height < 2 {
        return 0;
    }
    // Any number strictly lower than height is acceptable, but this gives
    // O(log n) ancestor walks in practice.
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// Everything the stake rules read: the chain, block bodies, and the supply ledger.
///
/// Passed explicitly into every stake-aware function instead of any global chain.
#[derive(Clone, Copy)]
pub struct ChainView<'a> {
    /// Header arena.
    pub index: &'a ChainIndex,
    /// Block body source for nodes without a cached body.
    pub blocks: &'a dyn BlockStore,
    /// Cumulative mature-supply ledger.
    pub supply: &'a dyn SupplyLedger,
}

impl<'a> ChainView<'a> {
    /// Bundle the collaborators.
    pub fn new(
        index: &'a ChainIndex,
        blocks: &'a dyn BlockStore,
        supply: &'a dyn SupplyLedger,
    ) -> Self {
        Self {
            index,
            blocks,
            supply,
        }
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &'a ChainNode {
        self.index.node(id)
    }

    /// Block body for a node: the cached one, else a store read.
    pub fn read_block(&self, id: NodeId) -> Result<Arc<Block>, StateError> {
        let node = self.index.node(id);
        match node.block() {
            Some(block) => Ok(Arc::clone(block)),
            None => self.blocks.read_block(&node.hash).map(Arc::new),
        }
    }

    /// `S(height)` from the supply ledger.
    pub fn mature_supply(&self, height: u64) -> u64 {
        self.supply.cumulative_mature_supply(height)
    }

    /// Whether the stake fork is active at `id`.
    pub fn fork_active(&self, id: Option<NodeId>, params: &ConsensusParams) -> bool {
        params.enforce_proof_of_stake(id.map(|i| self.index.node(i)))
    }
}
