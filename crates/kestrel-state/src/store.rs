//! Block body retrieval.
//!
//! Persistence is provided by the node layer; consensus only needs to read a
//! block by its header hash. Reads may fail, and a failed read is never
//! treated as evidence.

use hashbrown::HashMap;

use kestrel_core::{block_header_hash, Block, BlockHash};

use crate::error::StateError;

/// Read access to full block bodies keyed by header hash.
pub trait BlockStore {
    /// Load the block whose header hashes to `hash`.
    fn read_block(&self, hash: &BlockHash) -> Result<Block, StateError>;
}

/// In-memory block store.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlockStore {
    blocks: HashMap<BlockHash, Block>,
}

impl MemoryBlockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block and return its header hash.
    pub fn insert(&mut self, block: Block) -> Result<BlockHash, StateError> {
        let hash = block_header_hash(&block.header)?;
        self.blocks.insert(hash, block);
        Ok(hash)
    }

    /// Drop a block body (simulates pruning or a failing disk).
    pub fn remove(&mut self, hash: &BlockHash) -> Option<Block> {
        self.blocks.remove(hash)
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn read_block(&self, hash: &BlockHash) -> Result<Block, StateError> {
        self.blocks
            .get(hash)
            .cloned()
            .ok_or(StateError::BlockNotFound(*hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{BlockHeader, Hash32, PROTOCOL_VERSION};

    #[test]
    fn read_back_and_remove() {
        let block = Block {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                prev: Hash32::zero(),
                merkle_root: Hash32::zero(),
                timestamp: 42,
                bits: 0x207f_ffff,
                nonce: 1,
            },
            txs: vec![],
            helper: None,
        };
        let mut store = MemoryBlockStore::new();
        let hash = store.insert(block.clone()).expect("insert");
        assert_eq!(store.read_block(&hash).expect("read"), block);

        store.remove(&hash);
        assert!(matches!(
            store.read_block(&hash),
            Err(StateError::BlockNotFound(h)) if h == hash
        ));
        assert!(store.is_empty());
    }
}
