// Consensus-critical. Changes require a network upgrade + tests.
//! Transaction Merkle tree.
//!
//! Leaves are domain-separated txids. Odd levels are padded with a
//! deterministic per-height empty node instead of duplicating the last entry,
//! so two different transaction lists can never share a root by repetition.
//!
//! Hash function: BLAKE3 with domain separators.

use kestrel_core::{hash32, txid, Block, Hash32};

use crate::error::StateError;

/// Domain separator for merkle node hashing.
const DS_MERKLE_NODE: &[u8] = b"KESTREL::MERKLE_NODE::V0";
/// Domain separator for merkle leaf hashing.
const DS_MERKLE_LEAF: &[u8] = b"KESTREL::MERKLE_LEAF::V0";
/// Domain separator for merkle empty hashing.
const DS_MERKLE_EMPTY: &[u8] = b"KESTREL::MERKLE_EMPTY::V0";

/// Compute the Merkle root over an ordered list of txids.
///
/// An empty list yields the empty node at height 0.
pub fn merkle_root(txids: &[Hash32]) -> Hash32 {
    if txids.is_empty() {
        return empty_at(0);
    }

    let mut level: Vec<Hash32> = txids
        .iter()
        .map(|id| hash32(DS_MERKLE_LEAF, id.as_bytes()))
        .collect();
    let mut height: u8 = 0;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(empty_at(height));
        }
        level = level
            .chunks_exact(2)
            .map(|pair| parent_hash(&pair[0], &pair[1]))
            .collect();
        height = height.saturating_add(1);
    }

    level[0]
}

/// Compute the Merkle root of a block's transactions.
pub fn block_merkle_root(block: &Block) -> Result<Hash32, StateError> {
    let ids = block
        .txs
        .iter()
        .map(txid)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&ids))
}

/// Whether `claimed` equals the Merkle root of the block's own transactions.
///
/// A block whose transactions cannot be hashed never matches.
pub fn match_merkle_root(block: &Block, claimed: &Hash32) -> bool {
    block_merkle_root(block).is_ok_and(|root| root == *claimed)
}

/// Compute parent hash for two child nodes.
fn parent_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left.as_bytes());
    bytes[32..].copy_from_slice(right.as_bytes());
    hash32(DS_MERKLE_NODE, &bytes)
}

/// Compute the "empty" node hash at a given height.
fn empty_at(height: u8) -> Hash32 {
    // Height is included to avoid accidental reuse across levels.
    hash32(DS_MERKLE_EMPTY, &[height])
}
