// Consensus-critical. Changes require a network upgrade + tests.
//! Proof-of-work hashing.
//!
//! Kestrel defines PoW as the canonical block header hash computed by `kestrel-core`
//! (BLAKE3 over a domain-separated Borsh-encoded `BlockHeader`).
//!
//! The PoW condition is:
//!     header_hash_as_u256 <= target(bits)
//!
//! The hash is read big-endian. `pow_limit` is enforced by the retarget rules,
//! not here.

use crate::difficulty::{decode_compact, hash_meets_target};
use crate::error::ConsensusError;
use crate::params::ConsensusParams;
use kestrel_core::{block_header_hash, BlockHeader, Hash32};
use num_traits::Zero;
use tracing::debug;

/// Compute the canonical PoW hash for a header.
pub fn pow_hash(header: &BlockHeader) -> Result<Hash32, ConsensusError> {
    block_header_hash(header).map_err(|_| ConsensusError::InvalidHeader("hashing failed"))
}

/// Whether `hash` satisfies the target encoded by `bits`.
///
/// Negative, zero and overflowing encodings never satisfy anything.
pub fn check_proof_of_work(hash: &Hash32, bits: u32, _params: &ConsensusParams) -> bool {
    let decoded = decode_compact(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() {
        debug!(bits, negative = decoded.negative, overflow = decoded.overflow, "unusable target");
        return false;
    }
    hash_meets_target(hash.as_bytes(), &decoded.target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::EASY_TARGET_BITS;

    fn hash_with_prefix(prefix: &[u8]) -> Hash32 {
        let mut b = [0u8; 32];
        b[..prefix.len()].copy_from_slice(prefix);
        Hash32(b)
    }

    #[test]
    fn accepts_at_target_and_below() {
        let params = ConsensusParams::regtest();
        // 0x03123456 decodes to 0x123456.
        let mut at = [0u8; 32];
        at[29..].copy_from_slice(&[0x12, 0x34, 0x56]);
        assert!(check_proof_of_work(&Hash32(at), 0x0312_3456, &params));

        let mut above = at;
        above[31] = 0x57;
        assert!(!check_proof_of_work(&Hash32(above), 0x0312_3456, &params));
    }

    #[test]
    fn rejects_unusable_encodings() {
        let params = ConsensusParams::regtest();
        let zero = Hash32::zero();
        assert!(!check_proof_of_work(&zero, 0, &params));
        assert!(!check_proof_of_work(&zero, 0x0492_3456, &params));
        assert!(!check_proof_of_work(&zero, 0xff12_3456, &params));
    }

    #[test]
    fn easy_target_accepts_half_the_space() {
        let params = ConsensusParams::regtest();
        assert!(check_proof_of_work(&hash_with_prefix(&[0x7f]), EASY_TARGET_BITS, &params));
        assert!(!check_proof_of_work(&hash_with_prefix(&[0x80]), EASY_TARGET_BITS, &params));
    }
}
