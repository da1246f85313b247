// Consensus-critical. Changes require a network upgrade + tests.
//! Difficulty target utilities.
//!
//! Kestrel uses a Bitcoin-style "compact" encoding in `BlockHeader.bits`.
//! This encodes a 256-bit target as: `bits = (size << 24) | sign | mantissa`
//! where mantissa is 23 bits and `sign` is bit 23:
//!
//! - size = (bits >> 24) as u8 (length of the target in bytes)
//! - mantissa = bits & 0x007fffff
//!
//! Then: target = mantissa * 2^(8*(size-3))
//!
//! Decoding reports a negative sign and a 256-bit overflow as separate flags;
//! validation rejects both, it never clamps them. No floats anywhere.

use crate::error::ConsensusError;
use kestrel_core::Hash32;
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Compact form of the pinned easy target `0x7fff…ff`.
pub const EASY_TARGET_BITS: u32 = 0x207f_ffff;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Result of decoding compact `bits` without judging it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedTarget {
    /// Decoded value, truncated to 256 bits.
    pub target: BigUint,
    /// Sign bit set on a non-zero mantissa.
    pub negative: bool,
    /// Mantissa shifted past 256 bits.
    pub overflow: bool,
}

/// Decode compact `bits`, reporting the negative and overflow conditions.
pub fn decode_compact(bits: u32) -> DecodedTarget {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    let target = if size <= 3 {
        // Right shift when size < 3
        word >>= 8 * (3 - size);
        BigUint::from(word)
    } else {
        BigUint::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && (bits & SIGN_BIT) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    let target = if overflow {
        target & ((BigUint::one() << 256u32) - BigUint::one())
    } else {
        target
    };

    DecodedTarget {
        target,
        negative,
        overflow,
    }
}

/// Decode compact `bits` to a usable target.
///
/// Rejects encodings that are negative, overflowing, or represent zero.
pub fn bits_to_target(bits: u32) -> Result<BigUint, ConsensusError> {
    let decoded = decode_compact(bits);
    if decoded.negative {
        return Err(ConsensusError::NegativeTarget);
    }
    if decoded.overflow {
        return Err(ConsensusError::TargetOverflow);
    }
    if decoded.target.is_zero() {
        return Err(ConsensusError::ZeroTarget);
    }
    Ok(decoded.target)
}

/// Encode a target into compact `bits`.
///
/// The encoding is normalized: a mantissa with its top bit set is shifted
/// down one byte so the result never reads as negative. Zero encodes to `0`.
/// `target` must fit in 256 bits.
pub fn target_to_bits(target: &BigUint) -> u32 {
    let mut size = target.bits().div_ceil(8);

    let mut compact = (if size <= 3 {
        low_u64(target) << (8 * (3 - size))
    } else {
        low_u64(&(target >> (8 * (size - 3))))
    }) as u32;

    // If mantissa's highest bit is set, shift it right by 8 and increase size.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Target represented by a big-endian 32-byte value (e.g. `pow_limit`).
pub fn target_from_hash(h: &Hash32) -> BigUint {
    BigUint::from_bytes_be(h.as_bytes())
}

/// Compare a 32-byte hash value (big-endian) with a target.
/// Returns `true` if `hash <= target`.
pub fn hash_meets_target(hash_be: &[u8; 32], target: &BigUint) -> bool {
    let h = BigUint::from_bytes_be(hash_be);
    h <= *target
}

fn low_u64(v: &BigUint) -> u64 {
    v.iter_u64_digits().next().unwrap_or(0)
}
