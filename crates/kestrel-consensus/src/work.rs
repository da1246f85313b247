// Consensus-critical. Changes require a network upgrade + tests.
//! Work calculation helpers (heaviest-chain selection).

use crate::difficulty::bits_to_target;
use crate::error::ConsensusError;
use kestrel_core::Hash32;
use num_bigint::BigUint;
use num_traits::One;

/// Compute per-block work from compact `bits`.
///
/// Work is defined as `work = floor((2^256) / (target + 1))`.
pub fn work_from_bits(bits: u32) -> Result<BigUint, ConsensusError> {
    let target = bits_to_target(bits)?;
    let two_256 = BigUint::one() << 256u32;
    Ok(&two_256 / (&target + BigUint::one()))
}

/// Return true if tip A is strictly better (heavier) than tip B, tie-breaking on hash.
pub fn tip_is_better(a_work: &BigUint, a_hash: &Hash32, b_work: &BigUint, b_hash: &Hash32) -> bool {
    if a_work != b_work {
        a_work > b_work
    } else {
        a_hash.as_bytes() < b_hash.as_bytes()
    }
}
