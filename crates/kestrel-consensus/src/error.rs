//! Consensus error types.

use kestrel_core::BlockHash;
use kestrel_state::StateError;
use thiserror::Error;

/// Errors returned by consensus validation and difficulty conversion code.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Compact encoding has the sign bit set on a non-zero mantissa.
    #[error("compact target is negative")]
    NegativeTarget,

    /// Compact encoding shifts the mantissa past 256 bits.
    #[error("compact target overflows 256 bits")]
    TargetOverflow,

    /// Target decoded to zero.
    #[error("compact target is zero")]
    ZeroTarget,

    /// Proof-of-work hash did not meet the required target.
    #[error("insufficient proof of work")]
    InsufficientPoW,

    /// Header `bits` differ from what the difficulty rules require.
    #[error("unexpected difficulty bits: expected {expected:#010x}, got {got:#010x}")]
    BadDifficultyBits {
        /// Bits required by the retarget rules.
        expected: u32,
        /// Bits carried by the header.
        got: u32,
    },

    /// Header fields violated basic consensus constraints.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The header's parent is not in the chain index.
    #[error("unknown parent block {0}")]
    UnknownParent(BlockHash),

    /// Consensus parameters are internally inconsistent.
    #[error("invalid consensus params: {0}")]
    InvalidParams(&'static str),

    /// A state collaborator failed.
    #[error(transparent)]
    State(#[from] StateError),
}
