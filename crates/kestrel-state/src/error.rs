//! Chain-state errors.

use kestrel_core::{BlockHash, CoreError};
use thiserror::Error;

/// Errors produced by the state collaborators (block store, supply ledger, merkle).
#[derive(Debug, Error)]
pub enum StateError {
    /// The requested block body is not available.
    #[error("block not found: {0}")]
    BlockNotFound(BlockHash),

    /// Cumulative mature supply must never decrease with height.
    #[error("mature supply decreases at height {height}: {previous} -> {next}")]
    NonMonotonicSupply {
        /// Height of the offending entry.
        height: u64,
        /// Cumulative supply at the previous height.
        previous: u64,
        /// Rejected cumulative supply.
        next: u64,
    },

    /// Supply entries must be recorded for consecutive heights.
    #[error("supply gap: expected height {expected}, got {got}")]
    SupplyGap {
        /// Next height the ledger can accept.
        expected: u64,
        /// Height that was offered.
        got: u64,
    },

    /// Core encoding or hashing failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}
