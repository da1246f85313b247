#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Kestrel chain-state collaborators (v0).
//!
//! Responsibilities:
//! - Transaction Merkle roots and matching a claimed root against a block
//! - The cumulative mature-supply ledger queried by the stake lottery
//! - Block body retrieval
//!
//! Consensus rules live in `kestrel-consensus`; this crate only answers queries.

pub mod error;
pub mod merkle;
pub mod store;
pub mod supply;

pub use error::*;
pub use merkle::*;
pub use store::*;
pub use supply::*;
