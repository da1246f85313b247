#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Kestrel consensus rules for hybrid PoW/PoS blocks (v0).
//!
//! This crate is responsible for:
//! - compact difficulty target encoding/decoding (Bitcoin-style `bits`)
//! - proof-of-work validation against the target
//! - difficulty retargeting across the pre-fork and stake-fork eras
//! - the supply-weighted stake lottery
//! - helper-block validation and the missing-helper penalty
//!
//! It intentionally does **not** include networking, mempool policy, or
//! persistence. Block bodies and the mature-supply ledger come in through the
//! `kestrel-state` traits.

pub mod chain;
pub mod difficulty;
pub mod error;
pub mod helper;
pub mod lottery;
pub mod params;
pub mod penalty;
pub mod pow;
pub mod retarget;
pub mod validate;
pub mod work;

pub use chain::*;
pub use difficulty::*;
pub use error::*;
pub use helper::*;
pub use lottery::*;
pub use params::*;
pub use penalty::*;
pub use pow::*;
pub use retarget::*;
pub use validate::*;
pub use work::*;

pub use kestrel_core::sign_helper_block;
