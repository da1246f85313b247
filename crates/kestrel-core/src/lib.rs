#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Kestrel core: canonical types, constants, hashing, scripts and signature helpers.

pub mod constants;
pub mod crypto;
pub mod script;
pub mod serialization;
pub mod types;

pub use constants::*;
pub use crypto::*;
pub use script::*;
pub use serialization::*;
pub use types::*;

/// Re-exported so dependants sign with the same curve implementation.
pub use k256::ecdsa::SigningKey;
