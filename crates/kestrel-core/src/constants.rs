//! Protocol-wide constants for Kestrel v0.

/// Protocol semantic version (v0).
pub const PROTOCOL_VERSION: u16 = 0;

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Length in bytes of a key identifier (BLAKE3 XOF of a compressed public key).
pub const KEY_ID_LEN: usize = 20;

/// Length in bytes of a compact recoverable signature (`recid || r || s`).
pub const COMPACT_SIGNATURE_LEN: usize = 65;

/// Domain separator used when hashing block headers (also the PoW hash).
///
/// Prevents cross-domain hash collisions.
pub const DS_BLOCK_HEADER: &[u8] = b"KESTREL::BLOCK_HEADER::V0";

/// Domain separator used when hashing full block contents.
///
/// Helper blocks link to the previous block through this hash.
pub const DS_BLOCK_FULL: &[u8] = b"KESTREL::BLOCK_FULL::V0";

/// Domain separator used when hashing transactions.
pub const DS_TX: &[u8] = b"KESTREL::TX::V0";

/// Domain separator for the message a helper-block signature commits to.
pub const DS_HELPER_SIG: &[u8] = b"KESTREL::HELPER_SIG::V0";

/// Domain separator for deriving key identifiers from public keys.
pub const DS_KEY_ID: &[u8] = b"KESTREL::KEY_ID::V0";
