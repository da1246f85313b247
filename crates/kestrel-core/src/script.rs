// Consensus-critical. Changes require a network upgrade + tests.
//! Standard locking-script templates and destination extraction.
//!
//! Only two templates carry a payout destination:
//!
//! - pay-to-key-id: `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
//! - pay-to-pubkey: `<33 or 65 byte SEC1 key> OP_CHECKSIG`
//!
//! Everything else is opaque to the stake lottery.

use crate::crypto::key_id_from_sec1;
use crate::types::{CoreError, KeyId};
use crate::KEY_ID_LEN;

/// `OP_DUP`.
pub const OP_DUP: u8 = 0x76;
/// `OP_HASH160` (key-id hash in this protocol).
pub const OP_HASH160: u8 = 0xa9;
/// `OP_EQUALVERIFY`.
pub const OP_EQUALVERIFY: u8 = 0x88;
/// `OP_CHECKSIG`.
pub const OP_CHECKSIG: u8 = 0xac;

/// Build a pay-to-key-id script.
pub fn pay_to_key_id(key_id: &KeyId) -> Vec<u8> {
    let mut script = Vec::with_capacity(KEY_ID_LEN + 5);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(KEY_ID_LEN as u8);
    script.extend_from_slice(key_id.as_bytes());
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build a pay-to-pubkey script from SEC1 public key bytes.
///
/// Only 33-byte compressed and 65-byte uncompressed encodings are accepted.
pub fn pay_to_pubkey(sec1: &[u8]) -> Result<Vec<u8>, CoreError> {
    let len = match sec1.len() {
        33 => 33u8,
        65 => 65u8,
        _ => return Err(CoreError::InvalidValue("SEC1 key must be 33 or 65 bytes")),
    };
    let mut script = Vec::with_capacity(sec1.len() + 2);
    script.push(len);
    script.extend_from_slice(sec1);
    script.push(OP_CHECKSIG);
    Ok(script)
}

/// Extract the payout key id from a standard script.
///
/// Returns `None` for non-standard scripts and for pay-to-pubkey scripts whose
/// key is not a valid curve point.
pub fn extract_destination(script: &[u8]) -> Option<KeyId> {
    match script {
        [OP_DUP, OP_HASH160, len, body @ .., OP_EQUALVERIFY, OP_CHECKSIG]
            if *len as usize == KEY_ID_LEN && body.len() == KEY_ID_LEN =>
        {
            let mut id = [0u8; KEY_ID_LEN];
            id.copy_from_slice(body);
            Some(KeyId(id))
        }
        [len, key @ .., OP_CHECKSIG]
            if (*len == 33 || *len == 65) && key.len() == *len as usize =>
        {
            key_id_from_sec1(key).ok()
        }
        _ => None,
    }
}
