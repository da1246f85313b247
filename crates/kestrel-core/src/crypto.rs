//! Signature wrapper interfaces.
//!
//! Important: this crate intentionally does NOT implement novel cryptography.
//! secp256k1 ECDSA comes from `k256`; this module only fixes the encodings
//! used by consensus:
//!
//! - key id: `BLAKE3-XOF(DS_KEY_ID || compressed_sec1_pubkey)[..20]`
//! - compact signature: `recovery_id (1 byte) || r (32) || s (32)`

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::constants::*;
use crate::serialization::helper_message_hash;
use crate::types::{CoreError, Hash32, HelperBlock, KeyId};

/// Key identifier of a public key.
pub fn key_id(vk: &VerifyingKey) -> KeyId {
    let point = vk.to_encoded_point(true);
    let mut h = blake3::Hasher::new();
    h.update(DS_KEY_ID);
    h.update(point.as_bytes());
    let mut out = [0u8; KEY_ID_LEN];
    h.finalize_xof().fill(&mut out);
    KeyId(out)
}

/// Key identifier of SEC1-encoded public key bytes (compressed or not).
pub fn key_id_from_sec1(bytes: &[u8]) -> Result<KeyId, CoreError> {
    let vk = VerifyingKey::from_sec1_bytes(bytes)
        .map_err(|_| CoreError::Signature("invalid public key"))?;
    Ok(key_id(&vk))
}

/// Produce a compact recoverable signature over a 32-byte message hash.
pub fn sign_compact(key: &SigningKey, msg: &Hash32) -> Result<Vec<u8>, CoreError> {
    let (sig, recid) = key
        .sign_prehash_recoverable(msg.as_bytes())
        .map_err(|_| CoreError::Signature("signing failed"))?;
    let mut out = Vec::with_capacity(COMPACT_SIGNATURE_LEN);
    out.push(recid.to_byte());
    out.extend_from_slice(sig.to_bytes().as_slice());
    Ok(out)
}

/// Recover the signer's key id from a compact signature.
pub fn recover_key_id(signature: &[u8], msg: &Hash32) -> Result<KeyId, CoreError> {
    if signature.len() != COMPACT_SIGNATURE_LEN {
        return Err(CoreError::Signature("bad compact signature length"));
    }
    let recid = RecoveryId::from_byte(signature[0])
        .ok_or(CoreError::Signature("bad recovery id"))?;
    let sig = Signature::from_slice(&signature[1..])
        .map_err(|_| CoreError::Signature("malformed signature"))?;
    let vk = VerifyingKey::recover_from_prehash(msg.as_bytes(), &sig, recid)
        .map_err(|_| CoreError::Signature("public key recovery failed"))?;
    Ok(key_id(&vk))
}

/// Sign a helper block as the lottery winner (block producers only).
///
/// The `signature` field of `helper` is ignored; the caller stores the result there.
pub fn sign_helper_block(helper: &HelperBlock, key: &SigningKey) -> Result<Vec<u8>, CoreError> {
    let msg = helper_message_hash(helper)?;
    sign_compact(key, &msg)
}

/// Whether the helper's signature recovers to `winning_address`.
pub fn verify_helper_signature(helper: &HelperBlock, winning_address: &KeyId) -> bool {
    let Ok(msg) = helper_message_hash(helper) else {
        return false;
    };
    matches!(recover_key_id(&helper.signature, &msg), Ok(id) if id == *winning_address)
}
