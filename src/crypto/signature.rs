//! Block signatures
//! 
//! A proof-of-stake block is signed by the key that owns the coinstake
//! output. Signatures are DER-encoded ECDSA over secp256k1, signing the raw
//! 32 bytes of the block hash.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use thiserror::Error;

use super::Hash;

const OP_CHECKSIG: u8 = 0xac;

/// Signature errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Output script is not pay-to-pubkey")]
    NotPayToPubkey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Malformed signature encoding")]
    MalformedSignature,
    #[error("Signature does not verify")]
    InvalidSignature,
    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Extract the public key from a `<pubkey> OP_CHECKSIG` script
pub fn extract_pay_to_pubkey(script: &[u8]) -> Option<&[u8]> {
    let (&push, rest) = script.split_first()?;
    let key_len = push as usize;
    if key_len != 33 && key_len != 65 {
        return None;
    }
    if rest.len() != key_len + 1 || rest[key_len] != OP_CHECKSIG {
        return None;
    }
    Some(&rest[..key_len])
}

/// Build a `<pubkey> OP_CHECKSIG` script
pub fn pay_to_pubkey_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    script.push(pubkey.len() as u8);
    script.extend_from_slice(pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// Verify a DER signature over `hash` by the key in a pay-to-pubkey script
pub fn verify_hash_signature(
    pubkey_script: &[u8],
    hash: &Hash,
    der_signature: &[u8],
) -> Result<(), SignatureError> {
    let pubkey = extract_pay_to_pubkey(pubkey_script).ok_or(SignatureError::NotPayToPubkey)?;
    let key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature =
        Signature::from_der(der_signature).map_err(|_| SignatureError::MalformedSignature)?;

    key.verify_prehash(&hash.0, &signature)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Sign `hash` with a raw secret key, returning (DER signature, compressed pubkey)
pub fn sign_hash(secret: &[u8; 32], hash: &Hash) -> Result<(Vec<u8>, Vec<u8>), SignatureError> {
    let key = SigningKey::from_slice(secret).map_err(|_| SignatureError::InvalidPrivateKey)?;
    let signature: Signature = key
        .sign_prehash(&hash.0)
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
    let pubkey = key.verifying_key().to_encoded_point(true);

    Ok((signature.to_der().as_bytes().to_vec(), pubkey.as_bytes().to_vec()))
}
