//! Key material and transaction signing for agent and admin wallets.
//!
//! Address derivation is done by hand (secp256k1 public key → keccak256 →
//! last 20 bytes) so that it stays a pure function of the private key.
//! Transaction signing goes through alloy's local signer and is encoded as
//! an EIP-2718 envelope ready for `eth_sendRawTransaction`.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use tiny_keccak::{Hasher, Keccak};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("randomness source unavailable: {0}")]
    Entropy(String),
    #[error("failed to read private key from {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("signer error: {0}")]
    Signer(#[from] alloy_signer::Error),
}

/// Compute keccak256 hash
fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Convert a hex string (with or without 0x prefix) to bytes
fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, SigningError> {
    let s = hex_str.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

fn signing_key(private_key_hex: &str) -> Result<SigningKey, SigningError> {
    let bytes = hex_to_bytes(private_key_hex)?;
    if bytes.len() != 32 {
        return Err(SigningError::InvalidKey(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Load a private key from a file
pub fn load_private_key(path: &str) -> Result<String, SigningError> {
    let key = std::fs::read_to_string(path)
        .map_err(|source| SigningError::KeyFile {
            path: path.to_string(),
            source,
        })?
        .trim()
        .to_string();
    Ok(key)
}

/// Derive the EIP-55 checksummed address for a private key.
///
/// Uncompressed secp256k1 public key without the 0x04 tag, keccak256, last
/// 20 bytes.
pub fn derive_address(private_key_hex: &str) -> Result<String, SigningError> {
    let key = signing_key(private_key_hex)?;
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]).to_checksum(None))
}

/// Generate a fresh private key from the OS randomness source.
pub fn random_private_key() -> Result<String, SigningError> {
    let mut bytes = [0u8; 32];
    loop {
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SigningError::Entropy(e.to_string()))?;
        // Zero and values >= the curve order are not valid scalars; draw again.
        if SigningKey::from_slice(&bytes).is_ok() {
            return Ok(format!("0x{}", hex::encode(bytes)));
        }
    }
}

/// Parse a hex private key into an alloy signer
pub fn parse_signer(private_key_hex: &str) -> Result<PrivateKeySigner, SigningError> {
    private_key_hex
        .trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Sign a legacy (EIP-155) transaction and return the raw encoded bytes.
pub fn sign_legacy(signer: &PrivateKeySigner, tx: TxLegacy) -> Result<Vec<u8>, SigningError> {
    let signature = signer.sign_hash_sync(&tx.signature_hash())?;
    let nonce = tx.nonce;
    let envelope = TxEnvelope::from(tx.into_signed(signature));
    let raw = envelope.encoded_2718();

    debug!(
        from = %signer.address(),
        nonce = nonce,
        tx_hash = %envelope.tx_hash(),
        "signed transaction"
    );

    Ok(raw)
}
