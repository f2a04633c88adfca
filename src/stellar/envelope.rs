//! Transaction envelope codec.
//!
//! Envelopes travel as base64-encoded JSON and are opaque to everything
//! outside this module. Each envelope is bound to one network via the
//! SHA-256 of the network passphrase, so a payload signed for testnet can
//! never be queued against mainnet.

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::Asset;

/// Transactions stay valid this long after build; the network refuses
/// envelopes past their window, bounding how stale a queued payout can get.
pub const ENVELOPE_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("envelope is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("envelope payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope was built for a different network")]
    NetworkMismatch,

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Arguments of the payout contract invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutInvocation {
    pub contract_id: String,
    pub method: String,
    pub destination: String,
    pub amount_stroops: String,
    pub asset: Asset,
    pub nonce: i64,
    pub payout_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// Last four bytes of the signer's public key, hex-encoded.
    pub hint: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub network_id: String,
    pub source_account: String,
    pub sequence: i64,
    pub fee_stroops: i64,
    pub timeout_secs: u64,
    pub invocation: PayoutInvocation,
    pub signatures: Vec<EnvelopeSignature>,
}

/// Hex SHA-256 of the network passphrase, the network binding carried by
/// every envelope.
pub fn network_id(passphrase: &str) -> String {
    hex::encode(Sha256::digest(passphrase.as_bytes()))
}

/// Builds an unsigned envelope for one payout invocation.
pub fn build_unsigned(
    network_passphrase: &str,
    source_account: &str,
    sequence: i64,
    fee_stroops: i64,
    invocation: PayoutInvocation,
) -> TransactionEnvelope {
    TransactionEnvelope {
        network_id: network_id(network_passphrase),
        source_account: source_account.to_string(),
        sequence,
        fee_stroops,
        timeout_secs: ENVELOPE_TIMEOUT_SECS,
        invocation,
        signatures: Vec::new(),
    }
}

/// Decodes an envelope and verifies it was built for `network_passphrase`.
pub fn decode(xdr: &str, network_passphrase: &str) -> Result<TransactionEnvelope, EnvelopeError> {
    let envelope = decode_unverified(xdr)?;
    if envelope.network_id != network_id(network_passphrase) {
        return Err(EnvelopeError::NetworkMismatch);
    }
    Ok(envelope)
}

/// Decodes an envelope without the network check. Used internally where the
/// envelope was produced by this process moments earlier.
pub fn decode_unverified(xdr: &str) -> Result<TransactionEnvelope, EnvelopeError> {
    let bytes = base64::decode(xdr)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl TransactionEnvelope {
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(base64::encode(bytes))
    }

    /// Digest the network reports as the transaction hash: SHA-256 over the
    /// network id and the canonical signing body.
    pub fn hash_hex(&self) -> Result<String, EnvelopeError> {
        Ok(hex::encode(self.signing_payload()?))
    }

    /// Signs with a hex-encoded 32-byte ed25519 seed and appends the
    /// signature. Existing signatures are preserved.
    pub fn sign(&mut self, secret_seed_hex: &str) -> Result<(), EnvelopeError> {
        let seed_bytes = hex::decode(secret_seed_hex)
            .map_err(|e| EnvelopeError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = seed_bytes
            .try_into()
            .map_err(|_| EnvelopeError::InvalidKey("seed must be 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);

        let payload = self.signing_payload()?;
        let signature = signing_key.sign(&payload);

        let public = signing_key.verifying_key().to_bytes();
        self.signatures.push(EnvelopeSignature {
            hint: hex::encode(&public[28..]),
            signature: hex::encode(signature.to_bytes()),
        });
        Ok(())
    }

    fn signing_payload(&self) -> Result<Vec<u8>, EnvelopeError> {
        // Signatures never cover themselves.
        let mut body = self.clone();
        body.signatures.clear();

        let mut hasher = Sha256::new();
        hasher.update(self.network_id.as_bytes());
        hasher.update(serde_json::to_vec(&body)?);
        Ok(hasher.finalize().to_vec())
    }
}
