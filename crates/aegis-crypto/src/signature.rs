/// Hardware Signature Verification
///
/// Hardware roots register an Ed25519 verifying key (hex). Every reading they
/// certify carries a detached signature over a canonical message; the ledger
/// checks it here before accepting the record.

use ed25519_dalek::{Signature, VerifyingKey};
use log::debug;

use aegis_core::{TrustError, TrustResult};

/// Parsed verifying key of a hardware root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareKey {
    key: VerifyingKey,
}

impl HardwareKey {
    /// Parses a hex-encoded 32-byte Ed25519 public key.
    pub fn from_hex(public_key: &str) -> TrustResult<Self> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| TrustError::InvalidInput(format!("public key: {}", e)))?;
        let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            TrustError::InvalidInput(format!("public key: expected 32 bytes, got {}", bytes.len()))
        })?;
        let key = VerifyingKey::from_bytes(&raw)
            .map_err(|e| TrustError::InvalidInput(format!("public key: {}", e)))?;
        Ok(Self { key })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    /// Verifies a hex-encoded detached signature over `message`.
    ///
    /// Malformed signatures are `InvalidInput`; well-formed signatures that do
    /// not verify are `Integrity`.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> TrustResult<()> {
        let bytes = hex::decode(signature_hex.trim())
            .map_err(|e| TrustError::InvalidInput(format!("signature: {}", e)))?;
        let signature = Signature::from_slice(&bytes)
            .map_err(|e| TrustError::InvalidInput(format!("signature: {}", e)))?;

        self.key.verify_strict(message, &signature).map_err(|_| {
            debug!("signature rejected for key {}", self.to_hex());
            TrustError::Integrity("hardware signature does not verify".to_string())
        })
    }
}
