use sha2::Sha256;
use sha3::{Digest, Sha3_256};

use aegis_core::{TrustError, TrustResult};

pub type Hash32 = [u8; 32];

/// SHA-256 digest of raw bytes.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA3-256 over a sequence of byte slices, fed in order.
pub fn sha3_256(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Decodes a 64-character hex string into a 32-byte digest.
pub fn decode_hash(field: &str, value: &str) -> TrustResult<Hash32> {
    let bytes = hex::decode(value)
        .map_err(|e| TrustError::InvalidInput(format!("{}: {}", field, e)))?;
    <Hash32>::try_from(bytes.as_slice()).map_err(|_| {
        TrustError::InvalidInput(format!("{}: expected 32 bytes, got {}", field, bytes.len()))
    })
}
