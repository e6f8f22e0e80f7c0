pub mod hashing;
pub mod merkle;
pub mod signature;

pub use hashing::{decode_hash, sha256, sha256_hex, sha3_256, Hash32};
pub use merkle::{fold_path, leaf_hash, node_hash, MerkleTree, ProofStep, Side};
pub use signature::HardwareKey;
