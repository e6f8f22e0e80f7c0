/// Batched Merkle Tree
///
/// One tree is built per ingestion epoch from the leaf hashes of every data
/// point in that epoch. Inclusion paths reference the real sibling hashes of
/// the shared tree, so a proof shows membership among the other data points.
///
/// SAFETY GUARANTEES:
/// - Leaves and interior nodes are domain-separated (0x00 / 0x01 prefix)
/// - An odd node at any level is paired with itself
/// - Tree is immutable once built
/// - Every path step records which side the sibling sits on

use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};

use crate::hashing::{decode_hash, sha3_256, Hash32};

const LEAF_PREFIX: &[u8] = &[0x00];
const NODE_PREFIX: &[u8] = &[0x01];

/// Leaf hash binding a data identifier to the digest of its content.
pub fn leaf_hash(data_id: &str, data_hash: &Hash32) -> Hash32 {
    let id_len = (data_id.len() as u64).to_be_bytes();
    sha3_256(&[LEAF_PREFIX, &id_len, data_id.as_bytes(), data_hash])
}

pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    sha3_256(&[NODE_PREFIX, left, right])
}

/// Position of a sibling relative to the running hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    /// Sibling hash (hex)
    pub hash: String,

    /// Which side the sibling is on
    pub side: Side,
}

/// Recomputes the root from a leaf and its path.
///
/// Fails only on malformed hex in the path.
pub fn fold_path(leaf: Hash32, path: &[ProofStep]) -> TrustResult<Hash32> {
    let mut current = leaf;
    for (depth, step) in path.iter().enumerate() {
        let sibling = decode_hash(&format!("proof_path[{}]", depth), &step.hash)?;
        current = match step.side {
            Side::Left => node_hash(&sibling, &current),
            Side::Right => node_hash(&current, &sibling),
        };
    }
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] holds the leaves, the last level holds the root
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Builds the tree bottom-up from leaf hashes.
    pub fn build(leaves: Vec<Hash32>) -> TrustResult<Self> {
        if leaves.is_empty() {
            return Err(TrustError::InvalidInput(
                "cannot build a Merkle tree without leaves".to_string(),
            ));
        }

        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash32> = current
                .chunks(2)
                .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> Hash32 {
        // build() guarantees at least one non-empty level
        self.levels[self.levels.len() - 1][0]
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    pub fn leaf(&self, index: usize) -> Option<&Hash32> {
        self.levels[0].get(index)
    }

    /// Sibling path from leaf `index` up to (not including) the root.
    pub fn prove(&self, index: usize) -> TrustResult<Vec<ProofStep>> {
        if index >= self.len() {
            return Err(TrustError::not_found("merkle leaf", index.to_string()));
        }

        let mut path = Vec::with_capacity(self.levels.len() - 1);
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if position % 2 == 0 {
                // Right sibling, or ourselves when this is the odd node out
                let sibling = level.get(position + 1).unwrap_or(&level[position]);
                ProofStep { hash: hex::encode(sibling), side: Side::Right }
            } else {
                ProofStep { hash: hex::encode(level[position - 1]), side: Side::Left }
            };
            path.push(step);
            position /= 2;
        }
        Ok(path)
    }
}
