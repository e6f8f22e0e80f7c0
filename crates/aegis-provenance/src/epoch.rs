/// Ingestion Epochs & Per-Data-Point Proofs
///
/// Records are batched into epochs. Sealing an epoch builds one Merkle tree
/// over all of its leaves and anchors the root; every proof issued for a data
/// point in that epoch walks real sibling hashes of the shared tree.
///
/// SAFETY GUARANTEES:
/// - An epoch is sealed exactly once; its anchor never changes afterwards
/// - Proof verification recomputes the leaf from the supplied content

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};
use aegis_crypto::{decode_hash, fold_path, leaf_hash, sha256, Hash32, MerkleTree, ProofStep};

/// Root anchored for a sealed epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochAnchor {
    pub epoch: u64,
    /// Hex
    pub merkle_root: String,
    pub leaf_count: usize,
    pub sealed_at: DateTime<Utc>,
}

/// Self-contained inclusion proof for one data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub data_id: String,
    pub epoch: u64,
    /// SHA-256 of the content (hex)
    pub data_hash: String,
    pub leaf_hash: String,
    pub proof_path: Vec<ProofStep>,
    pub merkle_root: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleVerification {
    pub valid: bool,
    pub reason: Option<String>,
}

impl MerkleVerification {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    pub(crate) fn failed(reason: &str) -> Self {
        Self { valid: false, reason: Some(reason.to_string()) }
    }
}

impl MerkleProof {
    /// Checks the proof against `content` without consulting any ledger.
    ///
    /// Returns an invalid outcome on divergence; fails only when the proof
    /// itself is malformed.
    pub fn verify(&self, content: &[u8]) -> TrustResult<MerkleVerification> {
        if self.data_id.trim().is_empty() {
            return Err(TrustError::InvalidInput("proof data_id is empty".to_string()));
        }
        let claimed_data = decode_hash("data_hash", &self.data_hash)?;
        let claimed_leaf = decode_hash("leaf_hash", &self.leaf_hash)?;
        let claimed_root = decode_hash("merkle_root", &self.merkle_root)?;

        let data_hash = sha256(content);
        if data_hash != claimed_data || leaf_hash(&self.data_id, &data_hash) != claimed_leaf {
            return Ok(MerkleVerification::failed("data modified"));
        }

        if fold_path(claimed_leaf, &self.proof_path)? != claimed_root {
            return Ok(MerkleVerification::failed("proof path does not reach merkle root"));
        }
        Ok(MerkleVerification::ok())
    }
}

struct SealedEpoch {
    tree: MerkleTree,
    anchor: EpochAnchor,
}

/// Epoch bookkeeping owned by the ledger.
pub(crate) struct EpochBook {
    capacity: usize,
    open_epoch: u64,
    open_leaves: Vec<Hash32>,
    sealed: BTreeMap<u64, SealedEpoch>,
}

impl EpochBook {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            open_epoch: 0,
            open_leaves: Vec::new(),
            sealed: BTreeMap::new(),
        }
    }

    /// Position the next leaf will take.
    pub(crate) fn next_slot(&self) -> (u64, usize) {
        (self.open_epoch, self.open_leaves.len())
    }

    /// Adds a leaf to the open epoch, sealing it when full.
    pub(crate) fn push(&mut self, leaf: Hash32) -> TrustResult<Option<EpochAnchor>> {
        self.open_leaves.push(leaf);
        if self.open_leaves.len() >= self.capacity {
            return self.seal();
        }
        Ok(None)
    }

    /// Seals the open epoch. An empty open epoch is left alone.
    pub(crate) fn seal(&mut self) -> TrustResult<Option<EpochAnchor>> {
        if self.open_leaves.is_empty() {
            return Ok(None);
        }

        let leaves = std::mem::take(&mut self.open_leaves);
        let leaf_count = leaves.len();
        let tree = MerkleTree::build(leaves)?;
        let anchor = EpochAnchor {
            epoch: self.open_epoch,
            merkle_root: hex::encode(tree.root()),
            leaf_count,
            sealed_at: Utc::now(),
        };
        info!(
            "provenance epoch {} sealed: {} leaves, root {}",
            anchor.epoch, leaf_count, anchor.merkle_root
        );

        self.sealed.insert(self.open_epoch, SealedEpoch { tree, anchor: anchor.clone() });
        self.open_epoch += 1;
        Ok(Some(anchor))
    }

    pub(crate) fn is_open(&self, epoch: u64) -> bool {
        epoch == self.open_epoch
    }

    pub(crate) fn anchor(&self, epoch: u64) -> Option<&EpochAnchor> {
        self.sealed.get(&epoch).map(|s| &s.anchor)
    }

    pub(crate) fn anchors(&self) -> Vec<EpochAnchor> {
        self.sealed.values().map(|s| s.anchor.clone()).collect()
    }

    /// Path and root for a leaf of a sealed epoch.
    pub(crate) fn prove(&self, epoch: u64, index: usize) -> TrustResult<(Vec<ProofStep>, Hash32)> {
        let sealed = self
            .sealed
            .get(&epoch)
            .ok_or_else(|| TrustError::not_found("sealed epoch", epoch.to_string()))?;
        Ok((sealed.tree.prove(index)?, sealed.tree.root()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(i: u8) -> Hash32 {
        leaf_hash(&format!("d-{}", i), &sha256(&[i]))
    }

    #[test]
    fn test_book_seals_when_full() {
        let mut book = EpochBook::new(2);
        assert!(book.push(leaf(1)).unwrap().is_none());
        let anchor = book.push(leaf(2)).unwrap().unwrap();
        assert_eq!(anchor.epoch, 0);
        assert_eq!(anchor.leaf_count, 2);
        assert_eq!(book.next_slot(), (1, 0));
        assert!(!book.is_open(0));
    }

    #[test]
    fn test_sealing_empty_epoch_is_noop() {
        let mut book = EpochBook::new(4);
        assert!(book.seal().unwrap().is_none());
        assert_eq!(book.next_slot(), (0, 0));
    }

    #[test]
    fn test_proof_of_unsealed_epoch_is_not_found() {
        let mut book = EpochBook::new(4);
        book.push(leaf(1)).unwrap();
        assert!(book.prove(0, 0).is_err());
        book.seal().unwrap();
        let (path, root) = book.prove(0, 0).unwrap();
        assert!(path.is_empty());
        assert_eq!(root, leaf(1));
    }

    #[test]
    fn test_malformed_proof_raises() {
        let proof = MerkleProof {
            data_id: "d-1".to_string(),
            epoch: 0,
            data_hash: "xyz".to_string(),
            leaf_hash: String::new(),
            proof_path: Vec::new(),
            merkle_root: String::new(),
            issued_at: Utc::now(),
        };
        assert!(proof.verify(b"content").is_err());
    }
}
