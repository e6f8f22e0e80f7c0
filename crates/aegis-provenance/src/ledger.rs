// PROVENANCE LEDGER
// Certifies that a data item comes from a registered hardware root and is unmodified
//
// SAFETY INVARIANTS:
// 1. A record is accepted only with a signature that verifies against its root's key
// 2. Status is derived at every check; revocation retroactively covers old records
// 3. Revocation is one-way: a revoked source id can never be registered again
// 4. Writes for one source id are serialized; reads never take a source lock
// 5. Every record's Merkle leaf lands in exactly one ingestion epoch

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{info, warn};
use parking_lot::Mutex;

use aegis_core::{TrustError, TrustResult};
use aegis_crypto::{leaf_hash, sha256, HardwareKey};

use crate::epoch::{EpochAnchor, EpochBook, MerkleProof, MerkleVerification};
use crate::record::{
    provenance_signing_message, CorruptionReport, HardwareRoot, ProvenanceExport,
    ProvenanceRecord, ProvenanceStatus, ProvenanceVerification,
};

pub const DEFAULT_EPOCH_CAPACITY: usize = 256;

pub struct ProvenanceLedger {
    roots: DashMap<String, HardwareRoot>,
    records: DashMap<String, ProvenanceRecord>,
    source_locks: DashMap<String, Arc<Mutex<()>>>,
    epochs: Mutex<EpochBook>,
}

impl ProvenanceLedger {
    pub fn new(epoch_capacity: usize) -> TrustResult<Self> {
        if epoch_capacity == 0 {
            return Err(TrustError::Config("epoch capacity must be positive".to_string()));
        }
        Ok(Self {
            roots: DashMap::new(),
            records: DashMap::new(),
            source_locks: DashMap::new(),
            epochs: Mutex::new(EpochBook::new(epoch_capacity)),
        })
    }

    /// Write lock for `source_id`. Only created for roots that pass
    /// validation, and roots are never removed, so the lock map is bounded by
    /// the root registry.
    fn source_lock(&self, source_id: &str) -> Arc<Mutex<()>> {
        self.source_locks
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn registered_source_lock(&self, source_id: &str) -> TrustResult<Arc<Mutex<()>>> {
        self.source_locks
            .get(source_id)
            .map(|lock| Arc::clone(lock.value()))
            .ok_or_else(|| TrustError::not_found("hardware root", source_id))
    }

    pub fn register_hardware_root(&self, root: HardwareRoot) -> TrustResult<()> {
        root.validate()?;
        HardwareKey::from_hex(&root.public_key)?;

        let lock = self.source_lock(&root.source_id);
        let _guard = lock.lock();

        match self.roots.entry(root.source_id.clone()) {
            Entry::Occupied(existing) if existing.get().revoked => {
                Err(TrustError::Revoked(format!(
                    "source {} was revoked and cannot be re-registered",
                    root.source_id
                )))
            }
            Entry::Occupied(_) => Err(TrustError::duplicate("hardware root", root.source_id)),
            Entry::Vacant(slot) => {
                info!(
                    "hardware root registered: {} ({}, hw {})",
                    root.source_id, root.source_type, root.hardware_id
                );
                slot.insert(root);
                Ok(())
            }
        }
    }

    /// One-way. Returns the root as it now stands.
    pub fn revoke_hardware_root(&self, source_id: &str) -> TrustResult<HardwareRoot> {
        let lock = self.registered_source_lock(source_id)?;
        let _guard = lock.lock();

        let mut root = self
            .roots
            .get_mut(source_id)
            .ok_or_else(|| TrustError::not_found("hardware root", source_id))?;
        if !root.revoked {
            root.revoked = true;
            warn!("hardware root {} revoked; all of its records are now REVOKED", source_id);
        }
        Ok(root.clone())
    }

    pub fn get_hardware_root(&self, source_id: &str) -> Option<HardwareRoot> {
        self.roots.get(source_id).map(|r| r.clone())
    }

    /// Certifies `content` as `data_id`, produced by `source_id`.
    ///
    /// `signature` is the root's hex Ed25519 signature over
    /// [`provenance_signing_message`] of the data id and content hash.
    pub fn create_provenance_record(
        &self,
        data_id: &str,
        source_id: &str,
        content: &[u8],
        signature: &str,
    ) -> TrustResult<ProvenanceRecord> {
        if data_id.trim().is_empty() {
            return Err(TrustError::InvalidInput("data_id is empty".to_string()));
        }
        if signature.trim().is_empty() {
            return Err(TrustError::InvalidInput("hardware signature is empty".to_string()));
        }

        let lock = self.registered_source_lock(source_id)?;
        let _guard = lock.lock();

        let root = self
            .get_hardware_root(source_id)
            .ok_or_else(|| TrustError::not_found("hardware root", source_id))?;
        if root.revoked {
            return Err(TrustError::Revoked(source_id.to_string()));
        }

        let data_hash = sha256(content);
        let content_hash = hex::encode(data_hash);
        HardwareKey::from_hex(&root.public_key)?
            .verify(&provenance_signing_message(data_id, &content_hash), signature)?;

        let mut epochs = self.epochs.lock();
        let (epoch, leaf_index) = epochs.next_slot();
        let record = ProvenanceRecord {
            data_id: data_id.to_string(),
            source_id: source_id.to_string(),
            content_hash,
            hardware_signature: signature.trim().to_string(),
            created_at: Utc::now(),
            epoch,
            leaf_index,
        };

        match self.records.entry(data_id.to_string()) {
            Entry::Occupied(_) => return Err(TrustError::duplicate("provenance record", data_id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        epochs.push(leaf_hash(data_id, &data_hash))?;

        info!("provenance record {} created from {} (epoch {})", data_id, source_id, epoch);
        Ok(record)
    }

    pub fn get_record(&self, data_id: &str) -> Option<ProvenanceRecord> {
        self.records.get(data_id).map(|r| r.clone())
    }

    pub fn verify_provenance(
        &self,
        data_id: &str,
        content: &[u8],
    ) -> TrustResult<ProvenanceVerification> {
        if data_id.trim().is_empty() {
            return Err(TrustError::InvalidInput("data_id is empty".to_string()));
        }

        let record = match self.get_record(data_id) {
            Some(record) => record,
            None => {
                return Ok(ProvenanceVerification::rejected(
                    ProvenanceStatus::Unprovenanced,
                    "unknown data_id",
                ))
            }
        };

        if self.is_revoked(&record.source_id) {
            return Ok(ProvenanceVerification::rejected(
                ProvenanceStatus::Revoked,
                "hardware root revoked",
            ));
        }

        if hex::encode(sha256(content)) != record.content_hash {
            warn!("provenance check for {} failed: hash mismatch", data_id);
            return Ok(ProvenanceVerification::rejected(
                ProvenanceStatus::Tampered,
                "hash mismatch",
            ));
        }

        Ok(ProvenanceVerification::provenanced())
    }

    /// True when `content` cannot be traced to a live hardware root unmodified.
    pub fn detect_synthetic_corruption(
        &self,
        data_id: &str,
        content: &[u8],
    ) -> TrustResult<CorruptionReport> {
        let outcome = self.verify_provenance(data_id, content)?;
        Ok(CorruptionReport {
            data_id: data_id.to_string(),
            corrupted: !outcome.valid,
            status: outcome.status,
            reason: outcome.reason,
        })
    }

    fn is_revoked(&self, source_id: &str) -> bool {
        // A record whose root disappeared is treated as revoked
        self.roots.get(source_id).map_or(true, |r| r.revoked)
    }

    /// Seals the open ingestion epoch and anchors its root.
    pub fn seal_epoch(&self) -> TrustResult<Option<EpochAnchor>> {
        self.epochs.lock().seal()
    }

    pub fn epoch_anchor(&self, epoch: u64) -> Option<EpochAnchor> {
        self.epochs.lock().anchor(epoch).cloned()
    }

    pub fn epoch_anchors(&self) -> Vec<EpochAnchor> {
        self.epochs.lock().anchors()
    }

    /// Issues an inclusion proof for `data_id`, sealing its epoch if it is
    /// still open.
    pub fn create_merkle_proof_per_data_point(
        &self,
        data_id: &str,
        content: &[u8],
        issued_at: DateTime<Utc>,
    ) -> TrustResult<MerkleProof> {
        let record = self
            .get_record(data_id)
            .ok_or_else(|| TrustError::not_found("provenance record", data_id))?;
        if self.is_revoked(&record.source_id) {
            return Err(TrustError::Revoked(record.source_id));
        }

        let data_hash = sha256(content);
        if hex::encode(data_hash) != record.content_hash {
            return Err(TrustError::Integrity(format!("data modified: {}", data_id)));
        }

        let mut epochs = self.epochs.lock();
        if epochs.is_open(record.epoch) {
            epochs.seal()?;
        }
        let (proof_path, root) = epochs.prove(record.epoch, record.leaf_index)?;

        Ok(MerkleProof {
            data_id: record.data_id,
            epoch: record.epoch,
            data_hash: record.content_hash,
            leaf_hash: hex::encode(leaf_hash(data_id, &data_hash)),
            proof_path,
            merkle_root: hex::encode(root),
            issued_at,
        })
    }

    /// Checks the proof against `content` and against this ledger's anchor
    /// for the proof's epoch.
    pub fn verify_merkle_proof_per_data_point(
        &self,
        proof: &MerkleProof,
        content: &[u8],
    ) -> TrustResult<MerkleVerification> {
        let outcome = proof.verify(content)?;
        if !outcome.valid {
            return Ok(outcome);
        }

        let anchored = self.epoch_anchor(proof.epoch);
        match anchored {
            Some(anchor) if anchor.merkle_root == proof.merkle_root => Ok(outcome),
            _ => Ok(MerkleVerification::failed("merkle root not anchored for epoch")),
        }
    }

    /// Every record with its current derived status.
    pub fn export_records(&self) -> Vec<ProvenanceExport> {
        let mut exported: Vec<ProvenanceExport> = self
            .records
            .iter()
            .map(|r| ProvenanceExport {
                data_id: r.data_id.clone(),
                source_id: r.source_id.clone(),
                content_hash: r.content_hash.clone(),
                status: if self.is_revoked(&r.source_id) {
                    ProvenanceStatus::Revoked
                } else {
                    ProvenanceStatus::Provenanced
                },
                created_at: r.created_at,
            })
            .collect();
        exported.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.data_id.cmp(&b.data_id))
        });
        exported
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
