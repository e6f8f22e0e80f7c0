use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};

/// A registered hardware source. Immutable apart from the one-way revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareRoot {
    pub source_id: String,

    /// e.g. `scada-sensor`, `weather-station`
    pub source_type: String,

    pub hardware_id: String,

    /// Ed25519 verifying key (hex)
    pub public_key: String,

    pub certificate: String,

    pub issued_at: DateTime<Utc>,

    pub revoked: bool,
}

impl HardwareRoot {
    pub fn new(
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        hardware_id: impl Into<String>,
        public_key: impl Into<String>,
        certificate: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_type: source_type.into(),
            hardware_id: hardware_id.into(),
            public_key: public_key.into(),
            certificate: certificate.into(),
            issued_at: Utc::now(),
            revoked: false,
        }
    }

    pub(crate) fn validate(&self) -> TrustResult<()> {
        let fields = [
            ("source_id", &self.source_id),
            ("source_type", &self.source_type),
            ("hardware_id", &self.hardware_id),
            ("public_key", &self.public_key),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(TrustError::InvalidInput(format!(
                    "hardware root field {} is empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Derived provenance status. Never stored; recomputed on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvenanceStatus {
    Provenanced,
    Unprovenanced,
    Tampered,
    Revoked,
}

impl fmt::Display for ProvenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProvenanceStatus::Provenanced => "PROVENANCED",
            ProvenanceStatus::Unprovenanced => "UNPROVENANCED",
            ProvenanceStatus::Tampered => "TAMPERED",
            ProvenanceStatus::Revoked => "REVOKED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub data_id: String,
    pub source_id: String,
    /// SHA-256 of the content (hex)
    pub content_hash: String,
    pub hardware_signature: String,
    pub created_at: DateTime<Utc>,
    /// Ingestion epoch holding this record's Merkle leaf
    pub epoch: u64,
    /// Leaf position inside that epoch
    pub leaf_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceVerification {
    pub valid: bool,
    pub status: ProvenanceStatus,
    pub reason: Option<String>,
}

impl ProvenanceVerification {
    pub(crate) fn provenanced() -> Self {
        Self { valid: true, status: ProvenanceStatus::Provenanced, reason: None }
    }

    pub(crate) fn rejected(status: ProvenanceStatus, reason: &str) -> Self {
        Self { valid: false, status, reason: Some(reason.to_string()) }
    }
}

/// Explicit anti-fabrication verdict for a machine-generated reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptionReport {
    pub data_id: String,
    pub corrupted: bool,
    pub status: ProvenanceStatus,
    pub reason: Option<String>,
}

/// Export view of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceExport {
    pub data_id: String,
    pub source_id: String,
    pub content_hash: String,
    pub status: ProvenanceStatus,
    pub created_at: DateTime<Utc>,
}

/// Exact bytes a hardware root signs to certify `data_id` with `content_hash`.
pub fn provenance_signing_message(data_id: &str, content_hash: &str) -> Vec<u8> {
    format!("aegis-provenance:v1:{}:{}", data_id, content_hash).into_bytes()
}
