// TRUST CONTEXT
// Explicitly constructed owner of the three engines
//
// SAFETY INVARIANTS:
// 1. Engines are created together from one validated configuration and
//    share one audit log
// 2. Nothing here is global: callers hold the context and pass it on
// 3. Sealing a provenance epoch anchors its root into the audit log

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use aegis_audit::ImmutableAuditLog;
use aegis_core::{payload, TrustError, TrustResult};
use aegis_provenance::{EpochAnchor, ProvenanceLedger, ProvenanceVerification};
use aegis_quorum::QuorumAuthorizationEngine;

use crate::config::TrustConfig;

pub const EVIDENCE_CHECKED: &str = "evidence.checked";
pub const EPOCH_SEALED: &str = "provenance.epoch_sealed";

const LEDGER_ACTOR: &str = "provenance-ledger";

/// A reading cited as evidence for a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub data_id: String,
    pub content: Vec<u8>,
}

impl EvidenceRef {
    pub fn new(data_id: &str, content: impl Into<Vec<u8>>) -> Self {
        Self { data_id: data_id.to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCheck {
    pub data_id: String,
    pub verification: ProvenanceVerification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub packet_id: String,
    /// True only when every cited reading is provenanced
    pub trusted: bool,
    pub checks: Vec<EvidenceCheck>,
}

impl EvidenceReport {
    pub fn rejected(&self) -> impl Iterator<Item = &EvidenceCheck> {
        self.checks.iter().filter(|c| !c.verification.valid)
    }
}

pub struct TrustContext {
    config: TrustConfig,
    audit: Arc<ImmutableAuditLog>,
    provenance: ProvenanceLedger,
    quorum: QuorumAuthorizationEngine,
    closed: AtomicBool,
}

impl TrustContext {
    pub fn new(config: TrustConfig) -> TrustResult<Self> {
        config.validate()?;

        let audit = Arc::new(match &config.audit.path {
            Some(path) => ImmutableAuditLog::open(path, config.audit.sync_on_append)?,
            None => ImmutableAuditLog::in_memory(),
        });
        let provenance = ProvenanceLedger::new(config.provenance.epoch_capacity)?;
        let quorum = QuorumAuthorizationEngine::new(Arc::clone(&audit), &config.quorum)?;

        info!(
            "trust context ready: audit {} ({} entries), {} quorum graph(s)",
            config
                .audit
                .path
                .as_ref()
                .map_or("in memory".to_string(), |p| p.display().to_string()),
            audit.len(),
            quorum.graph_ids().len()
        );
        Ok(Self {
            config,
            audit,
            provenance,
            quorum,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn audit(&self) -> &ImmutableAuditLog {
        &self.audit
    }

    pub fn provenance(&self) -> &ProvenanceLedger {
        &self.provenance
    }

    pub fn quorum(&self) -> &QuorumAuthorizationEngine {
        &self.quorum
    }

    /// Checks every reading cited for `packet_id` against the ledger and
    /// records the outcome in the audit log.
    pub fn check_evidence(
        &self,
        packet_id: &str,
        evidence: &[EvidenceRef],
    ) -> TrustResult<EvidenceReport> {
        self.ensure_open()?;
        if packet_id.trim().is_empty() {
            return Err(TrustError::InvalidInput("packet id is empty".to_string()));
        }

        let checks = evidence
            .iter()
            .map(|item| -> TrustResult<EvidenceCheck> {
                Ok(EvidenceCheck {
                    data_id: item.data_id.clone(),
                    verification: self.provenance.verify_provenance(&item.data_id, &item.content)?,
                })
            })
            .collect::<TrustResult<Vec<_>>>()?;

        let report = EvidenceReport {
            packet_id: packet_id.to_string(),
            trusted: checks.iter().all(|c| c.verification.valid),
            checks,
        };
        let rejected: Vec<&str> = report.rejected().map(|c| c.data_id.as_str()).collect();
        if !rejected.is_empty() {
            warn!("packet {} cites unprovenanced evidence: {:?}", packet_id, rejected);
        }

        self.audit.append(
            EVIDENCE_CHECKED,
            LEDGER_ACTOR,
            packet_id,
            payload! {
                "checked" => report.checks.len() as u64,
                "rejected" => rejected.len() as u64,
                "rejected_ids" => rejected.join(","),
                "trusted" => report.trusted,
            },
        )?;
        Ok(report)
    }

    /// Seals the open provenance epoch and anchors its root in the audit log.
    pub fn seal_provenance_epoch(&self) -> TrustResult<Option<EpochAnchor>> {
        self.ensure_open()?;
        let Some(anchor) = self.provenance.seal_epoch()? else {
            return Ok(None);
        };
        self.audit.append(
            EPOCH_SEALED,
            LEDGER_ACTOR,
            &format!("epoch-{}", anchor.epoch),
            payload! {
                "epoch" => anchor.epoch,
                "merkle_root" => anchor.merkle_root.as_str(),
                "leaf_count" => anchor.leaf_count as u64,
            },
        )?;
        Ok(Some(anchor))
    }

    /// Flushes the audit log. Afterwards `check_evidence` and
    /// `seal_provenance_epoch` fail with `InvalidState`. The engines returned
    /// by the accessors are not gated and keep accepting writes.
    pub fn close(&self) -> TrustResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.audit.sync()?;
        info!("trust context closed with {} audit entries", self.audit.len());
        Ok(())
    }

    fn ensure_open(&self) -> TrustResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TrustError::InvalidState("trust context is closed".to_string()));
        }
        Ok(())
    }
}
