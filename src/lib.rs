//! Aegis trust core.
//!
//! Wires the quorum authorization engine, the immutable audit log and the
//! provenance ledger into one explicitly constructed [`TrustContext`].

pub mod config;
pub mod context;
pub mod logging;

pub use config::{AuditConfig, LoggingConfig, ProvenanceConfig, TrustConfig};
pub use context::{EvidenceCheck, EvidenceRef, EvidenceReport, TrustContext};

pub use aegis_core::{Payload, Scalar, TrustError, TrustErrorKind, TrustResult};

pub use aegis_audit as audit;
pub use aegis_crypto as crypto;
pub use aegis_provenance as provenance;
pub use aegis_quorum as quorum;
