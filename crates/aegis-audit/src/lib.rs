//! Tamper-evident audit trail for the Aegis trust core.
//!
//! Every action taken on a decision packet is appended here before the action
//! is considered to have happened. Entries are hash-chained, so any later edit,
//! insertion or deletion is detected by [`ImmutableAuditLog::verify_chain`] or,
//! offline, by [`verify_entries`] over a loaded file.

pub mod entry;
pub mod audit_log;
pub mod sink;
pub mod verify;

pub use entry::{AuditEntry, AuditEvent};
pub use audit_log::ImmutableAuditLog;
pub use sink::{load_entries, AuditSink, JsonlFileSink, MemorySink};
pub use verify::{verify_entries, ChainError, ChainVerification};
