use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use aegis_core::Payload;
use aegis_crypto::sha256_hex;

/// One record of the audit chain. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, contiguous from 1
    pub sequence_number: u64,

    /// Wall-clock time of the append (ISO-8601, UTC)
    pub timestamp: DateTime<Utc>,

    /// Who caused the event
    pub actor: String,

    /// Event name, e.g. `signature.accepted`
    pub action: String,

    /// Decision packet (or other subject) the event concerns
    pub packet_id: String,

    pub payload: Payload,

    /// SHA-256 over the canonical form of every other field (hex)
    pub entry_hash: String,

    /// `entry_hash` of the predecessor; `None` only for the first entry
    pub previous_hash: Option<String>,
}

/// An event waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: String,
    pub actor: String,
    pub packet_id: String,
    pub payload: Payload,
}

impl AuditEvent {
    pub fn new(action: &str, actor: &str, packet_id: &str, payload: Payload) -> Self {
        Self {
            action: action.to_string(),
            actor: actor.to_string(),
            packet_id: packet_id.to_string(),
            payload,
        }
    }
}

/// Field order here is the canonical hashing order.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    sequence_number: u64,
    timestamp: String,
    actor: &'a str,
    action: &'a str,
    packet_id: &'a str,
    payload: &'a Payload,
    previous_hash: Option<&'a str>,
}

impl AuditEntry {
    pub(crate) fn seal(
        sequence_number: u64,
        timestamp: DateTime<Utc>,
        actor: String,
        action: String,
        packet_id: String,
        payload: Payload,
        previous_hash: Option<String>,
    ) -> Self {
        let mut entry = AuditEntry {
            sequence_number,
            timestamp,
            actor,
            action,
            packet_id,
            payload,
            entry_hash: String::new(),
            previous_hash,
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Recomputes the digest from the entry's current contents.
    pub fn compute_hash(&self) -> String {
        let canonical = CanonicalEntry {
            sequence_number: self.sequence_number,
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            actor: &self.actor,
            action: &self.action,
            packet_id: &self.packet_id,
            payload: &self.payload,
            previous_hash: self.previous_hash.as_deref(),
        };
        // Struct of strings, integers and a BTreeMap of scalars; cannot fail
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        sha256_hex(&bytes)
    }

    pub fn hash_matches(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }
}
