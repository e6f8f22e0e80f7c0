use serde::{Deserialize, Serialize};

use crate::entry::AuditEntry;

/// A single break found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainError {
    pub sequence_number: u64,
    pub reason: String,
}

/// Outcome of a chain walk. Invalid chains are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: usize,
    pub errors: Vec<ChainError>,
    /// Sequence position of the first break
    pub first_broken: Option<u64>,
    /// Entries before the first break; nothing at or after it is trusted
    pub trusted_entries: usize,
}

/// Walks `entries` in order checking numbering, linkage and digests.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
    let mut errors = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let position = index as u64 + 1;

        if entry.sequence_number != position {
            errors.push(ChainError {
                sequence_number: position,
                reason: format!(
                    "sequence number {} found where {} was expected",
                    entry.sequence_number, position
                ),
            });
        }

        let expected_previous = index.checked_sub(1).map(|i| entries[i].entry_hash.as_str());
        if entry.previous_hash.as_deref() != expected_previous {
            let reason = match expected_previous {
                None => "first entry must not reference a previous hash".to_string(),
                Some(_) => "previous_hash does not match predecessor's entry_hash".to_string(),
            };
            errors.push(ChainError { sequence_number: position, reason });
        }

        if !entry.hash_matches() {
            errors.push(ChainError {
                sequence_number: position,
                reason: "entry_hash does not match entry contents".to_string(),
            });
        }
    }

    let first_broken = errors.iter().map(|e| e.sequence_number).min();
    let trusted_entries = first_broken
        .map(|seq| (seq - 1) as usize)
        .unwrap_or(entries.len());

    ChainVerification {
        valid: errors.is_empty(),
        entries_checked: entries.len(),
        errors,
        first_broken,
        trusted_entries,
    }
}
