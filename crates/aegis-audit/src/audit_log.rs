// IMMUTABLE AUDIT LOG
// Append-only, hash-chained record of every action taken on a decision packet
//
// SAFETY INVARIANTS:
// 1. Sequence numbers are contiguous from 1
// 2. Entry N's previous_hash is entry N-1's entry_hash; the first entry has none
// 3. An entry is visible to readers only after the sink has persisted it
// 4. All appends go through one mutex: numbering and linkage never race
// 5. A sink that cannot undo a failed write halts the log

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use log::{error, info, warn};
use parking_lot::Mutex;

use aegis_core::{Payload, TrustError, TrustResult};

use crate::entry::{AuditEntry, AuditEvent};
use crate::sink::{load_entries, AuditSink, JsonlFileSink, MemorySink};
use crate::verify::{verify_entries, ChainVerification};

struct LogState {
    entries: Vec<AuditEntry>,
    /// packet_id -> positions in `entries`
    by_packet: HashMap<String, Vec<usize>>,
    sink: Box<dyn AuditSink>,
    halted: Option<String>,
}

impl LogState {
    fn index(&mut self, position: usize) {
        let packet_id = self.entries[position].packet_id.clone();
        self.by_packet.entry(packet_id).or_default().push(position);
    }
}

pub struct ImmutableAuditLog {
    state: Mutex<LogState>,
}

impl ImmutableAuditLog {
    /// Ephemeral log backed by memory.
    pub fn in_memory() -> Self {
        Self::from_parts(Box::new(MemorySink::default()), Vec::new())
    }

    /// Opens a file-backed log, replaying and verifying what is already there.
    ///
    /// Refuses to open a file whose tail is corrupt or whose chain is broken.
    pub fn open(path: impl AsRef<Path>, sync_on_append: bool) -> TrustResult<Self> {
        let path = path.as_ref();
        let existing = if path.exists() {
            load_entries(path)?
        } else {
            Vec::new()
        };

        let report = verify_entries(&existing);
        if !report.valid {
            let first = report.first_broken.unwrap_or_default();
            error!(
                "audit log {} failed verification at sequence {}",
                path.display(),
                first
            );
            return Err(TrustError::Integrity(format!(
                "audit chain in {} broken at sequence {}",
                path.display(),
                first
            )));
        }

        let sink = JsonlFileSink::open(path, sync_on_append)?;
        info!(
            "audit log {} opened with {} existing entries",
            path.display(),
            existing.len()
        );
        Ok(Self::from_parts(Box::new(sink), existing))
    }

    /// Builds a log over a custom sink. `existing` must already be persisted
    /// by that sink and must verify.
    pub fn with_sink(sink: Box<dyn AuditSink>, existing: Vec<AuditEntry>) -> TrustResult<Self> {
        let report = verify_entries(&existing);
        if !report.valid {
            return Err(TrustError::Integrity(format!(
                "audit chain broken at sequence {}",
                report.first_broken.unwrap_or_default()
            )));
        }
        Ok(Self::from_parts(sink, existing))
    }

    fn from_parts(sink: Box<dyn AuditSink>, entries: Vec<AuditEntry>) -> Self {
        let mut state = LogState {
            entries,
            by_packet: HashMap::new(),
            sink,
            halted: None,
        };
        for position in 0..state.entries.len() {
            state.index(position);
        }
        Self { state: Mutex::new(state) }
    }

    /// Appends an event and returns it once it is durable.
    ///
    /// An error means the event did not happen: nothing was written and the
    /// chain head is unchanged.
    pub fn append(
        &self,
        action: &str,
        actor: &str,
        packet_id: &str,
        payload: Payload,
    ) -> TrustResult<AuditEntry> {
        let mut sealed = self.append_batch(vec![AuditEvent::new(action, actor, packet_id, payload)])?;
        sealed
            .pop()
            .ok_or_else(|| TrustError::InvalidState("audit batch produced no entry".to_string()))
    }

    /// Appends consecutive events as one unit: all become durable and
    /// visible together, or none do.
    pub fn append_batch(&self, events: Vec<AuditEvent>) -> TrustResult<Vec<AuditEntry>> {
        for event in &events {
            if event.action.trim().is_empty() {
                return Err(TrustError::InvalidInput("audit action is empty".to_string()));
            }
            if event.actor.trim().is_empty() {
                return Err(TrustError::InvalidInput("audit actor is empty".to_string()));
            }
        }
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.halted {
            return Err(TrustError::Integrity(format!("audit log halted: {}", reason)));
        }

        let first_sequence = state.entries.len() as u64 + 1;
        let mut previous_hash = state.entries.last().map(|e| e.entry_hash.clone());
        let timestamp = Utc::now();
        let mut sealed = Vec::with_capacity(events.len());
        for (offset, event) in events.into_iter().enumerate() {
            let entry = AuditEntry::seal(
                first_sequence + offset as u64,
                timestamp,
                event.actor,
                event.action,
                event.packet_id,
                event.payload,
                previous_hash.take(),
            );
            previous_hash = Some(entry.entry_hash.clone());
            sealed.push(entry);
        }

        if let Err(err) = state.sink.persist(&sealed) {
            if !state.sink.is_consistent() {
                let reason = format!(
                    "sink {} left a partial record at sequence {}",
                    state.sink.describe(),
                    first_sequence
                );
                error!("{}", reason);
                state.halted = Some(reason);
            } else {
                warn!(
                    "audit append of {} entries at sequence {} not persisted: {}",
                    sealed.len(),
                    first_sequence,
                    err
                );
            }
            return Err(err);
        }

        for entry in &sealed {
            state.entries.push(entry.clone());
            let position = state.entries.len() - 1;
            state.index(position);
        }
        Ok(sealed)
    }

    /// Walks the whole chain. Breaks are reported, not raised.
    pub fn verify_chain(&self) -> ChainVerification {
        let state = self.state.lock();
        let report = verify_entries(&state.entries);
        if !report.valid {
            warn!(
                "audit chain invalid: {} error(s), first at sequence {:?}",
                report.errors.len(),
                report.first_broken
            );
        }
        report
    }

    /// Entries in insertion order, optionally filtered by action. With a
    /// limit, the most recent `limit` matches are returned.
    pub fn get_entries(&self, action: Option<&str>, limit: Option<usize>) -> Vec<AuditEntry> {
        let state = self.state.lock();
        let matching: Vec<&AuditEntry> = state
            .entries
            .iter()
            .filter(|e| action.map_or(true, |a| e.action == a))
            .collect();
        let skip = limit.map_or(0, |l| matching.len().saturating_sub(l));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn get_packet_history(&self, packet_id: &str) -> Vec<AuditEntry> {
        let state = self.state.lock();
        state
            .by_packet
            .get(packet_id)
            .map(|positions| positions.iter().map(|&p| state.entries[p].clone()).collect())
            .unwrap_or_default()
    }

    /// Last sequence number and entry hash, for external anchoring.
    pub fn head(&self) -> Option<(u64, String)> {
        let state = self.state.lock();
        state
            .entries
            .last()
            .map(|e| (e.sequence_number, e.entry_hash.clone()))
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted.is_some()
    }

    pub fn sync(&self) -> TrustResult<()> {
        self.state.lock().sink.sync()
    }
}
