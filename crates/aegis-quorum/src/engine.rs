// QUORUM AUTHORIZATION ENGINE
// Decides when a proposed emergency action may execute
//
// SAFETY INVARIANTS:
// 1. The engine holds no packet state: a packet is a value the caller passes
//    in, and the audit log is the only record of what happened to it
// 2. Submissions for one packet run in one exclusive critical section, and
//    stale copies are caught up from the audit log inside it
// 3. For packets created here the audit log is the only source of
//    signatures, context and policy; a copy that disagrees is an Integrity
//    error
// 4. A role or signer signs a packet at most once; duplicates are rejected
// 5. A signature is accepted only once its audit entry is durable; the
//    signature that crosses threshold is committed with its authorization
// 6. READY -> AUTHORIZED and READY -> REJECTED are the only transitions
// 7. Every condition is evaluated fail-closed
// 8. A packet's lock entry is dropped once it settles; a caller still
//    waiting on the dropped lock finds the settlement in the log

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;

use aegis_audit::{AuditEntry, AuditEvent, ImmutableAuditLog};
use aegis_core::{payload, Scalar, TrustError, TrustResult};
use aegis_crypto::sha256_hex;

use crate::condition::DecisionContext;
use crate::graph::{GraphRegistry, QuorumEvaluation, QuorumGraph};
use crate::packet::{Approval, DecisionPacket, MultiSig, PacketStatus, Rejection, SignatureRecord};
use crate::policy::{role_policy, Incident, Playbook, PolicyMode, RiskTable, SignaturePolicy};
use crate::settings::QuorumSettings;

pub const PACKET_CREATED: &str = "packet.created";
pub const SIGNATURE_ACCEPTED: &str = "signature.accepted";
pub const CONTEXT_UPDATED: &str = "packet.context_updated";
pub const PACKET_AUTHORIZED: &str = "packet.authorized";
pub const PACKET_REJECTED: &str = "packet.rejected";

const ENGINE_ACTOR: &str = "quorum-engine";
/// Creation entries carry the initial decision context under this prefix
const CONTEXT_PREFIX: &str = "context.";

pub struct QuorumAuthorizationEngine {
    audit: Arc<ImmutableAuditLog>,
    graphs: GraphRegistry,
    risk: RiskTable,
    scales: BTreeMap<String, Vec<String>>,
    /// One mutex per unsettled packet id
    action_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl QuorumAuthorizationEngine {
    /// Builds the engine and registers every graph named in `settings`.
    pub fn new(audit: Arc<ImmutableAuditLog>, settings: &QuorumSettings) -> TrustResult<Self> {
        settings.validate()?;
        let engine = Self {
            audit,
            graphs: GraphRegistry::new(),
            risk: settings.risk_table(),
            scales: settings.ordinal_scales.clone(),
            action_locks: DashMap::new(),
        };
        for graph in &settings.graphs {
            engine.graphs.register(graph.clone())?;
        }
        Ok(engine)
    }

    pub fn audit_log(&self) -> &Arc<ImmutableAuditLog> {
        &self.audit
    }

    pub fn register_graph(&self, graph: QuorumGraph) -> TrustResult<Arc<QuorumGraph>> {
        self.graphs.register(graph)
    }

    pub fn graph(&self, graph_id: &str) -> TrustResult<Arc<QuorumGraph>> {
        self.graphs.get(graph_id)
    }

    pub fn graph_ids(&self) -> Vec<String> {
        self.graphs.ids()
    }

    /// Signature policy for a playbook responding to an incident.
    pub fn determine_policy(
        &self,
        playbook: &Playbook,
        incident: &Incident,
    ) -> TrustResult<SignaturePolicy> {
        if playbook.id.trim().is_empty() {
            return Err(TrustError::InvalidInput("playbook id is empty".to_string()));
        }

        let policy = match &playbook.quorum_graph {
            Some(graph_id) => {
                let graph = self.graphs.get(graph_id)?;
                SignaturePolicy {
                    mode: PolicyMode::QuorumGraph,
                    required: graph.nodes.len(),
                    threshold: graph.threshold as usize,
                    minimum_sign_off: false,
                    minimum_sign_off_role: None,
                    graph_id: Some(graph.graph_id.clone()),
                    rule: None,
                }
            }
            None => role_policy(&self.risk, playbook, incident)?,
        };
        debug!(
            "policy for playbook {} / incident {}: {} {}-of-{}",
            playbook.id, incident.id, policy.mode, policy.threshold, policy.required
        );
        Ok(policy)
    }

    /// Issues a READY packet and records its creation.
    pub fn create_packet(
        &self,
        playbook: &Playbook,
        incident: &Incident,
        created_ts: Option<DateTime<Utc>>,
    ) -> TrustResult<DecisionPacket> {
        if incident.id.trim().is_empty() {
            return Err(TrustError::InvalidInput("incident id is empty".to_string()));
        }
        let policy = self.determine_policy(playbook, incident)?;
        let created_ts = created_ts.unwrap_or_else(Utc::now);

        let approvals = match &policy.graph_id {
            Some(graph_id) => self
                .graphs
                .get(graph_id)?
                .nodes
                .iter()
                .map(|node| Approval {
                    role: node.node_id.clone(),
                    required: node.required,
                    minimum_sign_off: false,
                    signer_id: None,
                    signed_ts: None,
                })
                .collect(),
            None => playbook
                .roles
                .iter()
                .map(|role| Approval {
                    role: role.role.clone(),
                    required: role.required,
                    minimum_sign_off: role.minimum_sign_off,
                    signer_id: None,
                    signed_ts: None,
                })
                .collect(),
        };

        let id = format!(
            "pkt-{}",
            &sha256_hex(
                format!("{}\n{}\n{}", playbook.id, incident.id, timestamp_text(&created_ts))
                    .as_bytes()
            )[..16]
        );
        if !self.audit.get_packet_history(&id).is_empty() {
            return Err(TrustError::duplicate("decision packet", id));
        }

        let packet = DecisionPacket {
            id,
            created_ts,
            status: PacketStatus::Ready,
            playbook_id: playbook.id.clone(),
            incident_id: incident.id.clone(),
            approvals,
            multi_sig: MultiSig::from_policy(&policy),
            signatures: Vec::new(),
            context: incident.context.clone(),
            first_approval_ts: None,
            authorized_ts: None,
            time_to_authorize: None,
            rejection: None,
        };

        let mut created = payload! {
            "playbook_id" => packet.playbook_id.as_str(),
            "incident_id" => packet.incident_id.as_str(),
            "mode" => packet.multi_sig.effective_mode().to_string(),
            "required" => policy.required as u64,
            "threshold" => policy.threshold as u64,
            "created_ts" => timestamp_text(&created_ts),
            "policy_digest" => policy_digest(&packet)?,
        };
        for (field, value) in &packet.context {
            created.insert(format!("{}{}", CONTEXT_PREFIX, field), value.clone());
        }
        self.audit.append(PACKET_CREATED, ENGINE_ACTOR, &packet.id, created)?;
        info!(
            "packet {} created for playbook {} ({} {}-of-{})",
            packet.id, packet.playbook_id, policy.mode, policy.threshold, policy.required
        );
        Ok(packet)
    }

    /// Records `signer_id` signing `role` and returns the updated packet.
    ///
    /// The caller's packet is never modified; on error nothing was recorded.
    pub fn submit_signature(
        &self,
        packet: &DecisionPacket,
        role: &str,
        signer_id: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> TrustResult<DecisionPacket> {
        if role.trim().is_empty() {
            return Err(TrustError::InvalidInput("signature role is empty".to_string()));
        }
        if signer_id.trim().is_empty() {
            return Err(TrustError::InvalidInput("signer id is empty".to_string()));
        }

        let lock = self.lock_for(&packet.id);
        let _guard = lock.lock();

        let mut next = self.ready_copy(packet)?;
        let Some(index) = next.approvals.iter().position(|a| a.role == role) else {
            return Err(TrustError::not_found("role", format!("{} on packet {}", role, packet.id)));
        };
        if next.approvals[index].is_signed() {
            warn!("duplicate signature for role {} on packet {}", role, packet.id);
            return Err(TrustError::AlreadySigned {
                signer: format!("role {}", role),
                action_id: packet.id.clone(),
            });
        }
        if next.approvals.iter().any(|a| a.signer_id.as_deref() == Some(signer_id)) {
            warn!("signer {} tried to sign packet {} twice", signer_id, packet.id);
            return Err(TrustError::AlreadySigned {
                signer: signer_id.to_string(),
                action_id: packet.id.clone(),
            });
        }

        let weight = self.weight_of(&next, role)?;
        let signed_ts = timestamp.unwrap_or_else(Utc::now);
        let signature_payload = payload! {
            "role" => role,
            "signer_id" => signer_id,
            "weight" => weight as u64,
            "signed_ts" => timestamp_text(&signed_ts),
        };
        apply_signature(&mut next, index, signer_id, signed_ts, weight, signature_payload.clone());

        let evaluation = self.evaluate_quorum(&next)?;
        let mut events = vec![AuditEvent::new(
            SIGNATURE_ACCEPTED,
            signer_id,
            &next.id,
            signature_payload,
        )];
        if evaluation.quorum_met {
            events.push(mark_authorized(&mut next, signed_ts, &evaluation));
        }
        self.audit.append_batch(events)?;
        if next.is_terminal() {
            self.release(&next.id);
        }

        debug!(
            "packet {}: {} signed {} ({}/{} weight)",
            next.id, signer_id, role, evaluation.accumulated_weight, evaluation.threshold
        );
        if next.status == PacketStatus::Authorized {
            info!(
                "packet {} authorized after {} signatures in {} ms",
                next.id,
                next.multi_sig.current_signatures,
                next.time_to_authorize.unwrap_or_default()
            );
        }
        Ok(next)
    }

    /// Changes decision-context facts and re-evaluates the signatures already
    /// held. May authorize the packet without a new signature.
    pub fn update_context(
        &self,
        packet: &DecisionPacket,
        actor: &str,
        values: BTreeMap<String, Scalar>,
    ) -> TrustResult<DecisionPacket> {
        if actor.trim().is_empty() {
            return Err(TrustError::InvalidInput("context actor is empty".to_string()));
        }
        if values.is_empty() {
            return Err(TrustError::InvalidInput("context update is empty".to_string()));
        }

        let lock = self.lock_for(&packet.id);
        let _guard = lock.lock();

        let mut next = self.ready_copy(packet)?;
        next.context.extend(values.clone());

        let evaluation = self.evaluate_quorum(&next)?;
        let mut events = vec![AuditEvent::new(CONTEXT_UPDATED, actor, &next.id, values)];
        if evaluation.quorum_met {
            events.push(mark_authorized(&mut next, Utc::now(), &evaluation));
        }
        self.audit.append_batch(events)?;
        if next.is_terminal() {
            self.release(&next.id);
        }

        if next.status == PacketStatus::Authorized {
            info!("packet {} authorized on context update by {}", next.id, actor);
        }
        Ok(next)
    }

    /// Authorizes a packet whose quorum is met. Already-authorized packets
    /// come back unchanged, including stale copies of a packet the log shows
    /// as authorized.
    pub fn authorize_packet(
        &self,
        packet: &DecisionPacket,
        timestamp: Option<DateTime<Utc>>,
    ) -> TrustResult<DecisionPacket> {
        match packet.status {
            PacketStatus::Authorized => return Ok(packet.clone()),
            PacketStatus::Rejected => {
                return Err(TrustError::InvalidState(format!(
                    "packet {} was rejected",
                    packet.id
                )))
            }
            PacketStatus::Ready => {}
        }

        let lock = self.lock_for(&packet.id);
        let _guard = lock.lock();

        let mut next = self.catch_up(packet)?;
        match next.status {
            PacketStatus::Authorized => {
                debug!("packet {} already authorized", next.id);
                self.release(&next.id);
                return Ok(next);
            }
            PacketStatus::Rejected => {
                self.release(&next.id);
                return Err(TrustError::InvalidState(format!(
                    "packet {} was rejected",
                    next.id
                )));
            }
            PacketStatus::Ready => {}
        }
        let evaluation = self.evaluate_quorum(&next)?;
        if !evaluation.quorum_met {
            return Err(TrustError::InvalidState(format!(
                "packet {} has not met quorum ({}/{} weight, missing {:?})",
                next.id, evaluation.accumulated_weight, evaluation.threshold, evaluation.missing_required
            )));
        }
        let event = mark_authorized(&mut next, timestamp.unwrap_or_else(Utc::now), &evaluation);
        self.audit.append_batch(vec![event])?;
        self.release(&next.id);
        info!("packet {} authorized", next.id);
        Ok(next)
    }

    /// Moves a READY packet to REJECTED.
    pub fn reject_packet(
        &self,
        packet: &DecisionPacket,
        actor: &str,
        reason: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> TrustResult<DecisionPacket> {
        if actor.trim().is_empty() {
            return Err(TrustError::InvalidInput("rejecting actor is empty".to_string()));
        }

        let lock = self.lock_for(&packet.id);
        let _guard = lock.lock();

        let mut next = self.ready_copy(packet)?;
        let rejected_ts = timestamp.unwrap_or_else(Utc::now);
        self.audit.append(
            PACKET_REJECTED,
            actor,
            &next.id,
            payload! {
                "reason" => reason,
                "signatures" => next.multi_sig.current_signatures as u64,
                "rejected_ts" => timestamp_text(&rejected_ts),
            },
        )?;

        next.status = PacketStatus::Rejected;
        next.rejection = Some(Rejection {
            actor: actor.to_string(),
            reason: reason.to_string(),
            rejected_ts,
        });
        self.release(&next.id);
        info!("packet {} rejected by {}: {}", next.id, actor, reason);
        Ok(next)
    }

    /// Evaluates the packet as given, without touching the audit log.
    pub fn evaluate_quorum(&self, packet: &DecisionPacket) -> TrustResult<QuorumEvaluation> {
        let multi_sig = &packet.multi_sig;
        if multi_sig.threshold == 0 {
            return Err(TrustError::Policy(format!("packet {} has zero threshold", packet.id)));
        }
        let signed = packet.approvals.iter().filter(|a| a.is_signed()).count() as u64;
        let threshold = multi_sig.threshold as u64;

        let evaluation = match multi_sig.effective_mode() {
            PolicyMode::QuorumGraph => {
                let graph_id = multi_sig.graph_id.as_deref().ok_or_else(|| {
                    TrustError::Policy(format!("graph packet {} names no graph", packet.id))
                })?;
                let graph = self.graphs.get(graph_id)?;
                // Weight as captured at signing; the node's weight only for
                // signatures that arrived without a record
                let signed: Vec<(&str, u32)> = packet
                    .signed_roles()
                    .map(|role| {
                        let recorded = packet
                            .signatures
                            .iter()
                            .rev()
                            .find(|s| s.node_id == role)
                            .map(|s| s.weight);
                        let weight = recorded.or_else(|| graph.node(role).map(|n| n.weight));
                        (role, weight.unwrap_or_default())
                    })
                    .collect();
                graph.evaluate(signed, &self.decision_context(packet))
            }
            PolicyMode::MinimumSignOff => {
                let role = multi_sig
                    .minimum_sign_off_role
                    .as_deref()
                    .or_else(|| {
                        packet
                            .approvals
                            .iter()
                            .find(|a| a.minimum_sign_off)
                            .map(|a| a.role.as_str())
                    })
                    .ok_or_else(|| {
                        TrustError::Policy(format!("packet {} names no sign-off role", packet.id))
                    })?;
                let approval = packet.approval(role).ok_or_else(|| {
                    TrustError::Policy(format!("sign-off role {} missing from packet {}", role, packet.id))
                })?;
                let quorum_met = approval.is_signed();
                QuorumEvaluation {
                    quorum_met,
                    accumulated_weight: signed,
                    threshold,
                    missing_required: if quorum_met { Vec::new() } else { vec![role.to_string()] },
                    unsatisfied_conditions: Vec::new(),
                }
            }
            PolicyMode::Fixed => {
                let missing_required: Vec<String> = packet
                    .approvals
                    .iter()
                    .filter(|a| a.required && !a.is_signed())
                    .map(|a| a.role.clone())
                    .collect();
                QuorumEvaluation {
                    quorum_met: missing_required.is_empty() && signed >= threshold,
                    accumulated_weight: signed,
                    threshold,
                    missing_required,
                    unsatisfied_conditions: Vec::new(),
                }
            }
            PolicyMode::RiskEscalated => QuorumEvaluation {
                quorum_met: signed >= threshold,
                accumulated_weight: signed,
                threshold,
                missing_required: Vec::new(),
                unsatisfied_conditions: Vec::new(),
            },
        };
        Ok(evaluation)
    }

    /// Packet context plus the configured ordinal scales.
    pub fn decision_context(&self, packet: &DecisionPacket) -> DecisionContext {
        DecisionContext {
            values: packet.context.clone(),
            scales: self.scales.clone(),
        }
    }

    fn lock_for(&self, packet_id: &str) -> Arc<Mutex<()>> {
        self.action_locks
            .entry(packet_id.to_string())
            .or_default()
            .clone()
    }

    fn weight_of(&self, packet: &DecisionPacket, role: &str) -> TrustResult<u32> {
        if packet.multi_sig.effective_mode() != PolicyMode::QuorumGraph {
            return Ok(1);
        }
        let graph_id = packet.multi_sig.graph_id.as_deref().unwrap_or_default();
        let graph = self.graphs.get(graph_id)?;
        graph
            .node(role)
            .map(|node| node.weight)
            .ok_or_else(|| TrustError::not_found("quorum node", role))
    }

    fn release(&self, packet_id: &str) {
        self.action_locks.remove(packet_id);
    }

    /// Caught-up copy of `packet` that is still READY.
    fn ready_copy(&self, packet: &DecisionPacket) -> TrustResult<DecisionPacket> {
        let next = self.catch_up(packet)?;
        if next.is_terminal() {
            self.release(&next.id);
            return Err(TrustError::InvalidState(format!(
                "packet {} is {}",
                next.id, next.status
            )));
        }
        Ok(next)
    }

    /// Copy of `packet` with everything the audit log holds for it applied,
    /// settlement included.
    ///
    /// When the log holds the packet's creation, progress is rebuilt from
    /// the log alone: the caller's signatures and context are discarded, and
    /// a copy whose policy or signed approvals disagree with the log fails
    /// with `Integrity`.
    fn catch_up(&self, packet: &DecisionPacket) -> TrustResult<DecisionPacket> {
        let history = self.audit.get_packet_history(&packet.id);
        let mut next = packet.clone();

        if let Some(created) = history.iter().find(|e| e.action == PACKET_CREATED) {
            check_policy(packet, created)?;
            check_signed_approvals(packet, &history)?;
            restart_from(&mut next, created);
        }

        for entry in &history {
            match entry.action.as_str() {
                SIGNATURE_ACCEPTED => replay_signature(&mut next, entry),
                CONTEXT_UPDATED => next.context.extend(entry.payload.clone()),
                PACKET_AUTHORIZED => replay_authorization(&mut next, entry),
                PACKET_REJECTED => replay_rejection(&mut next, entry),
                _ => {}
            }
        }
        Ok(next)
    }
}

/// Digest of what decides who must sign and how much: the approval roster
/// and the multi-signature policy.
fn policy_digest(packet: &DecisionPacket) -> TrustResult<String> {
    let roster: Vec<(&str, bool, bool)> = packet
        .approvals
        .iter()
        .map(|a| (a.role.as_str(), a.required, a.minimum_sign_off))
        .collect();
    let policy = &packet.multi_sig;
    let canonical = serde_json::to_vec(&(
        roster,
        policy.required,
        policy.threshold,
        policy.minimum_sign_off,
        policy.minimum_sign_off_role.as_deref(),
        policy.effective_mode(),
        policy.graph_id.as_deref(),
    ))?;
    Ok(sha256_hex(&canonical))
}

fn check_policy(packet: &DecisionPacket, created: &AuditEntry) -> TrustResult<()> {
    let mode = packet.multi_sig.effective_mode().to_string();
    let threshold = Scalar::from(packet.multi_sig.threshold as u64);
    let digest = policy_digest(packet)?;
    let logged = |key: &str| created.payload.get(key);

    if logged("mode").and_then(Scalar::as_text) != Some(mode.as_str())
        || logged("threshold") != Some(&threshold)
        || logged("policy_digest").and_then(Scalar::as_text) != Some(digest.as_str())
    {
        warn!(
            "packet {} carries a policy that differs from creation entry {}",
            packet.id, created.sequence_number
        );
        return Err(TrustError::Integrity(format!(
            "packet {} policy does not match audit entry {}",
            packet.id, created.sequence_number
        )));
    }
    Ok(())
}

/// Every approval the copy shows as signed must have a logged signature by
/// the same signer.
fn check_signed_approvals(packet: &DecisionPacket, history: &[AuditEntry]) -> TrustResult<()> {
    for approval in packet.approvals.iter().filter(|a| a.is_signed()) {
        let logged = history
            .iter()
            .filter(|e| e.action == SIGNATURE_ACCEPTED)
            .any(|e| {
                let text = |key: &str| e.payload.get(key).and_then(Scalar::as_text);
                text("role") == Some(approval.role.as_str())
                    && text("signer_id") == approval.signer_id.as_deref()
            });
        if !logged {
            warn!(
                "packet {} shows role {} signed without a logged signature",
                packet.id, approval.role
            );
            return Err(TrustError::Integrity(format!(
                "packet {}: role {} has no logged signature",
                packet.id, approval.role
            )));
        }
    }
    Ok(())
}

/// Resets progress to the state recorded at creation.
fn restart_from(packet: &mut DecisionPacket, created: &AuditEntry) {
    for approval in &mut packet.approvals {
        approval.signer_id = None;
        approval.signed_ts = None;
    }
    packet.signatures.clear();
    packet.multi_sig.current_signatures = 0;
    packet.created_ts = logged_ts(created, "created_ts");
    packet.status = PacketStatus::Ready;
    packet.first_approval_ts = None;
    packet.authorized_ts = None;
    packet.time_to_authorize = None;
    packet.rejection = None;
    packet.context = created
        .payload
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(CONTEXT_PREFIX)
                .map(|field| (field.to_string(), value.clone()))
        })
        .collect();
}

/// Timestamp stored as text under `key`, or the entry's own timestamp.
fn logged_ts(entry: &AuditEntry, key: &str) -> DateTime<Utc> {
    entry
        .payload
        .get(key)
        .and_then(Scalar::as_text)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(entry.timestamp, |ts| ts.with_timezone(&Utc))
}

fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn apply_signature(
    packet: &mut DecisionPacket,
    index: usize,
    signer_id: &str,
    signed_ts: DateTime<Utc>,
    weight: u32,
    payload: aegis_core::Payload,
) {
    let approval = &mut packet.approvals[index];
    approval.signer_id = Some(signer_id.to_string());
    approval.signed_ts = Some(signed_ts);
    packet.signatures.push(SignatureRecord {
        node_id: approval.role.clone(),
        signer_id: signer_id.to_string(),
        payload,
        timestamp: signed_ts,
        weight,
    });
    packet.multi_sig.current_signatures = packet.approvals.iter().filter(|a| a.is_signed()).count();
    packet.first_approval_ts = match packet.first_approval_ts {
        Some(first) if first <= signed_ts => Some(first),
        _ => Some(signed_ts),
    };
}

/// Applies a logged signature the caller's copy has not seen yet.
fn replay_signature(packet: &mut DecisionPacket, entry: &AuditEntry) {
    let text = |key: &str| entry.payload.get(key).and_then(Scalar::as_text);
    let Some(role) = text("role") else { return };
    let Some(index) = packet.approvals.iter().position(|a| a.role == role) else {
        return;
    };
    if packet.approvals[index].is_signed() {
        return;
    }
    let signer_id = text("signer_id").unwrap_or(entry.actor.as_str()).to_string();
    let signed_ts = logged_ts(entry, "signed_ts");
    let weight = entry
        .payload
        .get("weight")
        .and_then(Scalar::as_number)
        .map_or(1, |w| w as u32);
    apply_signature(packet, index, &signer_id, signed_ts, weight, entry.payload.clone());
}

fn replay_authorization(packet: &mut DecisionPacket, entry: &AuditEntry) {
    let authorized_ts = logged_ts(entry, "authorized_ts");
    packet.status = PacketStatus::Authorized;
    packet.authorized_ts = Some(authorized_ts);
    packet.time_to_authorize = Some(match entry.payload.get("time_to_authorize_ms") {
        Some(Scalar::Int(ms)) => *ms,
        _ => (authorized_ts - packet.created_ts).num_milliseconds(),
    });
}

fn replay_rejection(packet: &mut DecisionPacket, entry: &AuditEntry) {
    packet.status = PacketStatus::Rejected;
    packet.rejection = Some(Rejection {
        actor: entry.actor.clone(),
        reason: entry
            .payload
            .get("reason")
            .and_then(Scalar::as_text)
            .unwrap_or_default()
            .to_string(),
        rejected_ts: logged_ts(entry, "rejected_ts"),
    });
}

/// Sets the authorized fields and returns the audit event for the transition.
fn mark_authorized(
    packet: &mut DecisionPacket,
    authorized_ts: DateTime<Utc>,
    evaluation: &QuorumEvaluation,
) -> AuditEvent {
    let elapsed = (authorized_ts - packet.created_ts).num_milliseconds();
    packet.status = PacketStatus::Authorized;
    packet.authorized_ts = Some(authorized_ts);
    packet.time_to_authorize = Some(elapsed);
    AuditEvent::new(
        PACKET_AUTHORIZED,
        ENGINE_ACTOR,
        &packet.id,
        payload! {
            "mode" => packet.multi_sig.effective_mode().to_string(),
            "signatures" => packet.multi_sig.current_signatures as u64,
            "accumulated_weight" => evaluation.accumulated_weight,
            "threshold" => evaluation.threshold,
            "time_to_authorize_ms" => elapsed,
            "authorized_ts" => timestamp_text(&authorized_ts),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{CompareOp, Condition};
    use crate::graph::{NodeType, QuorumNode};
    use crate::policy::PlaybookRole;
    use aegis_audit::AuditSink;
    use aegis_core::{Payload, TrustErrorKind};
    use chrono::Duration;
    use proptest::prelude::*;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn engine() -> QuorumAuthorizationEngine {
        init_logs();
        let audit = Arc::new(ImmutableAuditLog::in_memory());
        QuorumAuthorizationEngine::new(audit, &QuorumSettings::default()).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn playbook(roles: Vec<PlaybookRole>) -> Playbook {
        Playbook { id: "pb-flood".to_string(), roles, ..Playbook::default() }
    }

    fn incident() -> Incident {
        Incident { id: "inc-7".to_string(), ..Incident::default() }
    }

    fn graph_incident(level: &str) -> Incident {
        let mut inc = incident();
        inc.context.insert("emergency_level".to_string(), level.into());
        inc
    }

    fn ministry_agency() -> QuorumGraph {
        QuorumGraph {
            graph_id: "ministry-agency".to_string(),
            nodes: vec![
                QuorumNode::new("ministry", NodeType::Ministry, 2).required(),
                QuorumNode::new("agency", NodeType::Agency, 1).when(Condition::compare(
                    "emergency_level",
                    CompareOp::Ge,
                    "major_incident",
                )),
            ],
            edges: Vec::new(),
            threshold: 3,
            description: String::new(),
        }
    }

    fn graph_playbook() -> Playbook {
        Playbook {
            id: "pb-graph".to_string(),
            quorum_graph: Some("ministry-agency".to_string()),
            ..Playbook::default()
        }
    }

    #[test]
    fn test_two_required_roles_scenario() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), Some(t0())).unwrap();
        assert_eq!(packet.multi_sig.threshold, 2);
        assert_eq!(packet.status, PacketStatus::Ready);

        let after_a = engine
            .submit_signature(&packet, "A", "alice", Some(t0() + Duration::minutes(3)))
            .unwrap();
        assert_eq!(after_a.status, PacketStatus::Ready);
        assert_eq!(after_a.multi_sig.current_signatures, 1);
        assert_eq!(after_a.first_approval_ts, Some(t0() + Duration::minutes(3)));

        let after_b = engine
            .submit_signature(&after_a, "B", "bob", Some(t0() + Duration::minutes(5)))
            .unwrap();
        assert_eq!(after_b.status, PacketStatus::Authorized);
        assert_eq!(after_b.multi_sig.current_signatures, 2);
        assert_eq!(after_b.authorized_ts, Some(t0() + Duration::minutes(5)));
        assert_eq!(after_b.time_to_authorize, Some(5 * 60 * 1000));
        assert_eq!(after_b.first_approval_ts, Some(t0() + Duration::minutes(3)));

        let history = engine.audit_log().get_packet_history(&packet.id);
        let actions: Vec<&str> = history.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![PACKET_CREATED, SIGNATURE_ACCEPTED, SIGNATURE_ACCEPTED, PACKET_AUTHORIZED]
        );
        assert!(engine.audit_log().verify_chain().valid);
    }

    #[test]
    fn test_minimum_sign_off_role_alone_authorizes() {
        let engine = engine();
        let pb = playbook(vec![
            PlaybookRole::required("A"),
            PlaybookRole::required("B"),
            PlaybookRole::minimum_sign_off("C"),
            PlaybookRole::required("D"),
            PlaybookRole::required("E"),
        ]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        assert_eq!(packet.multi_sig.threshold, 1);
        assert_eq!(packet.multi_sig.required, 5);
        assert_eq!(packet.multi_sig.minimum_sign_off_role.as_deref(), Some("C"));

        // Another role signing does not authorize
        let after_a = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        assert_eq!(after_a.status, PacketStatus::Ready);

        let after_c = engine.submit_signature(&after_a, "C", "carol", None).unwrap();
        assert_eq!(after_c.status, PacketStatus::Authorized);
    }

    #[test]
    fn test_duplicate_signature_rejected_and_packet_unchanged() {
        let engine = engine();
        let pb = playbook(vec![
            PlaybookRole::required("A"),
            PlaybookRole::required("B"),
            PlaybookRole::required("C"),
        ]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        let signed = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        let before = signed.clone();
        let log_len = engine.audit_log().len();

        let err = engine.submit_signature(&signed, "A", "alice", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Duplicate);
        assert!(matches!(err, TrustError::AlreadySigned { .. }));

        // Same signer on another role
        let err = engine.submit_signature(&signed, "B", "alice", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Duplicate);

        // Stale copy that predates the first signature
        let err = engine.submit_signature(&packet, "A", "mallory", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Duplicate);

        assert_eq!(signed, before);
        assert_eq!(engine.audit_log().len(), log_len);
    }

    #[test]
    fn test_unknown_role_is_not_found() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        let err = engine.submit_signature(&packet, "Z", "zed", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::NotFound);
    }

    #[test]
    fn test_signature_outside_ready_is_invalid_state() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();

        let rejected = engine.reject_packet(&packet, "duty-officer", "false alarm", None).unwrap();
        assert_eq!(rejected.status, PacketStatus::Rejected);
        let err = engine.submit_signature(&rejected, "A", "alice", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::InvalidState);

        // A stale READY copy cannot sneak past the logged rejection
        let err = engine.submit_signature(&packet, "A", "alice", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::InvalidState);
        let err = engine.reject_packet(&packet, "duty-officer", "again", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::InvalidState);
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        assert_eq!(
            engine.authorize_packet(&packet, None).unwrap_err().kind(),
            TrustErrorKind::InvalidState
        );

        let authorized = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        let log_len = engine.audit_log().len();
        let again = engine.authorize_packet(&authorized, None).unwrap();
        assert_eq!(again, authorized);
        assert_eq!(engine.audit_log().len(), log_len);
        assert_eq!(
            engine
                .audit_log()
                .get_entries(Some(PACKET_AUTHORIZED), None)
                .len(),
            1
        );
    }

    #[test]
    fn test_critical_incident_escalates_to_two_of_three() {
        let engine = engine();
        let pb = playbook(vec![
            PlaybookRole::required("A"),
            PlaybookRole::required("B"),
            PlaybookRole::required("C"),
        ]);
        let mut inc = incident();
        inc.markers.push("critical".to_string());
        let packet = engine.create_packet(&pb, &inc, None).unwrap();
        assert_eq!(packet.multi_sig.mode, PolicyMode::RiskEscalated);

        let p = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
        let p = engine.submit_signature(&p, "C", "carol", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
    }

    #[test]
    fn test_graph_condition_gates_weight_until_context_changes() {
        let engine = engine();
        engine.register_graph(ministry_agency()).unwrap();

        let packet = engine
            .create_packet(&graph_playbook(), &graph_incident("minor_incident"), None)
            .unwrap();
        assert_eq!(packet.multi_sig.mode, PolicyMode::QuorumGraph);
        assert_eq!(packet.multi_sig.threshold, 3);

        let p = engine.submit_signature(&packet, "ministry", "minister", None).unwrap();
        let p = engine.submit_signature(&p, "agency", "director", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
        let eval = engine.evaluate_quorum(&p).unwrap();
        assert!(!eval.quorum_met);
        assert_eq!(eval.accumulated_weight, 2);
        assert_eq!(eval.unsatisfied_conditions, vec!["agency".to_string()]);

        let signatures_before = engine.audit_log().get_entries(Some(SIGNATURE_ACCEPTED), None).len();
        let mut raised = BTreeMap::new();
        raised.insert("emergency_level".to_string(), Scalar::from("major_incident"));
        let p = engine.update_context(&p, "situation-room", raised).unwrap();

        assert_eq!(p.status, PacketStatus::Authorized);
        assert!(engine.evaluate_quorum(&p).unwrap().quorum_met);
        assert_eq!(
            engine.audit_log().get_entries(Some(SIGNATURE_ACCEPTED), None).len(),
            signatures_before
        );
    }

    #[test]
    fn test_graph_signatures_capture_node_weight() {
        let engine = engine();
        engine.register_graph(ministry_agency()).unwrap();
        let packet = engine
            .create_packet(&graph_playbook(), &graph_incident("national_emergency"), None)
            .unwrap();
        let p = engine.submit_signature(&packet, "agency", "director", None).unwrap();
        assert_eq!(p.signatures[0].weight, 1);
        let p = engine.submit_signature(&p, "ministry", "minister", None).unwrap();
        assert_eq!(p.signatures[1].weight, 2);
        assert_eq!(p.status, PacketStatus::Authorized);
    }

    #[test]
    fn test_unknown_graph_is_not_found() {
        let engine = engine();
        let err = engine.create_packet(&graph_playbook(), &incident(), None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::NotFound);
    }

    #[test]
    fn test_malformed_graph_condition_fails_closed() {
        let engine = engine();
        let graph: QuorumGraph = serde_json::from_value(serde_json::json!({
            "graph_id": "ministry-agency",
            "nodes": [
                {"node_id": "ministry", "type": "MINISTRY", "name": "Ministry", "required": true, "weight": 2},
                {"node_id": "agency", "type": "AGENCY", "name": "Agency", "weight": 1,
                 "conditional": {"field": "emergency_level", "operator": "=>", "value": "major_incident"}}
            ],
            "threshold": 3
        }))
        .unwrap();
        engine.register_graph(graph).unwrap();

        let packet = engine
            .create_packet(&graph_playbook(), &graph_incident("national_emergency"), None)
            .unwrap();
        let p = engine.submit_signature(&packet, "ministry", "minister", None).unwrap();
        let p = engine.submit_signature(&p, "agency", "director", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
    }

    #[test]
    fn test_stale_copies_are_caught_up() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();

        // Both signers start from the same original copy
        engine.submit_signature(&packet, "A", "alice", None).unwrap();
        let p = engine.submit_signature(&packet, "B", "bob", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
        assert_eq!(p.multi_sig.current_signatures, 2);
    }

    #[test]
    fn test_concurrent_signers_authorize_once() {
        let engine = engine();
        let roles: Vec<PlaybookRole> = (0..6).map(|i| PlaybookRole::required(&format!("R{}", i))).collect();
        let packet = engine.create_packet(&playbook(roles), &incident(), None).unwrap();

        let results: Vec<DecisionPacket> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|i| {
                    let engine = &engine;
                    let packet = &packet;
                    scope.spawn(move || {
                        engine
                            .submit_signature(packet, &format!("R{}", i), &format!("s{}", i), None)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let authorized = results.iter().filter(|p| p.status == PacketStatus::Authorized).count();
        assert_eq!(authorized, 1);
        assert_eq!(engine.audit_log().get_entries(Some(PACKET_AUTHORIZED), None).len(), 1);
        assert_eq!(engine.audit_log().get_entries(Some(SIGNATURE_ACCEPTED), None).len(), 6);
    }

    fn generator_packet() -> DecisionPacket {
        serde_json::from_value(serde_json::json!({
            "id": "gen-ms-1",
            "createdTs": "2026-03-01T10:00:00Z",
            "status": "ready",
            "approvals": [
                {"role": "A", "required": true},
                {"role": "B", "required": true, "minimum_sign_off": true},
                {"role": "C", "required": true}
            ],
            "multiSig": {"required": 3, "threshold": 1, "currentSignatures": 0,
                         "minimumSignOff": true, "minimumSignOffRole": "B"}
        }))
        .unwrap()
    }

    #[test]
    fn test_generator_sign_off_packet_needs_the_sign_off_role() {
        let engine = engine();
        let packet = generator_packet();

        let p = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
        let eval = engine.evaluate_quorum(&p).unwrap();
        assert!(!eval.quorum_met);
        assert_eq!(eval.missing_required, vec!["B".to_string()]);
        let p = engine.submit_signature(&p, "C", "carol", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);

        let p = engine.submit_signature(&p, "B", "bob", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
        let authorized = &engine.audit_log().get_entries(Some(PACKET_AUTHORIZED), None)[0];
        assert_eq!(
            authorized.payload.get("mode"),
            Some(&Scalar::from("minimum_sign_off"))
        );
    }

    #[test]
    fn test_sign_off_role_taken_from_flagged_approval() {
        let engine = engine();
        let mut packet = generator_packet();
        packet.multi_sig.minimum_sign_off_role = None;
        let p = engine.submit_signature(&packet, "C", "carol", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
        let p = engine.submit_signature(&p, "B", "bob", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
    }

    #[test]
    fn test_unlogged_approval_on_copy_is_integrity_error() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        let log_len = engine.audit_log().len();

        let mut forged = packet.clone();
        forged.approvals[0].signed_ts = Some(Utc::now());
        let err = engine.submit_signature(&forged, "B", "bob", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Integrity);

        forged.approvals[0].signer_id = Some("alice".to_string());
        let err = engine.submit_signature(&forged, "B", "bob", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Integrity);
        assert_eq!(
            engine.authorize_packet(&forged, None).unwrap_err().kind(),
            TrustErrorKind::Integrity
        );

        // Alice's real signature makes the same copy consistent again
        engine.submit_signature(&packet, "A", "alice", None).unwrap();
        let p = engine.submit_signature(&forged, "B", "bob", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
        assert_eq!(engine.audit_log().len(), log_len + 3);
        assert_eq!(engine.audit_log().get_entries(Some(SIGNATURE_ACCEPTED), None).len(), 2);
    }

    #[test]
    fn test_policy_edits_on_copy_are_integrity_errors() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();

        let mut lowered = packet.clone();
        lowered.multi_sig.threshold = 1;
        let mut relaxed = packet.clone();
        relaxed.approvals[1].required = false;
        let mut remoded = packet.clone();
        remoded.multi_sig.mode = PolicyMode::RiskEscalated;
        let mut sign_off = packet.clone();
        sign_off.multi_sig.minimum_sign_off = true;
        sign_off.multi_sig.minimum_sign_off_role = Some("A".to_string());

        for copy in [lowered, relaxed, remoded, sign_off] {
            let err = engine.submit_signature(&copy, "A", "alice", None).unwrap_err();
            assert_eq!(err.kind(), TrustErrorKind::Integrity);
        }
        assert_eq!(engine.audit_log().get_entries(Some(SIGNATURE_ACCEPTED), None).len(), 0);
    }

    #[test]
    fn test_context_on_copy_is_ignored_for_logged_packets() {
        let engine = engine();
        engine.register_graph(ministry_agency()).unwrap();
        let packet = engine
            .create_packet(&graph_playbook(), &graph_incident("minor_incident"), None)
            .unwrap();

        let mut escalated = packet.clone();
        escalated
            .context
            .insert("emergency_level".to_string(), Scalar::from("national_emergency"));
        let p = engine.submit_signature(&escalated, "ministry", "minister", None).unwrap();
        let p = engine.submit_signature(&p, "agency", "director", None).unwrap();
        assert_eq!(p.status, PacketStatus::Ready);
        assert_eq!(p.context.get("emergency_level"), Some(&Scalar::from("minor_incident")));
    }

    #[test]
    fn test_authorize_stale_copy_of_authorized_packet_is_no_op() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A")]);
        let packet = engine.create_packet(&pb, &incident(), Some(t0())).unwrap();
        let authorized = engine
            .submit_signature(&packet, "A", "alice", Some(t0() + Duration::seconds(90)))
            .unwrap();
        let log_len = engine.audit_log().len();

        let again = engine.authorize_packet(&packet, None).unwrap();
        assert_eq!(again.status, PacketStatus::Authorized);
        assert_eq!(again.authorized_ts, authorized.authorized_ts);
        assert_eq!(again.time_to_authorize, Some(90_000));
        assert_eq!(again.approval("A").unwrap().signer_id.as_deref(), Some("alice"));
        assert_eq!(engine.audit_log().len(), log_len);

        let rejected_packet = engine.create_packet(&pb, &incident(), Some(t0() + Duration::hours(1))).unwrap();
        engine.reject_packet(&rejected_packet, "duty-officer", "stood down", None).unwrap();
        assert_eq!(
            engine.authorize_packet(&rejected_packet, None).unwrap_err().kind(),
            TrustErrorKind::InvalidState
        );
    }

    #[test]
    fn test_settled_packets_release_their_locks() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A"), PlaybookRole::required("B")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        let p = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        assert_eq!(engine.action_locks.len(), 1);
        engine.submit_signature(&p, "B", "bob", None).unwrap();
        assert!(engine.action_locks.is_empty());

        // Late callers on the settled packet do not leave entries behind
        assert!(engine.submit_signature(&packet, "B", "bob", None).is_err());
        assert!(engine.authorize_packet(&packet, None).is_ok());
        assert!(engine.action_locks.is_empty());

        let other = engine.create_packet(&pb, &incident(), Some(t0())).unwrap();
        engine.reject_packet(&other, "duty-officer", "stood down", None).unwrap();
        assert!(engine.action_locks.is_empty());
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn persist(&mut self, entries: &[AuditEntry]) -> TrustResult<()> {
            // Creation goes through; signatures do not
            if entries.iter().any(|e| e.action == SIGNATURE_ACCEPTED) {
                return Err(TrustError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            Ok(())
        }

        fn sync(&mut self) -> TrustResult<()> {
            Ok(())
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn test_unlogged_signature_is_not_accepted() {
        init_logs();
        let audit = Arc::new(ImmutableAuditLog::with_sink(Box::new(FailingSink), Vec::new()).unwrap());
        let engine = QuorumAuthorizationEngine::new(audit, &QuorumSettings::default()).unwrap();
        let pb = playbook(vec![PlaybookRole::required("A")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();

        let err = engine.submit_signature(&packet, "A", "alice", None).unwrap_err();
        assert_eq!(err.kind(), TrustErrorKind::Io);
        assert_eq!(engine.audit_log().len(), 1);
        assert_eq!(packet.status, PacketStatus::Ready);
        assert!(packet.approvals[0].signed_ts.is_none());
    }

    #[test]
    fn test_settings_graphs_registered_at_construction() {
        init_logs();
        let settings = QuorumSettings { graphs: vec![ministry_agency()], ..QuorumSettings::default() };
        let engine =
            QuorumAuthorizationEngine::new(Arc::new(ImmutableAuditLog::in_memory()), &settings).unwrap();
        assert_eq!(engine.graph_ids(), vec!["ministry-agency".to_string()]);
        assert_eq!(
            engine.register_graph(ministry_agency()).unwrap_err().kind(),
            TrustErrorKind::Duplicate
        );
    }

    #[test]
    fn test_external_packet_accepted() {
        let engine = engine();
        let packet: DecisionPacket = serde_json::from_value(serde_json::json!({
            "id": "ext-1",
            "createdTs": "2026-03-01T10:00:00Z",
            "status": "ready",
            "approvals": [{"role": "A", "required": true}, {"role": "B", "required": true}],
            "multiSig": {"required": 2, "threshold": 2, "currentSignatures": 0,
                         "minimumSignOff": false, "minimumSignOffRole": null}
        }))
        .unwrap();
        let p = engine.submit_signature(&packet, "A", "alice", None).unwrap();
        let p = engine.submit_signature(&p, "B", "bob", None).unwrap();
        assert_eq!(p.status, PacketStatus::Authorized);
        assert!(p.time_to_authorize.unwrap() > 0);
    }

    #[test]
    fn test_created_entry_records_policy() {
        let engine = engine();
        let pb = playbook(vec![PlaybookRole::required("A")]);
        let packet = engine.create_packet(&pb, &incident(), None).unwrap();
        let created = &engine.audit_log().get_packet_history(&packet.id)[0];
        let expected: Payload = payload! { "mode" => "fixed" };
        assert_eq!(created.payload.get("mode"), expected.get("mode"));
        assert_eq!(created.payload.get("threshold"), Some(&Scalar::from(1u64)));
    }

    proptest! {
        #[test]
        fn prop_fixed_quorum_monotone(order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle()) {
            let engine = QuorumAuthorizationEngine::new(
                Arc::new(ImmutableAuditLog::in_memory()),
                &QuorumSettings::default(),
            ).unwrap();
            let roles = vec![
                PlaybookRole::required("R0"),
                PlaybookRole::required("R1"),
                PlaybookRole::optional("R2"),
                PlaybookRole::optional("R3"),
                PlaybookRole::optional("R4"),
            ];
            let mut packet = engine.create_packet(&playbook(roles), &incident(), None).unwrap();
            let mut met = false;
            for i in order {
                if packet.status == PacketStatus::Authorized {
                    break;
                }
                packet = engine.submit_signature(&packet, &format!("R{}", i), &format!("s{}", i), None).unwrap();
                let eval = engine.evaluate_quorum(&packet).unwrap();
                prop_assert!(!(met && !eval.quorum_met));
                met = eval.quorum_met;
                prop_assert_eq!(met, packet.status == PacketStatus::Authorized);
            }
            prop_assert!(met);
        }
    }
}
