//! Quorum authorization for the Aegis trust core.
//!
//! A playbook and an incident yield a [`SignaturePolicy`]: a fixed threshold,
//! a minimum sign-off override, a risk-escalated threshold or a weighted
//! [`QuorumGraph`]. The [`QuorumAuthorizationEngine`] collects signatures on
//! [`DecisionPacket`]s under that policy and records every step in the
//! immutable audit log.

pub mod condition;
pub mod engine;
pub mod graph;
pub mod packet;
pub mod policy;
pub mod settings;

pub use condition::{CompareOp, Comparison, Condition, DecisionContext};
pub use engine::{
    QuorumAuthorizationEngine, CONTEXT_UPDATED, PACKET_AUTHORIZED, PACKET_CREATED,
    PACKET_REJECTED, SIGNATURE_ACCEPTED,
};
pub use graph::{GraphRegistry, NodeType, QuorumEdge, QuorumEvaluation, QuorumGraph, QuorumNode};
pub use packet::{Approval, DecisionPacket, MultiSig, PacketStatus, Rejection, SignatureRecord};
pub use policy::{
    default_risk_rules, Incident, Playbook, PlaybookRole, PolicyMode, RiskRule, RiskTable,
    SignaturePolicy,
};
pub use settings::QuorumSettings;
