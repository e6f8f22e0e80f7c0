//! Decision packet exchanged with the packet generator.
//!
//! Field names follow the generator's camelCase JSON; `minimum_sign_off` on
//! approvals keeps its snake_case spelling.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aegis_core::{Payload, Scalar};

use crate::policy::{PolicyMode, SignaturePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketStatus {
    Ready,
    Authorized,
    Rejected,
}

impl fmt::Display for PacketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PacketStatus::Ready => "ready",
            PacketStatus::Authorized => "authorized",
            PacketStatus::Rejected => "rejected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    /// Playbook role, or node id for graph policies
    pub role: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "minimum_sign_off", default)]
    pub minimum_sign_off: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_ts: Option<DateTime<Utc>>,
}

impl Approval {
    pub fn is_signed(&self) -> bool {
        self.signed_ts.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSig {
    pub required: usize,
    pub threshold: usize,
    pub current_signatures: usize,
    pub minimum_sign_off: bool,
    pub minimum_sign_off_role: Option<String>,
    #[serde(default = "default_mode")]
    pub mode: PolicyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
}

fn default_mode() -> PolicyMode {
    PolicyMode::Fixed
}

impl MultiSig {
    pub fn from_policy(policy: &SignaturePolicy) -> Self {
        Self {
            required: policy.required,
            threshold: policy.threshold,
            current_signatures: 0,
            minimum_sign_off: policy.minimum_sign_off,
            minimum_sign_off_role: policy.minimum_sign_off_role.clone(),
            mode: policy.mode,
            graph_id: policy.graph_id.clone(),
        }
    }

    /// Mode the packet is evaluated under. Generator packets carry no mode,
    /// so the minimum sign-off flag overrides whatever `mode` says.
    pub fn effective_mode(&self) -> PolicyMode {
        if self.minimum_sign_off {
            PolicyMode::MinimumSignOff
        } else {
            self.mode
        }
    }
}

/// A signature as captured at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub node_id: String,
    pub signer_id: String,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    /// Node weight when the signature was taken; 1 for role policies
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub actor: String,
    pub reason: String,
    pub rejected_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPacket {
    pub id: String,
    pub created_ts: DateTime<Utc>,
    pub status: PacketStatus,
    #[serde(default)]
    pub playbook_id: String,
    #[serde(default)]
    pub incident_id: String,
    pub approvals: Vec<Approval>,
    pub multi_sig: MultiSig,
    #[serde(default)]
    pub signatures: Vec<SignatureRecord>,
    /// Facts graph conditions are evaluated against
    #[serde(default)]
    pub context: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub first_approval_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorized_ts: Option<DateTime<Utc>>,
    /// Milliseconds from creation to authorization
    #[serde(default)]
    pub time_to_authorize: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl DecisionPacket {
    pub fn approval(&self, role: &str) -> Option<&Approval> {
        self.approvals.iter().find(|a| a.role == role)
    }

    pub fn signed_roles(&self) -> impl Iterator<Item = &str> {
        self.approvals
            .iter()
            .filter(|a| a.is_signed())
            .map(|a| a.role.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.status != PacketStatus::Ready
    }
}
