// SIGNATURE POLICY
// Turns a playbook and an incident into the rule a decision packet is held to
//
// SAFETY INVARIANTS:
// 1. Precedence is fixed: quorum graph, then minimum sign-off, then the first
//    matching risk rule, then the fixed threshold
// 2. A policy never has a zero threshold
// 3. A count threshold never exceeds the number of roles that can sign

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use aegis_core::{Scalar, TrustError, TrustResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookRole {
    pub role: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub minimum_sign_off: bool,
}

fn default_true() -> bool {
    true
}

impl PlaybookRole {
    pub fn required(role: &str) -> Self {
        Self { role: role.to_string(), required: true, minimum_sign_off: false }
    }

    pub fn optional(role: &str) -> Self {
        Self { role: role.to_string(), required: false, minimum_sign_off: false }
    }

    pub fn minimum_sign_off(role: &str) -> Self {
        Self { role: role.to_string(), required: true, minimum_sign_off: true }
    }
}

/// Response plan supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<PlaybookRole>,
    /// Ordered response steps; its length is a risk signal
    #[serde(default)]
    pub timeline: Vec<String>,
    #[serde(default)]
    pub markers: Vec<String>,
    /// Routes authorization through a registered quorum graph
    #[serde(default)]
    pub quorum_graph: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(default)]
    pub markers: Vec<String>,
    /// Facts quorum conditions are evaluated against, e.g. `emergency_level`
    #[serde(default)]
    pub context: BTreeMap<String, Scalar>,
}

/// One row of the risk table. Unset criteria match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    pub name: String,
    #[serde(default)]
    pub role_count: Option<usize>,
    #[serde(default)]
    pub min_timeline_len: Option<usize>,
    #[serde(default)]
    pub critical: Option<bool>,
    pub required: usize,
    pub threshold: usize,
}

impl RiskRule {
    fn matches(&self, signal: &RiskSignal) -> bool {
        self.role_count.map_or(true, |n| n == signal.role_count)
            && self.min_timeline_len.map_or(true, |n| signal.timeline_len >= n)
            && self.critical.map_or(true, |c| c == signal.critical)
    }

    pub fn validate(&self) -> TrustResult<()> {
        if self.threshold == 0 || self.threshold > self.required {
            return Err(TrustError::Config(format!(
                "risk rule {} has threshold {} for {} required",
                self.name, self.threshold, self.required
            )));
        }
        Ok(())
    }
}

/// Escalates three-role critical plays to 2-of-3.
pub fn default_risk_rules() -> Vec<RiskRule> {
    vec![RiskRule {
        name: "critical-three-role".to_string(),
        role_count: Some(3),
        min_timeline_len: None,
        critical: Some(true),
        required: 3,
        threshold: 2,
    }]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RiskSignal {
    pub role_count: usize,
    pub timeline_len: usize,
    pub critical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    Fixed,
    MinimumSignOff,
    RiskEscalated,
    QuorumGraph,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyMode::Fixed => "fixed",
            PolicyMode::MinimumSignOff => "minimum_sign_off",
            PolicyMode::RiskEscalated => "risk_escalated",
            PolicyMode::QuorumGraph => "quorum_graph",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePolicy {
    pub mode: PolicyMode,
    /// Number of participants (roles or graph nodes)
    pub required: usize,
    /// Signatures needed, or graph weight for `QuorumGraph`
    pub threshold: usize,
    pub minimum_sign_off: bool,
    pub minimum_sign_off_role: Option<String>,
    pub graph_id: Option<String>,
    /// Risk rule that escalated the policy
    pub rule: Option<String>,
}

/// Everything policy determination reads besides the playbook and incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskTable {
    pub rules: Vec<RiskRule>,
    pub critical_marker: String,
}

impl Default for RiskTable {
    fn default() -> Self {
        Self { rules: default_risk_rules(), critical_marker: "critical".to_string() }
    }
}

impl RiskTable {
    pub(crate) fn signal(&self, playbook: &Playbook, incident: &Incident) -> RiskSignal {
        let marker = self.critical_marker.to_lowercase();
        let critical = playbook
            .markers
            .iter()
            .chain(incident.markers.iter())
            .any(|m| m.to_lowercase() == marker);
        RiskSignal {
            role_count: playbook.roles.len(),
            timeline_len: playbook.timeline.len(),
            critical,
        }
    }

    fn first_match(&self, signal: &RiskSignal) -> Option<&RiskRule> {
        self.rules.iter().find(|r| r.matches(signal))
    }
}

/// Policy for a role-based playbook. Graph-routed playbooks are resolved by
/// the engine, which owns the registry.
pub(crate) fn role_policy(
    table: &RiskTable,
    playbook: &Playbook,
    incident: &Incident,
) -> TrustResult<SignaturePolicy> {
    if playbook.roles.is_empty() {
        return Err(TrustError::Policy(format!("playbook {} lists no roles", playbook.id)));
    }
    let mut seen = HashSet::new();
    for role in &playbook.roles {
        if role.role.trim().is_empty() {
            return Err(TrustError::Policy(format!("playbook {} has an unnamed role", playbook.id)));
        }
        if !seen.insert(role.role.as_str()) {
            return Err(TrustError::Policy(format!(
                "playbook {} lists role {} twice",
                playbook.id, role.role
            )));
        }
    }

    let role_count = playbook.roles.len();
    let sign_off: Vec<&PlaybookRole> =
        playbook.roles.iter().filter(|r| r.minimum_sign_off).collect();
    if sign_off.len() > 1 {
        return Err(TrustError::Policy(format!(
            "playbook {} marks {} roles as minimum sign-off",
            playbook.id,
            sign_off.len()
        )));
    }
    if let Some(role) = sign_off.first() {
        return Ok(SignaturePolicy {
            mode: PolicyMode::MinimumSignOff,
            required: role_count,
            threshold: 1,
            minimum_sign_off: true,
            minimum_sign_off_role: Some(role.role.clone()),
            graph_id: None,
            rule: None,
        });
    }

    let signal = table.signal(playbook, incident);
    if let Some(rule) = table.first_match(&signal) {
        rule.validate()?;
        if rule.threshold > role_count {
            return Err(TrustError::Policy(format!(
                "risk rule {} needs {} signatures but playbook {} has {} roles",
                rule.name, rule.threshold, playbook.id, role_count
            )));
        }
        return Ok(SignaturePolicy {
            mode: PolicyMode::RiskEscalated,
            required: rule.required,
            threshold: rule.threshold,
            minimum_sign_off: false,
            minimum_sign_off_role: None,
            graph_id: None,
            rule: Some(rule.name.clone()),
        });
    }

    let threshold = playbook.roles.iter().filter(|r| r.required).count();
    if threshold == 0 {
        return Err(TrustError::Policy(format!(
            "playbook {} has no required roles",
            playbook.id
        )));
    }
    Ok(SignaturePolicy {
        mode: PolicyMode::Fixed,
        required: role_count,
        threshold,
        minimum_sign_off: false,
        minimum_sign_off_role: None,
        graph_id: None,
        rule: None,
    })
}
