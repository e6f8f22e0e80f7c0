use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};

use crate::graph::QuorumGraph;
use crate::policy::{default_risk_rules, RiskRule, RiskTable};

/// Quorum engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumSettings {
    /// Marker on a playbook or incident that raises the risk signal
    pub critical_marker: String,
    /// Checked in order; the first match escalates
    pub risk_rules: Vec<RiskRule>,
    /// Ordered labels per context field, lowest first
    pub ordinal_scales: BTreeMap<String, Vec<String>>,
    /// Registered when the engine is built
    pub graphs: Vec<QuorumGraph>,
}

impl Default for QuorumSettings {
    fn default() -> Self {
        let mut ordinal_scales = BTreeMap::new();
        ordinal_scales.insert(
            "emergency_level".to_string(),
            vec![
                "minor_incident".to_string(),
                "major_incident".to_string(),
                "national_emergency".to_string(),
            ],
        );
        Self {
            critical_marker: "critical".to_string(),
            risk_rules: default_risk_rules(),
            ordinal_scales,
            graphs: Vec::new(),
        }
    }
}

impl QuorumSettings {
    pub fn validate(&self) -> TrustResult<()> {
        if self.critical_marker.trim().is_empty() {
            return Err(TrustError::Config("critical marker is empty".to_string()));
        }
        for rule in &self.risk_rules {
            rule.validate()?;
        }
        for (field, labels) in &self.ordinal_scales {
            if labels.is_empty() {
                return Err(TrustError::Config(format!("ordinal scale {} is empty", field)));
            }
            let unique: HashSet<&String> = labels.iter().collect();
            if unique.len() != labels.len() {
                return Err(TrustError::Config(format!(
                    "ordinal scale {} repeats a label",
                    field
                )));
            }
        }
        let mut ids = HashSet::new();
        for graph in &self.graphs {
            graph.validate()?;
            if !ids.insert(graph.graph_id.as_str()) {
                return Err(TrustError::duplicate("quorum graph", graph.graph_id.clone()));
            }
        }
        Ok(())
    }

    pub fn risk_table(&self) -> RiskTable {
        RiskTable {
            rules: self.risk_rules.clone(),
            critical_marker: self.critical_marker.clone(),
        }
    }
}
