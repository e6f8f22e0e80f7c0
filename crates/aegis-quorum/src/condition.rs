/// Typed Participation Conditions
///
/// A quorum node may carry a predicate over the decision context. Predicates
/// are structured data, never free text: `{field, operator, value}` leaves
/// combined with `all` / `any`.
///
/// SAFETY GUARANTEES:
/// - Evaluation is fail-closed: a missing field, a type mismatch, an unknown
///   ordinal label or an unparseable condition all evaluate to false
/// - An empty `all` group is false, never vacuously true

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use aegis_core::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    pub field: String,
    pub operator: CompareOp,
    pub value: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Compare(Comparison),
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    /// Placeholder for a condition that could not be parsed. Never satisfied.
    Unsatisfiable { unsatisfiable: String },
}

impl Condition {
    pub fn compare(field: &str, operator: CompareOp, value: impl Into<Scalar>) -> Self {
        Condition::Compare(Comparison {
            field: field.to_string(),
            operator,
            value: value.into(),
        })
    }

    /// Parses a structured condition. Anything that does not parse becomes
    /// `Unsatisfiable` rather than an error, so one bad node cannot open a
    /// quorum.
    pub fn from_json(raw: &serde_json::Value) -> Condition {
        match serde_json::from_value::<Condition>(raw.clone()) {
            Ok(condition) => condition,
            Err(err) => {
                warn!("condition {} does not parse ({}); treating as unsatisfied", raw, err);
                Condition::Unsatisfiable {
                    unsatisfiable: format!("unparseable condition: {}", err),
                }
            }
        }
    }

    pub fn evaluate(&self, ctx: &DecisionContext) -> bool {
        match self {
            Condition::Compare(cmp) => cmp.evaluate(ctx),
            Condition::All { all } => !all.is_empty() && all.iter().all(|c| c.evaluate(ctx)),
            Condition::Any { any } => any.iter().any(|c| c.evaluate(ctx)),
            Condition::Unsatisfiable { .. } => false,
        }
    }
}

impl Comparison {
    fn evaluate(&self, ctx: &DecisionContext) -> bool {
        let Some(actual) = ctx.get(&self.field) else {
            return false;
        };

        // Ordinal labels compare by position on the field's scale
        if let (Some(scale), Some(left), Some(right)) =
            (ctx.scale(&self.field), actual.as_text(), self.value.as_text())
        {
            let position = |label: &str| scale.iter().position(|l| l == label);
            return match (position(left), position(right)) {
                (Some(l), Some(r)) => self.operator.holds(l.cmp(&r)),
                _ => false,
            };
        }

        if let (Some(left), Some(right)) = (actual.as_number(), self.value.as_number()) {
            return left
                .partial_cmp(&right)
                .map_or(false, |ordering| self.operator.holds(ordering));
        }

        if !self.operator.is_equality() {
            return false;
        }
        let equal = match (actual, &self.value) {
            (Scalar::Text(l), Scalar::Text(r)) => l == r,
            (Scalar::Bool(l), Scalar::Bool(r)) => l == r,
            _ => return false,
        };
        if self.operator == CompareOp::Eq {
            equal
        } else {
            !equal
        }
    }
}

/// Deserializes an optional condition leniently: malformed input becomes
/// `Unsatisfiable` instead of failing the enclosing document.
pub(crate) fn lenient_condition<'de, D>(deserializer: D) -> Result<Option<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(Condition::from_json(&value)),
    })
}

/// Facts a condition is evaluated against, plus the ordinal scales that give
/// text labels an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub values: BTreeMap<String, Scalar>,
    pub scales: BTreeMap<String, Vec<String>>,
}

impl DecisionContext {
    pub fn new(scales: BTreeMap<String, Vec<String>>) -> Self {
        Self { values: BTreeMap::new(), scales }
    }

    pub fn with(mut self, field: &str, value: impl Into<Scalar>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<Scalar>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.values.get(field)
    }

    pub fn scale(&self, field: &str) -> Option<&[String]> {
        self.scales.get(field).map(Vec::as_slice)
    }
}
