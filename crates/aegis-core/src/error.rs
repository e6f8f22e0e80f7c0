// ERROR TAXONOMY
// Every engine in the trust core reports failures through `TrustError`.
//
// SAFETY INVARIANTS:
// 1. Verification routines never use these errors for "invalid" outcomes;
//    they return structured reports and only fail on malformed input
// 2. An error returned from a mutating operation means nothing was committed

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse category of a [`TrustError`], for callers that branch on kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustErrorKind {
    NotFound,
    Duplicate,
    Revoked,
    Integrity,
    Policy,
    Config,
    InvalidState,
    InvalidInput,
    Io,
}

impl fmt::Display for TrustErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrustErrorKind::NotFound => "NOT_FOUND",
            TrustErrorKind::Duplicate => "DUPLICATE",
            TrustErrorKind::Revoked => "REVOKED",
            TrustErrorKind::Integrity => "INTEGRITY",
            TrustErrorKind::Policy => "POLICY",
            TrustErrorKind::Config => "CONFIG",
            TrustErrorKind::InvalidState => "INVALID_STATE",
            TrustErrorKind::InvalidInput => "INVALID_INPUT",
            TrustErrorKind::Io => "IO",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("{signer} already signed action {action_id}")]
    AlreadySigned { signer: String, action_id: String },

    #[error("Hardware root revoked: {0}")]
    Revoked(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Policy error: {0}")]
    Policy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrustError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        TrustError::NotFound { entity, id: id.into() }
    }

    pub fn duplicate(entity: &'static str, id: impl Into<String>) -> Self {
        TrustError::Duplicate { entity, id: id.into() }
    }

    pub fn kind(&self) -> TrustErrorKind {
        match self {
            TrustError::NotFound { .. } => TrustErrorKind::NotFound,
            TrustError::Duplicate { .. } | TrustError::AlreadySigned { .. } => {
                TrustErrorKind::Duplicate
            }
            TrustError::Revoked(_) => TrustErrorKind::Revoked,
            TrustError::Integrity(_) => TrustErrorKind::Integrity,
            TrustError::Policy(_) => TrustErrorKind::Policy,
            TrustError::Config(_) => TrustErrorKind::Config,
            TrustError::InvalidState(_) => TrustErrorKind::InvalidState,
            TrustError::InvalidInput(_) => TrustErrorKind::InvalidInput,
            TrustError::Io(_) => TrustErrorKind::Io,
        }
    }
}

impl From<serde_json::Error> for TrustError {
    fn from(err: serde_json::Error) -> Self {
        TrustError::InvalidInput(format!("serialization: {}", err))
    }
}

impl From<hex::FromHexError> for TrustError {
    fn from(err: hex::FromHexError) -> Self {
        TrustError::InvalidInput(format!("hex decoding: {}", err))
    }
}

impl From<config::ConfigError> for TrustError {
    fn from(err: config::ConfigError) -> Self {
        TrustError::Config(err.to_string())
    }
}

pub type TrustResult<T> = Result<T, TrustError>;
