// TRUST CORE CONFIGURATION
// Layered: built-in defaults <- optional file <- AEGIS__* environment
//
// SAFETY INVARIANTS:
// 1. A configuration is validated before any engine is built from it
// 2. Quorum graphs named here are checked with the same rules as graphs
//    registered at runtime

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::config::{Config, Environment, File};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use aegis_core::{TrustError, TrustResult};
use aegis_provenance::DEFAULT_EPOCH_CAPACITY;
use aegis_quorum::QuorumSettings;

pub const ENV_PREFIX: &str = "AEGIS";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON Lines file; `None` keeps the log in memory
    pub path: Option<PathBuf>,
    /// fsync every append before acknowledging it
    pub sync_on_append: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { path: None, sync_on_append: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Records per ingestion epoch before it seals itself
    pub epoch_capacity: usize,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self { epoch_capacity: DEFAULT_EPOCH_CAPACITY }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub audit: AuditConfig,
    pub provenance: ProvenanceConfig,
    pub quorum: QuorumSettings,
    pub logging: LoggingConfig,
}

impl TrustConfig {
    /// Loads defaults, then `path` if given, then `AEGIS__SECTION__KEY`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> TrustResult<Self> {
        Self::load_with_env(path, Self::environment())
    }

    /// As [`TrustConfig::load`], with an explicit environment source.
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> TrustResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&TrustConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: TrustConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    pub fn validate(&self) -> TrustResult<()> {
        if self.provenance.epoch_capacity == 0 {
            return Err(TrustError::Config("provenance.epoch_capacity must be positive".to_string()));
        }
        LevelFilter::from_str(&self.logging.level).map_err(|_| {
            TrustError::Config(format!("logging.level {} is not a log level", self.logging.level))
        })?;
        self.quorum.validate()
    }
}
