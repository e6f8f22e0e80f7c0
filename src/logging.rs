use env_logger::Env;

use aegis_core::{TrustError, TrustResult};

use crate::config::LoggingConfig;

/// Installs `env_logger` with the configured default filter. `RUST_LOG`
/// still takes precedence.
pub fn init(config: &LoggingConfig) -> TrustResult<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or(config.level.as_str()))
        .try_init()
        .map_err(|e| TrustError::InvalidState(format!("logger already installed: {}", e)))
}

pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
