//! Configuration management for clippost
//!
//! Layered configuration loaded from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file (default: `config/clippost.toml`,
//!    overridable via `CLIPPOST_CONFIG`)
//! 3. Environment variables (highest priority), pattern
//!    `CLIPPOST__<section>__<key>`, e.g.
//!    `CLIPPOST__PLATFORM__PORTAL_BASE=https://stub.local`

mod models;
mod sources;
mod validation;

pub use models::{Config, HttpConfig, PlatformConfig, SessionConfig, SignerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_validates_portal_base() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");

        fs::write(
            &config_path,
            r#"
[platform]
portal_base = "not-a-url"
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(
                ValidationError::InvalidPortalBase(_)
            ))
        ));
    }
}
