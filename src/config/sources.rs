use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "CLIPPOST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/clippost.toml";
const ENV_PREFIX: &str = "CLIPPOST";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // CLIPPOST__PLATFORM__PORTAL_BASE -> platform.portal_base
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.platform.portal_base, "https://www.tiktok.com");
        assert_eq!(config.http.request_timeout_secs, 60);
    }

    #[test]
    fn load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[session]
store_dir = "/var/lib/clippost/sessions"

[http]
request_timeout_secs = 120
proxy = "http://proxy:8080"

[platform]
portal_base = "https://stub.local:8443"
fallback_datacenter = "useast5"

[signer]
node_binary = "/usr/bin/node"
script = "helper/browser.js"
timeout_secs = 15
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(
            config.session.store_dir.to_str().unwrap(),
            "/var/lib/clippost/sessions"
        );
        assert_eq!(config.http.request_timeout_secs, 120);
        assert_eq!(config.http.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(config.platform.portal_base, "https://stub.local:8443");
        assert_eq!(config.platform.fallback_datacenter, "useast5");
        assert_eq!(config.signer.timeout_secs, 15);
        // Sections not present keep their defaults
        assert_eq!(config.platform.app_id, 1988);
    }
}
