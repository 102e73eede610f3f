use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub signer: SignerConfig,
}

/// Session store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/sessions")
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Default proxy; an upload job may carry its own override.
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            proxy: None,
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Platform endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformConfig {
    /// Portal base URL; overridable so tests can point at a local stub.
    #[serde(default = "default_portal_base")]
    pub portal_base: String,
    #[serde(default = "default_signing_region")]
    pub signing_region: String,
    #[serde(default = "default_signing_service")]
    pub signing_service: String,
    /// Routing region used when neither the job nor the session carries one.
    #[serde(default = "default_fallback_datacenter")]
    pub fallback_datacenter: String,
    #[serde(default = "default_app_id")]
    pub app_id: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            portal_base: default_portal_base(),
            signing_region: default_signing_region(),
            signing_service: default_signing_service(),
            fallback_datacenter: default_fallback_datacenter(),
            app_id: default_app_id(),
        }
    }
}

fn default_portal_base() -> String {
    "https://www.tiktok.com".to_string()
}

fn default_signing_region() -> String {
    "ap-singapore-1".to_string()
}

fn default_signing_service() -> String {
    "vod".to_string()
}

fn default_fallback_datacenter() -> String {
    "useast2a".to_string()
}

fn default_app_id() -> u32 {
    1988
}

/// Signature helper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerConfig {
    #[serde(default = "default_node_binary")]
    pub node_binary: PathBuf,
    #[serde(default = "default_signer_script")]
    pub script: PathBuf,
    #[serde(default = "default_signer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            node_binary: default_node_binary(),
            script: default_signer_script(),
            timeout_secs: default_signer_timeout_secs(),
        }
    }
}

fn default_node_binary() -> PathBuf {
    PathBuf::from("node")
}

fn default_signer_script() -> PathBuf {
    PathBuf::from("signature-helper/browser.js")
}

fn default_signer_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();

        assert_eq!(config.platform.portal_base, "https://www.tiktok.com");
        assert_eq!(config.platform.signing_region, "ap-singapore-1");
        assert_eq!(config.platform.fallback_datacenter, "useast2a");
        assert_eq!(config.platform.app_id, 1988);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.signer.timeout_secs, 30);
    }
}
