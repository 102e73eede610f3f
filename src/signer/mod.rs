//! Anti-bot signature acquisition
//!
//! The request-integrity tokens (`X-Bogus`, `_signature`) come from a
//! proprietary client-side algorithm replicated by an external Node
//! helper. The helper is a foreign-process capability boundary, so it is
//! modeled as an injectable trait and stubbed in tests.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error(
        "signature helper dependency is missing: {0}. \
         Run 'npm install' inside the helper directory."
    )]
    MissingNodeModule(String),

    #[error(
        "signature helper browser binaries are missing: {0}. \
         Run 'npx playwright install chromium' inside the helper directory."
    )]
    MissingBrowser(String),

    #[error("signature helper failed: {0}")]
    Helper(String),

    #[error("signature helper returned no data")]
    NoData,

    #[error("signature helper output could not be parsed: {0}")]
    Parse(String),

    #[error("signature helper did not finish within {0:?}")]
    Timeout(Duration),

    #[error("could not start signature helper: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignerError>;

/// Signature parameters for one outgoing URL/user-agent pair.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SignatureBundle {
    #[serde(rename = "x-bogus")]
    pub x_bogus: String,
    pub signature: String,
    #[serde(default)]
    pub signed_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelperOutput {
    data: SignatureBundle,
}

/// Produces anti-bot signature parameters for an exact outgoing URL.
///
/// Implementations must not cache results across URLs: the signed query
/// embeds the msToken, which changes between attempts.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, url: &str, user_agent: &str) -> Result<SignatureBundle>;
}

/// Signer backed by the external Node helper script.
pub struct NodeSigner {
    node_binary: PathBuf,
    script: PathBuf,
    timeout: Duration,
}

impl NodeSigner {
    pub fn new(node_binary: impl Into<PathBuf>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            node_binary: node_binary.into(),
            script: script.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Signer for NodeSigner {
    async fn sign(&self, url: &str, user_agent: &str) -> Result<SignatureBundle> {
        debug!(script = %self.script.display(), "Invoking signature helper");

        let output = Command::new(&self.node_binary)
            .arg(&self.script)
            .arg(url)
            .arg(user_agent)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| SignerError::Timeout(self.timeout))??;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            return Err(classify_stderr(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(SignerError::NoData);
        }

        let parsed: HelperOutput =
            serde_json::from_str(&stdout).map_err(|e| SignerError::Parse(e.to_string()))?;
        Ok(parsed.data)
    }
}

/// Map known helper failure modes onto actionable remediation errors.
fn classify_stderr(stderr: &str) -> SignerError {
    if stderr.contains("Cannot find module") {
        return SignerError::MissingNodeModule(stderr.to_string());
    }
    if stderr.contains("Executable doesn't exist") || stderr.contains("browserType.launch") {
        return SignerError::MissingBrowser(stderr.to_string());
    }
    if stderr.is_empty() {
        return SignerError::Helper("unknown error".to_string());
    }
    SignerError::Helper(stderr.to_string())
}
