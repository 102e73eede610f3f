//! Session credential store
//!
//! Sessions are harvested by an external login flow and persisted as JSON
//! cookie files, one per identity. This core only ever reads them; the
//! `import-session` CLI command is the single write path.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Cookie name carrying the authenticated session secret.
pub const SESSION_ID_COOKIE: &str = "sessionid";
/// Cookie name carrying the datacenter routing hint.
pub const DATACENTER_COOKIE: &str = "tt-target-idc";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no stored session for identity '{0}'")]
    NotFound(String),

    #[error("session for '{0}' has no {SESSION_ID_COOKIE} cookie; run the login flow first")]
    MissingSessionId(String),

    #[error("could not access session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed session file: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// One stored cookie. Extra fields written by the login flow (domain,
/// expiry, ...) are preserved opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A named identity's captured platform session.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub session_id: String,
    pub datacenter_id: Option<String>,
    pub cookies: Vec<SessionCookie>,
}

impl Session {
    /// Build a session from raw cookies, failing fast when the session
    /// secret is absent.
    pub fn from_cookies(identity: impl Into<String>, cookies: Vec<SessionCookie>) -> Result<Self> {
        let identity = identity.into();

        let session_id = cookies
            .iter()
            .find(|c| c.name == SESSION_ID_COOKIE)
            .map(|c| c.value.clone())
            .ok_or_else(|| SessionError::MissingSessionId(identity.clone()))?;

        let datacenter_id = cookies
            .iter()
            .find(|c| c.name == DATACENTER_COOKIE)
            .map(|c| c.value.clone());

        Ok(Self {
            identity,
            session_id,
            datacenter_id,
            cookies,
        })
    }
}

/// File-backed store of named sessions.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("session-{identity}.json"))
    }

    pub fn load(&self, identity: &str) -> Result<Session> {
        let path = self.path(identity);
        if !path.exists() {
            return Err(SessionError::NotFound(identity.to_string()));
        }

        let raw = fs::read_to_string(&path)?;
        let cookies: Vec<SessionCookie> = serde_json::from_str(&raw)?;
        Session::from_cookies(identity, cookies)
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(&session.identity);
        let raw = serde_json::to_string_pretty(&session.cookies)?;
        fs::write(&path, raw)?;
        info!(identity = %session.identity, path = %path.display(), "Session saved");
        Ok(())
    }

    /// Import externally harvested cookies, verifying they carry a usable
    /// session before persisting.
    pub fn import(&self, identity: &str, cookies: Vec<SessionCookie>) -> Result<Session> {
        let session = Session::from_cookies(identity, cookies)?;
        self.save(&session)?;
        Ok(session)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
