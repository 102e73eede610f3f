//! HTTP client wrapper for talking to the platform
//!
//! Each upload job owns its own client (and cookie jar); nothing here is
//! shared between jobs.

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Proxy, Url};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid proxy url: {0}")]
    InvalidProxy(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: "clippost/0.1.0".to_string(),
            proxy: None,
        }
    }
}

/// Cookie-aware HTTP client for a single upload job
pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(&settings.user_agent)
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = &settings.proxy {
            let proxy =
                Proxy::all(url).map_err(|e| HttpError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self { client, jar })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Seed a cookie into the jar for the given origin.
    pub fn set_cookie(&self, url: &Url, name: &str, value: &str) {
        self.jar
            .add_cookie_str(&format!("{name}={value}; Path=/"), url);
    }

    /// Read a single cookie value back out of the jar.
    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let header = header.to_str().ok()?;
        header.split("; ").find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }
}

/// Require a successful status, consuming the body into the error otherwise.
///
/// The body preview is capped so platform HTML error pages stay readable
/// in logs.
pub async fn require_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let preview: String = body.chars().take(500).collect();
    debug!(url, status = status.as_u16(), "Request rejected");

    Err(HttpError::Status {
        url,
        status: status.as_u16(),
        body: preview.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults() {
        let settings = HttpSettings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert!(settings.proxy.is_none());
    }

    #[test]
    fn cookie_roundtrip() {
        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        let url = Url::parse("https://www.example.com/").unwrap();

        client.set_cookie(&url, "sessionid", "abc123");
        client.set_cookie(&url, "msToken", "tok");

        assert_eq!(client.cookie(&url, "sessionid").as_deref(), Some("abc123"));
        assert_eq!(client.cookie(&url, "msToken").as_deref(), Some("tok"));
        assert_eq!(client.cookie(&url, "missing"), None);
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let settings = HttpSettings {
            proxy: Some("not a url".to_string()),
            ..HttpSettings::default()
        };
        assert!(matches!(
            HttpClient::new(&settings),
            Err(HttpError::InvalidProxy(_))
        ));
    }
}
