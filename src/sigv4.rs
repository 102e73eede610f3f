//! Region-scoped request signing for the platform's storage backend
//!
//! The upload credential handshake returns a short-lived key/secret/token
//! triple that must sign the ApplyUploadInner/CommitUploadInner calls with
//! the AWS Signature Version 4 scheme. Only `host`, `x-amz-date` and
//! `x-amz-security-token` participate in the signature, matching what the
//! platform's web client signs.

use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing timestamp could not be formatted: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("url has no host: {0}")]
    MissingHost(String),
}

/// Short-lived storage credentials issued by the upload auth endpoint.
///
/// `secret_acess_key` is the platform's own (misspelled) field name.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageCredentials {
    pub access_key_id: String,
    #[serde(rename = "secret_acess_key")]
    pub secret_access_key: String,
    pub session_token: String,
}

/// SigV4 signer scoped to one region/service pair.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    /// Sign a request, returning the headers to attach to it.
    ///
    /// Produces `X-Amz-Date`, `X-Amz-Security-Token` and `Authorization`.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        credentials: &StorageCredentials,
    ) -> Result<Vec<(String, String)>, SigningError> {
        self.sign_at(method, url, body, credentials, OffsetDateTime::now_utc())
    }

    fn sign_at(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        credentials: &StorageCredentials,
        now: OffsetDateTime,
    ) -> Result<Vec<(String, String)>, SigningError> {
        let long_date = now.format(format_description!(
            "[year][month][day]T[hour][minute][second]Z"
        ))?;
        let short_date = &long_date[..8];

        let host = host_header(url)?;
        let scope = format!(
            "{short_date}/{}/{}/aws4_request",
            self.region, self.service
        );

        let payload_hash = hex::encode(Sha256::digest(body));
        let canonical_query = canonical_query(url);

        // host;x-amz-date;x-amz-security-token, lowercase and sorted
        let canonical_headers = format!(
            "host:{host}\nx-amz-date:{long_date}\nx-amz-security-token:{}\n",
            credentials.session_token
        );
        let signed_headers = "host;x-amz-date;x-amz-security-token";

        let canonical_request = format!(
            "{method}\n{path}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            path = canonical_path(url),
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{long_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(short_date, &credentials.secret_access_key);
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        );

        Ok(vec![
            ("X-Amz-Date".to_string(), long_date),
            (
                "X-Amz-Security-Token".to_string(),
                credentials.session_token.clone(),
            ),
            ("Authorization".to_string(), authorization),
        ])
    }

    /// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
    fn signing_key(&self, short_date: &str, secret_key: &str) -> Vec<u8> {
        let k_date = hmac(format!("AWS4{secret_key}").as_bytes(), short_date.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, self.service.as_bytes());
        hmac(&k_service, b"aws4_request")
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn host_header(url: &Url) -> Result<String, SigningError> {
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::MissingHost(url.to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn canonical_path(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() { "/".to_string() } else { path.to_string() }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn test_credentials() -> StorageCredentials {
        StorageCredentials {
            access_key_id: "test_access_key".to_string(),
            secret_access_key: "test_secret_key".to_string(),
            session_token: "test_session_token".to_string(),
        }
    }

    #[test]
    fn sign_produces_expected_headers() {
        let signer = RequestSigner::new("ap-singapore-1", "vod");
        let url = Url::parse(
            "https://www.example.com/top/v1?Action=ApplyUploadInner&Version=2020-11-19",
        )
        .unwrap();

        let headers = signer
            .sign("GET", &url, &[], &test_credentials())
            .unwrap();

        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(names.contains(&"Authorization"));
        assert!(names.contains(&"X-Amz-Date"));
        assert!(names.contains(&"X-Amz-Security-Token"));

        let auth = &headers
            .iter()
            .find(|(k, _)| k == "Authorization")
            .unwrap()
            .1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=test_access_key/"));
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_time() {
        let signer = RequestSigner::new("ap-singapore-1", "vod");
        let url = Url::parse("https://www.example.com/top/v1?b=2&a=1").unwrap();
        let at = datetime!(2024-01-15 12:00:00 UTC);

        let first = signer
            .sign_at("POST", &url, b"{}", &test_credentials(), at)
            .unwrap();
        let second = signer
            .sign_at("POST", &url, b"{}", &test_credentials(), at)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].1, "20240115T120000Z");
    }

    #[test]
    fn canonical_query_sorts_parameters() {
        let url = Url::parse("https://host/path?zeta=1&alpha=two words").unwrap();
        assert_eq!(canonical_query(&url), "alpha=two%20words&zeta=1");
    }

    #[test]
    fn host_header_keeps_explicit_port() {
        let url = Url::parse("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:8080");
    }
}
