//! Chunked resumable upload against the platform's content store
//!
//! Flow: authenticated credential handshake, ApplyUploadInner to obtain an
//! upload node, then strictly sequential part transfers carrying a CRC32
//! per chunk. The finish/commit of the transfer is driven by the publish
//! orchestrator, which owns the overall staging.

pub mod chunks;

use crate::http::{self, HttpClient, HttpError};
use crate::sigv4::{RequestSigner, SigningError, StorageCredentials};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use chunks::split_chunks;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("upload auth response missing {0}")]
    MalformedResponse(&'static str),

    #[error("apply upload returned no upload nodes")]
    NoUploadNodes,

    #[error("chunk {index} rejected with HTTP {status}")]
    ChunkRejected { index: usize, status: u16 },

    #[error("invalid upload url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// Server-assigned state for one chunked transfer. Consumed exactly once
/// by the finish/commit step; never reused across uploads.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub video_id: String,
    pub session_key: String,
    pub upload_id: String,
    pub checksums: Vec<String>,
    pub upload_host: String,
    pub store_uri: String,
    pub store_auth: String,
    pub credentials: StorageCredentials,
}

#[derive(Debug, Deserialize)]
struct UploadAuthResponse {
    video_token_v5: Option<StorageCredentials>,
}

#[derive(Debug, Deserialize)]
struct ApplyUploadResponse {
    #[serde(rename = "Result")]
    result: Option<ApplyUploadResult>,
}

#[derive(Debug, Deserialize)]
struct ApplyUploadResult {
    #[serde(rename = "InnerUploadAddress")]
    inner_upload_address: InnerUploadAddress,
}

#[derive(Debug, Deserialize)]
struct InnerUploadAddress {
    #[serde(rename = "UploadNodes")]
    upload_nodes: Vec<UploadNode>,
}

#[derive(Debug, Deserialize)]
struct UploadNode {
    #[serde(rename = "Vid")]
    vid: String,
    #[serde(rename = "UploadHost")]
    upload_host: String,
    #[serde(rename = "SessionKey")]
    session_key: String,
    #[serde(rename = "StoreInfos")]
    store_infos: Vec<StoreInfo>,
}

#[derive(Debug, Deserialize)]
struct StoreInfo {
    #[serde(rename = "StoreUri")]
    store_uri: String,
    #[serde(rename = "Auth")]
    auth: String,
}

/// Uploads one video payload to the content store. Borrows the job's HTTP
/// client; session cookies are already seeded into its jar.
pub struct ChunkUploader<'a> {
    http: &'a HttpClient,
    portal_base: &'a str,
    transfer_scheme: &'a str,
    signer: RequestSigner,
    app_id: u32,
}

impl<'a> ChunkUploader<'a> {
    pub fn new(
        http: &'a HttpClient,
        portal_base: &'a str,
        transfer_scheme: &'a str,
        signer: RequestSigner,
        app_id: u32,
    ) -> Self {
        Self {
            http,
            portal_base,
            transfer_scheme,
            signer,
            app_id,
        }
    }

    /// Run the full chunked transfer and return the server-assigned
    /// upload session.
    pub async fn upload(&self, video: &[u8]) -> Result<UploadSession> {
        let credentials = self.fetch_storage_credentials().await?;
        let node = self.apply_upload(video.len() as u64, &credentials).await?;

        let store = node
            .store_infos
            .into_iter()
            .next()
            .ok_or(UploadError::MalformedResponse("StoreInfos"))?;

        let upload_id = Uuid::new_v4().to_string();
        let checksums = self
            .transfer_chunks(video, &node.upload_host, &store, &upload_id)
            .await?;

        info!(
            video_id = %node.vid,
            chunks = checksums.len(),
            size = video.len(),
            "Chunk transfer complete"
        );

        Ok(UploadSession {
            video_id: node.vid,
            session_key: node.session_key,
            upload_id,
            checksums,
            upload_host: node.upload_host,
            store_uri: store.store_uri,
            store_auth: store.auth,
            credentials,
        })
    }

    /// Step 1: exchange the session cookies for short-lived storage
    /// credentials.
    async fn fetch_storage_credentials(&self) -> Result<StorageCredentials> {
        let url = format!(
            "{}/api/v1/video/upload/auth/?aid={}",
            self.portal_base, self.app_id
        );
        let response = self.http.inner().get(&url).send().await?;
        let response = http::require_success(response).await?;

        let body: UploadAuthResponse = response.json().await?;
        body.video_token_v5
            .ok_or(UploadError::MalformedResponse("video_token_v5"))
    }

    /// Step 2: ask for an upload node, signing the request with the
    /// freshly issued credentials.
    async fn apply_upload(
        &self,
        file_size: u64,
        credentials: &StorageCredentials,
    ) -> Result<UploadNode> {
        let url = format!(
            "{}/top/v1?Action=ApplyUploadInner&Version=2020-11-19&SpaceName=tiktok&FileType=video&IsInner=1&FileSize={file_size}&s={}",
            self.portal_base,
            request_tag(),
        );
        let parsed = Url::parse(&url).map_err(|e| UploadError::InvalidUrl(e.to_string()))?;

        let mut request = self.http.inner().get(parsed.clone());
        for (name, value) in self.signer.sign("GET", &parsed, &[], credentials)? {
            request = request.header(name, value);
        }

        let response = http::require_success(request.send().await?).await?;
        let body: ApplyUploadResponse = response.json().await?;

        body.result
            .ok_or(UploadError::MalformedResponse("Result"))?
            .inner_upload_address
            .upload_nodes
            .into_iter()
            .next()
            .ok_or(UploadError::NoUploadNodes)
    }

    /// Steps 3-4: sequential part transfer, one checksum per chunk.
    /// Every chunk response is verified; a rejected part aborts the
    /// transfer immediately.
    async fn transfer_chunks(
        &self,
        video: &[u8],
        upload_host: &str,
        store: &StoreInfo,
        upload_id: &str,
    ) -> Result<Vec<String>> {
        let mut checksums = Vec::new();

        for chunk in split_chunks(video) {
            let url = format!(
                "{}://{upload_host}/{}?partNumber={}&uploadID={upload_id}&phase=transfer",
                self.transfer_scheme, store.store_uri, chunk.index
            );

            debug!(part = chunk.index, size = chunk.payload.len(), "Transferring chunk");

            let response = self
                .http
                .inner()
                .post(&url)
                .header("Authorization", &store.auth)
                .header("Content-Type", "application/octet-stream")
                .header("Content-Disposition", "attachment; filename=\"undefined\"")
                .header("Content-Crc32", &chunk.crc32)
                .body(chunk.payload.to_vec())
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(UploadError::ChunkRejected {
                    index: chunk.index,
                    status: status.as_u16(),
                });
            }

            checksums.push(chunk.crc32);
        }

        Ok(checksums)
    }
}

/// Random lowercase tag the web client attaches to apply-upload calls.
fn request_tag() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..11)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tag_is_lowercase_alphanumeric() {
        let tag = request_tag();
        assert_eq!(tag.len(), 11);
        assert!(tag.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn apply_response_parses_platform_shape() {
        let raw = r#"{
            "Result": {
                "InnerUploadAddress": {
                    "UploadNodes": [{
                        "Vid": "v0900abc",
                        "UploadHost": "upload.example.com",
                        "SessionKey": "sk-1",
                        "StoreInfos": [{"StoreUri": "store/v0900abc", "Auth": "tok"}]
                    }]
                }
            }
        }"#;

        let parsed: ApplyUploadResponse = serde_json::from_str(raw).unwrap();
        let node = parsed
            .result
            .unwrap()
            .inner_upload_address
            .upload_nodes
            .into_iter()
            .next()
            .unwrap();

        assert_eq!(node.vid, "v0900abc");
        assert_eq!(node.store_infos[0].store_uri, "store/v0900abc");
    }

    #[test]
    fn auth_response_accepts_misspelled_secret_field() {
        let raw = r#"{
            "video_token_v5": {
                "access_key_id": "ak",
                "secret_acess_key": "sk",
                "session_token": "st"
            }
        }"#;

        let parsed: UploadAuthResponse = serde_json::from_str(raw).unwrap();
        let token = parsed.video_token_v5.unwrap();
        assert_eq!(token.secret_access_key, "sk");
    }
}
