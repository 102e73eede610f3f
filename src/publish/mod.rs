//! Publish orchestration
//!
//! The top-level state machine: validate the job, create a project, drive
//! the chunk uploader, commit the transfer, run server-side metadata
//! extraction, then sign and submit the publish request. Each stage is a
//! named function returning a result; the orchestrator composes them and
//! reports progress through the job's status callback.

pub mod payload;

use crate::caption::{self, HttpMentionLookup};
use crate::config::Config;
use crate::http::{self, HttpClient, HttpError, HttpSettings};
use crate::session::Session;
use crate::signer::{Signer, SignerError};
use crate::sigv4::{RequestSigner, SigningError};
use crate::upload::{ChunkUploader, UploadError, UploadSession};
use bon::Builder;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use payload::{PayloadParts, PrivacySettingInfo, PublishPayload};

/// Minimum scheduling offset accepted by the platform (20 minutes).
pub const MIN_SCHEDULE_OFFSET_SECS: u64 = 900;
/// Maximum scheduling offset accepted by the platform (10 days).
pub const MAX_SCHEDULE_OFFSET_SECS: u64 = 864_000;
/// Caption limit in platform-visible characters, not bytes.
pub const MAX_CAPTION_CHARS: usize = 2200;

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/68.0.3440.106 Safari/537.36";

/// Desktop pool rotated per publish attempt.
const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
];

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("session has no usable session id; run the login flow first")]
    MissingSessionId,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("project creation failed: {0}")]
    ProjectCreation(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Caption(#[from] caption::CaptionError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("platform did not issue an msToken cookie")]
    MissingMsToken,

    #[error("publish rejected by platform (status_code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid portal url: {0}")]
    InvalidUrl(String),
}

/// Validation failures rejected before any network call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "schedule offset must be between {MIN_SCHEDULE_OFFSET_SECS} and \
         {MAX_SCHEDULE_OFFSET_SECS} seconds (20 minutes to 10 days)"
    )]
    ScheduleOutOfRange(u64),

    #[error("caption is {0} characters, limit is {MAX_CAPTION_CHARS}")]
    CaptionTooLong(usize),

    #[error("private videos cannot be scheduled")]
    PrivateScheduleConflict,

    #[error("video payload is empty")]
    EmptyVideo,
}

/// Post visibility, in the platform's numeric encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn code(self) -> i64 {
        match self {
            Visibility::Public => 0,
            Visibility::Private => 1,
        }
    }
}

/// One publish request. Immutable after validation; the video bytes are
/// the caller's already-transcoded artifact.
#[derive(Debug, Clone, Builder)]
pub struct UploadJob {
    pub video: Vec<u8>,
    #[builder(into)]
    pub caption: String,
    /// Relative seconds from now; zero publishes immediately.
    #[builder(default)]
    pub schedule_offset_secs: u64,
    #[builder(default = true)]
    pub allow_comment: bool,
    #[builder(default)]
    pub allow_duet: bool,
    #[builder(default)]
    pub allow_stitch: bool,
    #[builder(default)]
    pub visibility: Visibility,
    /// AI-disclosure label; zero disables the disclosure block.
    #[builder(default)]
    pub ai_label: i64,
    #[builder(default)]
    pub brand_organic_type: i64,
    #[builder(default)]
    pub branded_content_type: i64,
    #[builder(into)]
    pub proxy: Option<String>,
    /// Overrides the datacenter stored with the session.
    #[builder(into)]
    pub datacenter: Option<String>,
}

pub fn validate_job(job: &UploadJob) -> Result<(), ValidationError> {
    let offset = job.schedule_offset_secs;
    if offset != 0 && !(MIN_SCHEDULE_OFFSET_SECS..=MAX_SCHEDULE_OFFSET_SECS).contains(&offset) {
        return Err(ValidationError::ScheduleOutOfRange(offset));
    }

    let caption_chars = job.caption.chars().count();
    if caption_chars > MAX_CAPTION_CHARS {
        return Err(ValidationError::CaptionTooLong(caption_chars));
    }

    if offset != 0 && job.visibility == Visibility::Private {
        return Err(ValidationError::PrivateScheduleConflict);
    }

    if job.video.is_empty() {
        return Err(ValidationError::EmptyVideo);
    }

    Ok(())
}

/// Per-job hooks: a status callback for progress/audit, and a cleanup
/// hook for the processed video artifact that runs exactly once on every
/// exit path (including cancellation).
#[derive(Default)]
pub struct PublishHooks {
    status: Option<Box<dyn Fn(&str) + Send + Sync>>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl PublishHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(callback));
        self
    }

    pub fn with_cleanup(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(hook));
        self
    }
}

struct StatusReporter {
    callback: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl StatusReporter {
    fn report(&self, message: &str) {
        info!("{message}");
        if let Some(callback) = &self.callback {
            callback(message);
        }
    }
}

/// Runs the cleanup hook when dropped, so the sanitized artifact is
/// released no matter where the flow exits.
struct CleanupGuard {
    hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DatacenterSource {
    Override,
    Session,
    Fallback,
}

fn resolve_datacenter(
    job_override: Option<&str>,
    session_dc: Option<&str>,
    fallback: &str,
) -> (String, DatacenterSource) {
    match (job_override, session_dc) {
        (Some(dc), _) => (dc.to_string(), DatacenterSource::Override),
        (None, Some(dc)) => (dc.to_string(), DatacenterSource::Session),
        (None, None) => (fallback.to_string(), DatacenterSource::Fallback),
    }
}

/// Random correlation token tying project creation to the publish
/// attempt: letters, digits and underscore.
fn creation_token(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn pick_user_agent() -> String {
    use rand::seq::SliceRandom;
    let mut rng = rand::thread_rng();
    USER_AGENT_POOL
        .choose(&mut rng)
        .copied()
        .unwrap_or(FALLBACK_USER_AGENT)
        .to_string()
}

/// Extract the most specific diagnostic a platform response offers.
fn response_diagnostic(value: &Value, raw_body: &str) -> String {
    for key in ["status_msg", "message", "error"] {
        if let Some(msg) = value.get(key).and_then(Value::as_str) {
            if !msg.is_empty() {
                return msg.to_string();
            }
        }
    }
    let preview: String = raw_body.chars().take(500).collect();
    let preview = preview.trim();
    if preview.is_empty() {
        "unknown error".to_string()
    } else {
        preview.to_string()
    }
}

/// Top-level publisher. The signer is injected so tests never spawn the
/// real helper process.
pub struct Publisher {
    config: Config,
    signer: Arc<dyn Signer>,
}

impl Publisher {
    pub fn new(config: Config, signer: Arc<dyn Signer>) -> Self {
        Self { config, signer }
    }

    /// Publish one video. The cleanup hook is guaranteed to run exactly
    /// once whether this succeeds, fails or is cancelled.
    pub async fn publish(
        &self,
        session: &Session,
        job: &UploadJob,
        hooks: PublishHooks,
    ) -> Result<(), PublishError> {
        let PublishHooks { status, cleanup } = hooks;
        let reporter = StatusReporter { callback: status };
        let _cleanup = CleanupGuard { hook: cleanup };

        self.run(session, job, &reporter).await
    }

    async fn run(
        &self,
        session: &Session,
        job: &UploadJob,
        reporter: &StatusReporter,
    ) -> Result<(), PublishError> {
        validate_job(job)?;

        if session.session_id.is_empty() {
            return Err(PublishError::MissingSessionId);
        }

        let platform = &self.config.platform;
        let portal = platform.portal_base.trim_end_matches('/').to_string();
        let portal_url = Url::parse(&format!("{portal}/"))
            .map_err(|e| PublishError::InvalidUrl(e.to_string()))?;
        let scheme = portal_url.scheme().to_string();

        let (datacenter, source) = resolve_datacenter(
            job.datacenter.as_deref(),
            session.datacenter_id.as_deref(),
            &platform.fallback_datacenter,
        );
        match source {
            DatacenterSource::Override => {
                reporter.report(&format!("Using requested datacenter '{datacenter}'"));
            }
            DatacenterSource::Session => {}
            DatacenterSource::Fallback => {
                warn!(datacenter, "Session carries no datacenter id, using fallback region");
                reporter.report(&format!(
                    "Session has no datacenter id; falling back to '{datacenter}' (requests may be rejected)"
                ));
            }
        }
        reporter.report(&format!("Datacenter assigned: {datacenter}"));

        let user_agent = pick_user_agent();

        let settings = HttpSettings {
            connect_timeout: Duration::from_secs(self.config.http.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.config.http.request_timeout_secs),
            user_agent: user_agent.clone(),
            proxy: job.proxy.clone().or_else(|| self.config.http.proxy.clone()),
        };
        let http = HttpClient::new(&settings)?;

        http.set_cookie(&portal_url, "sessionid", &session.session_id);
        http.set_cookie(&portal_url, "tt-target-idc", &datacenter);

        reporter.report("Uploading video...");

        let creation_id = creation_token(21);
        let project_id = self.create_project(&http, &portal, &creation_id).await?;
        reporter.report(&format!("Project created ({project_id})"));

        let uploader = ChunkUploader::new(
            &http,
            &portal,
            &scheme,
            RequestSigner::new(&platform.signing_region, &platform.signing_service),
            platform.app_id,
        );
        let upload = uploader.upload(&job.video).await?;
        reporter.report(&format!(
            "Transferred {} chunk(s) for video {}",
            upload.checksums.len(),
            upload.video_id
        ));

        self.finish_upload(&http, &scheme, &upload).await?;
        reporter.report("Chunked transfer committed");

        self.commit_get_meta(&http, &portal, &upload).await?;
        reporter.report("Server-side metadata extraction requested");

        self.preflight(&http, &portal).await?;
        reporter.report("Portal preflight complete");

        let lookup = HttpMentionLookup::new(&http, &portal);
        let (markup_text, text_extra) = caption::resolve_caption(&job.caption, &lookup).await?;
        reporter.report(&format!("Caption resolved with {} tag(s)", text_extra.len()));

        let schedule_time = (job.schedule_offset_secs > 0).then(|| {
            job.schedule_offset_secs as i64 + OffsetDateTime::now_utc().unix_timestamp()
        });

        let publish_payload = PublishPayload::assemble(PayloadParts {
            creation_id: &creation_id,
            video_id: &upload.video_id,
            caption: &job.caption,
            markup_text: &markup_text,
            text_extra,
            privacy: PrivacySettingInfo {
                visibility_type: job.visibility.code(),
                allow_duet: i64::from(job.allow_duet),
                allow_stitch: i64::from(job.allow_stitch),
                allow_comment: i64::from(job.allow_comment),
            },
            schedule_time,
            ai_label: job.ai_label,
            brand_organic_type: job.brand_organic_type,
            branded_content_type: job.branded_content_type,
        });

        self.sign_and_submit(
            &http,
            &portal,
            &portal_url,
            &user_agent,
            &publish_payload,
            reporter,
        )
        .await?;

        let mut message = "Published successfully".to_string();
        if job.schedule_offset_secs > 0 {
            message.push_str(&format!(
                " | Scheduled for {} seconds from now",
                job.schedule_offset_secs
            ));
        }
        reporter.report(&message);

        Ok(())
    }

    /// Stage 1: create a project and extract its id. A missing id is
    /// fatal; the error carries whatever diagnostic the response offers.
    async fn create_project(
        &self,
        http: &HttpClient,
        portal: &str,
        creation_id: &str,
    ) -> Result<String, PublishError> {
        let url = format!(
            "{portal}/api/v1/web/project/create/?creation_id={creation_id}&type=1&aid={}",
            self.config.platform.app_id
        );

        let response = http.inner().post(&url).send().await?;
        let response = http::require_success(response).await?;

        let raw = response.text().await?;
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

        let project_id = value
            .get("project")
            .and_then(|p| p.get("project_id"))
            .and_then(|id| match id {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        project_id.ok_or_else(|| PublishError::ProjectCreation(response_diagnostic(&value, &raw)))
    }

    /// Stage 3: commit the chunked transfer with the ordered
    /// `index:checksum` list.
    async fn finish_upload(
        &self,
        http: &HttpClient,
        scheme: &str,
        upload: &UploadSession,
    ) -> Result<(), PublishError> {
        let url = format!(
            "{scheme}://{}/{}?uploadID={}&phase=finish&uploadmode=part",
            upload.upload_host, upload.store_uri, upload.upload_id
        );
        let body = upload
            .checksums
            .iter()
            .enumerate()
            .map(|(i, crc)| format!("{}:{crc}", i + 1))
            .collect::<Vec<_>>()
            .join(",");

        let response = http
            .inner()
            .post(&url)
            .header("Authorization", &upload.store_auth)
            .header("Content-Type", "text/plain;charset=UTF-8")
            .body(body)
            .send()
            .await?;
        http::require_success(response).await?;
        Ok(())
    }

    /// Stage 4: ask the platform to extract metadata from the stored
    /// video, signed with the storage credentials.
    async fn commit_get_meta(
        &self,
        http: &HttpClient,
        portal: &str,
        upload: &UploadSession,
    ) -> Result<(), PublishError> {
        let url = format!(
            "{portal}/top/v1?Action=CommitUploadInner&Version=2020-11-19&SpaceName=tiktok"
        );
        let parsed = Url::parse(&url).map_err(|e| PublishError::InvalidUrl(e.to_string()))?;

        let body = serde_json::json!({
            "SessionKey": upload.session_key,
            "Functions": [{"name": "GetMeta"}],
        })
        .to_string();

        let signer = RequestSigner::new(
            &self.config.platform.signing_region,
            &self.config.platform.signing_service,
        );
        let mut request = http.inner().post(parsed.clone()).body(body.clone());
        for (name, value) in signer.sign("POST", &parsed, body.as_bytes(), &upload.credentials)? {
            request = request.header(name, value);
        }

        http::require_success(request.send().await?).await?;
        Ok(())
    }

    /// Stage 5: unauthenticated preflight against the portal root to
    /// warm cookies.
    async fn preflight(&self, http: &HttpClient, portal: &str) -> Result<(), PublishError> {
        let response = http.inner().head(format!("{portal}/")).send().await?;
        http::require_success(response).await?;
        Ok(())
    }

    /// Stage 8: acquire the anti-bot token, sign the exact outgoing
    /// publish URL and submit once. `status_code == 0` is the only
    /// success discriminator; any other value is terminal.
    async fn sign_and_submit(
        &self,
        http: &HttpClient,
        portal: &str,
        portal_url: &Url,
        user_agent: &str,
        publish_payload: &PublishPayload,
        reporter: &StatusReporter,
    ) -> Result<(), PublishError> {
        let ms_token = match http.cookie(portal_url, "msToken") {
            Some(token) => token,
            None => {
                // The platform only issues msToken after a page visit.
                reporter.report("Bootstrapping anti-bot token...");
                let response = http.inner().get(format!("{portal}/")).send().await?;
                http::require_success(response).await?;
                http.cookie(portal_url, "msToken")
                    .ok_or(PublishError::MissingMsToken)?
            }
        };

        let app_id = self.config.platform.app_id.to_string();
        let publish_url = format!("{portal}/tiktok/web/project/post/v1/");
        // The token is percent-encoded exactly as the submitted query will
        // carry it, so the signed URL and the sent URL stay byte-identical.
        let sign_target = format!(
            "{publish_url}?app_name=tiktok_web&channel=tiktok_web&device_platform=web&aid={app_id}&msToken={}",
            urlencoding::encode(&ms_token)
        );

        let bundle = self.signer.sign(&sign_target, user_agent).await?;
        reporter.report("Publish request signed");

        let response = http
            .inner()
            .post(&publish_url)
            .query(&[
                ("app_name", "tiktok_web"),
                ("channel", "tiktok_web"),
                ("device_platform", "web"),
                ("aid", app_id.as_str()),
                ("msToken", ms_token.as_str()),
                ("X-Bogus", bundle.x_bogus.as_str()),
                ("_signature", bundle.signature.as_str()),
            ])
            .json(publish_payload)
            .send()
            .await?;
        let response = http::require_success(response).await?;

        let raw = response.text().await?;
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        let status_code = value
            .get("status_code")
            .and_then(Value::as_i64)
            .unwrap_or(-1);

        if status_code == 0 {
            return Ok(());
        }

        Err(PublishError::Rejected {
            code: status_code,
            message: response_diagnostic(&value, &raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(schedule_offset_secs: u64, visibility: Visibility) -> UploadJob {
        UploadJob::builder()
            .video(vec![1u8; 16])
            .caption("hello")
            .schedule_offset_secs(schedule_offset_secs)
            .visibility(visibility)
            .build()
    }

    #[test]
    fn schedule_offset_boundaries() {
        assert!(validate_job(&job(0, Visibility::Public)).is_ok());
        assert_eq!(
            validate_job(&job(899, Visibility::Public)),
            Err(ValidationError::ScheduleOutOfRange(899))
        );
        assert!(validate_job(&job(900, Visibility::Public)).is_ok());
        assert!(validate_job(&job(864_000, Visibility::Public)).is_ok());
        assert_eq!(
            validate_job(&job(864_001, Visibility::Public)),
            Err(ValidationError::ScheduleOutOfRange(864_001))
        );
    }

    #[test]
    fn private_videos_cannot_be_scheduled() {
        assert_eq!(
            validate_job(&job(1000, Visibility::Private)),
            Err(ValidationError::PrivateScheduleConflict)
        );
        // Private without schedule is fine
        assert!(validate_job(&job(0, Visibility::Private)).is_ok());
    }

    #[test]
    fn caption_length_counts_characters() {
        let mut j = job(0, Visibility::Public);

        j.caption = "é".repeat(MAX_CAPTION_CHARS);
        assert!(validate_job(&j).is_ok());

        j.caption = "é".repeat(MAX_CAPTION_CHARS + 1);
        assert_eq!(
            validate_job(&j),
            Err(ValidationError::CaptionTooLong(MAX_CAPTION_CHARS + 1))
        );
    }

    #[test]
    fn empty_video_is_rejected_before_any_network_call() {
        let mut j = job(0, Visibility::Public);
        j.video.clear();
        assert_eq!(validate_job(&j), Err(ValidationError::EmptyVideo));
    }

    #[test]
    fn creation_token_charset_and_length() {
        let token = creation_token(21);
        assert_eq!(token.len(), 21);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        );
    }

    #[test]
    fn datacenter_resolution_order() {
        assert_eq!(
            resolve_datacenter(Some("eu1"), Some("useast2a"), "fallback"),
            ("eu1".to_string(), DatacenterSource::Override)
        );
        assert_eq!(
            resolve_datacenter(None, Some("useast2a"), "fallback"),
            ("useast2a".to_string(), DatacenterSource::Session)
        );
        assert_eq!(
            resolve_datacenter(None, None, "fallback"),
            ("fallback".to_string(), DatacenterSource::Fallback)
        );
    }

    #[test]
    fn cleanup_guard_runs_exactly_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        {
            let _guard = CleanupGuard {
                hook: Some(Box::new(|| {
                    CALLS.fetch_add(1, Ordering::SeqCst);
                })),
            };
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn response_diagnostic_prefers_status_msg() {
        let value: Value =
            serde_json::from_str(r#"{"status_msg": "too fast", "message": "other"}"#).unwrap();
        assert_eq!(response_diagnostic(&value, "raw"), "too fast");

        let empty = Value::Null;
        assert_eq!(response_diagnostic(&empty, "  <html>oops</html>  "), "<html>oops</html>");
        assert_eq!(response_diagnostic(&empty, ""), "unknown error");
    }

    #[test]
    fn job_builder_defaults() {
        let j = UploadJob::builder()
            .video(vec![1])
            .caption("c")
            .build();

        assert_eq!(j.schedule_offset_secs, 0);
        assert!(j.allow_comment);
        assert!(!j.allow_duet);
        assert!(!j.allow_stitch);
        assert_eq!(j.visibility, Visibility::Public);
        assert_eq!(j.ai_label, 0);
        assert!(j.proxy.is_none());
        assert!(j.datacenter.is_none());
    }
}
