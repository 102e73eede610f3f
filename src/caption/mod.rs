//! Caption rewriting into the platform's hashtag/mention markup
//!
//! Captions are scanned left-to-right in a single pass; `#tag` tokens wrap
//! as `<h id="N">`, `@user` tokens as `<m id="N">`, everything else passes
//! through. Offsets in the tag-extra records are computed over the
//! original text positions (Unicode scalar values), not the rewritten
//! markup.

use crate::http::HttpClient;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// `type` discriminator used by the platform for mention records.
pub const TAG_TYPE_MENTION: u8 = 0;
/// `type` discriminator used by the platform for hashtag records.
pub const TAG_TYPE_HASHTAG: u8 = 1;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("mention lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, CaptionError>;

/// One tag-extra record attached to the publish payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextExtra {
    pub start: usize,
    pub end: usize,
    pub hashtag_name: String,
    pub user_id: String,
    pub tag_id: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

impl TextExtra {
    fn hashtag(start: usize, end: usize, name: &str, tag_index: usize) -> Self {
        Self {
            start,
            end,
            hashtag_name: name.to_string(),
            user_id: String::new(),
            tag_id: tag_index.to_string(),
            kind: TAG_TYPE_HASHTAG,
        }
    }

    fn mention(start: usize, end: usize, user_id: &str, tag_index: usize) -> Self {
        Self {
            start,
            end,
            hashtag_name: String::new(),
            user_id: user_id.to_string(),
            tag_id: tag_index.to_string(),
            kind: TAG_TYPE_MENTION,
        }
    }
}

/// Resolves an `@handle` to the platform's numeric user id.
///
/// A lookup failure is reported as `Ok(None)`: the caller falls back to
/// the raw handle so the tag is never silently dropped.
#[async_trait]
pub trait MentionLookup: Send + Sync {
    async fn user_id(&self, handle: &str) -> Result<Option<String>>;
}

/// Looks mentions up on the public profile page, extracting the id from
/// the embedded user-detail JSON blob. The marker match is brittle by
/// nature; any miss degrades to the raw-handle fallback.
pub struct HttpMentionLookup<'a> {
    http: &'a HttpClient,
    portal_base: &'a str,
}

const USER_ID_MARKER: &str = r#"webapp.user-detail":{"userInfo":{"user":{"id":""#;

impl<'a> HttpMentionLookup<'a> {
    pub fn new(http: &'a HttpClient, portal_base: &'a str) -> Self {
        Self { http, portal_base }
    }
}

#[async_trait]
impl MentionLookup for HttpMentionLookup<'_> {
    async fn user_id(&self, handle: &str) -> Result<Option<String>> {
        let url = format!("{}/@{handle}", self.portal_base);

        let response = match self.http.inner().get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(handle, error = %e, "Mention lookup request failed");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            warn!(handle, status = response.status().as_u16(), "Mention lookup rejected");
            return Ok(None);
        }

        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(handle, error = %e, "Mention lookup body unreadable");
                return Ok(None);
            }
        };

        Ok(extract_user_id(&html))
    }
}

fn extract_user_id(html: &str) -> Option<String> {
    let tail = &html[html.find(USER_ID_MARKER)? + USER_ID_MARKER.len()..];
    let end = tail.find('"')?;
    let id = &tail[..end];
    (!id.is_empty()).then(|| id.to_string())
}

fn is_hashtag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_mention_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// Rewrite a caption into markup plus ordered tag-extra records.
///
/// Offsets track cumulative consumed length of the original text,
/// including each token's leading symbol. A lone `#`/`@` with no token
/// body is literal text and still advances the offset cursor.
///
/// The `id`/`tag_id` counter numbers every scanned token in order,
/// literal runs included, matching the platform web client's numbering.
/// Bare `#`/`@` symbols are not tokens and do not advance the counter.
pub async fn resolve_caption(
    text: &str,
    lookup: &dyn MentionLookup,
) -> Result<(String, Vec<TextExtra>)> {
    let chars: Vec<char> = text.chars().collect();
    let mut markup = String::with_capacity(text.len());
    let mut extras = Vec::new();

    let mut pos = 0;
    let mut cursor = 0;
    let mut token_index = 0;

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                let word: String = chars[pos + 1..]
                    .iter()
                    .take_while(|c| is_hashtag_char(**c))
                    .collect();
                if word.is_empty() {
                    markup.push('#');
                    pos += 1;
                    cursor += 1;
                    continue;
                }

                let len = word.chars().count() + 1;
                extras.push(TextExtra::hashtag(cursor, cursor + len, &word, token_index));
                markup.push_str(&format!("<h id=\"{token_index}\">#{word}</h>"));
                token_index += 1;
                pos += len;
                cursor += len;
            }
            '@' => {
                let handle: String = chars[pos + 1..]
                    .iter()
                    .take_while(|c| is_mention_char(**c))
                    .collect();
                if handle.is_empty() {
                    markup.push('@');
                    pos += 1;
                    cursor += 1;
                    continue;
                }

                let user_id = lookup
                    .user_id(&handle)
                    .await?
                    .unwrap_or_else(|| handle.clone());

                let len = handle.chars().count() + 1;
                extras.push(TextExtra::mention(cursor, cursor + len, &user_id, token_index));
                markup.push_str(&format!("<m id=\"{token_index}\">@{handle}</m>"));
                token_index += 1;
                pos += len;
                cursor += len;
            }
            _ => {
                let run: String = chars[pos..]
                    .iter()
                    .take_while(|c| **c != '#' && **c != '@')
                    .collect();
                let len = run.chars().count();
                markup.push_str(&run);
                token_index += 1;
                pos += len;
                cursor += len;
            }
        }
    }

    Ok((markup, extras))
}
