//! Publish request payload
//!
//! Wire shape expected by the web publish endpoint. Field names and the
//! fixed constants (`enter_post_page_from`, `post_type`, `tcm_params`)
//! mirror what the platform's own web client sends.

use crate::caption::TextExtra;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PublishPayload {
    pub post_common_info: PostCommonInfo,
    pub feature_common_info_list: Vec<FeatureCommonInfo>,
    pub single_post_req_list: Vec<SinglePostReq>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostCommonInfo {
    pub creation_id: String,
    pub enter_post_page_from: i64,
    pub post_type: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureCommonInfo {
    pub geofencing_regions: Vec<String>,
    pub playlist_name: String,
    pub playlist_id: String,
    pub tcm_params: String,
    pub sound_exemption: i64,
    pub anchors: Vec<serde_json::Value>,
    pub vedit_common_info: VeditCommonInfo,
    pub privacy_setting_info: PrivacySettingInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aigc_info: Option<AigcInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VeditCommonInfo {
    pub draft: String,
    pub video_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacySettingInfo {
    pub visibility_type: i64,
    pub allow_duet: i64,
    pub allow_stitch: i64,
    pub allow_comment: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AigcInfo {
    pub aigc_label_type: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinglePostReq {
    pub batch_index: i64,
    pub video_id: String,
    pub is_long_video: i64,
    pub single_post_feature_info: SinglePostFeatureInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinglePostFeatureInfo {
    pub text: String,
    pub text_extra: Vec<TextExtra>,
    pub markup_text: String,
    pub music_info: serde_json::Map<String, serde_json::Value>,
    pub poster_delay: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aigc_info: Option<AigcInfo>,
}

/// Inputs assembled by the orchestrator before the signing loop.
pub struct PayloadParts<'a> {
    pub creation_id: &'a str,
    pub video_id: &'a str,
    pub caption: &'a str,
    pub markup_text: &'a str,
    pub text_extra: Vec<TextExtra>,
    pub privacy: PrivacySettingInfo,
    /// Absolute unix seconds; `None` publishes immediately.
    pub schedule_time: Option<i64>,
    /// AI-disclosure label; zero means no disclosure block.
    pub ai_label: i64,
    pub brand_organic_type: i64,
    pub branded_content_type: i64,
}

/// The commerce toggle block is an embedded JSON string on the wire.
/// Unset brand flags keep the web client's fixed empty block.
fn tcm_params(brand_organic_type: i64, branded_content_type: i64) -> String {
    let mut toggles = serde_json::Map::new();
    if brand_organic_type != 0 {
        toggles.insert("brand_organic_type".to_string(), brand_organic_type.into());
    }
    if branded_content_type != 0 {
        toggles.insert(
            "branded_content_type".to_string(),
            branded_content_type.into(),
        );
    }
    serde_json::json!({ "commerce_toggle_info": toggles }).to_string()
}

impl PublishPayload {
    pub fn assemble(parts: PayloadParts<'_>) -> Self {
        let aigc_info =
            (parts.ai_label != 0).then_some(AigcInfo { aigc_label_type: parts.ai_label });

        Self {
            post_common_info: PostCommonInfo {
                creation_id: parts.creation_id.to_string(),
                enter_post_page_from: 1,
                post_type: 3,
            },
            feature_common_info_list: vec![FeatureCommonInfo {
                geofencing_regions: Vec::new(),
                playlist_name: String::new(),
                playlist_id: String::new(),
                tcm_params: tcm_params(parts.brand_organic_type, parts.branded_content_type),
                sound_exemption: 0,
                anchors: Vec::new(),
                vedit_common_info: VeditCommonInfo {
                    draft: String::new(),
                    video_id: parts.video_id.to_string(),
                },
                privacy_setting_info: parts.privacy.clone(),
                schedule_time: parts.schedule_time,
                aigc_info,
            }],
            single_post_req_list: vec![SinglePostReq {
                batch_index: 0,
                video_id: parts.video_id.to_string(),
                is_long_video: 0,
                single_post_feature_info: SinglePostFeatureInfo {
                    text: parts.caption.to_string(),
                    text_extra: parts.text_extra,
                    markup_text: parts.markup_text.to_string(),
                    music_info: serde_json::Map::new(),
                    poster_delay: 0,
                    aigc_info,
                },
            }],
        }
    }
}
