//! TikTok Content Posting API handler
//!
//! A direct post is initialized with a `FILE_UPLOAD` source, which returns a
//! `publish_id` and an upload URL. The whole video is then sent to that URL
//! as a single chunk; retries reuse the same upload URL.

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use serde_json::json;

use super::http::{json_string, mime_for, read_media, require_json_string, send, RequestPhase};
use super::registry::HandlerContext;
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

const NAME: &str = "tiktok";

pub struct TikTokHandler {
    endpoint: String,
    privacy_level: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

/// Upload session returned by the init call
#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadSession {
    publish_id: String,
    upload_url: String,
}

impl TikTokHandler {
    pub fn new(ctx: &HandlerContext) -> Self {
        Self {
            endpoint: ctx.endpoint.clone(),
            privacy_level: ctx.setting_or("privacy_level", "SELF_ONLY").to_string(),
            http: ctx.http.clone(),
            retry: ctx.retry,
        }
    }

    async fn init_upload(
        &self,
        content: &ValidatedContent,
        video_size: usize,
        credential: &Credential,
    ) -> Result<UploadSession, PublishError> {
        let url = &format!("{}/post/publish/video/init/", self.endpoint);
        let mut post_info = json!({
            "title": content.description(),
            "privacy_level": self.privacy_level,
            "disable_duet": false,
            "disable_comment": false,
            "disable_stitch": false,
        });
        if let Some(language) = content.language_code() {
            post_info["language"] = json!(language);
        }
        let payload = &json!({
            "post_info": post_info,
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": video_size,
                "total_chunk_count": 1,
            },
        });

        let body = with_retry(&self.retry, NAME, "init upload", move || async move {
            let response = send(
                NAME,
                RequestPhase::Metadata,
                "init upload",
                self.http
                    .post(url)
                    .bearer_auth(&credential.access_token)
                    .json(payload),
            )
            .await?;
            let body = response.json(NAME)?;
            match api_error(&body) {
                Some(error) => Err(error),
                None => Ok(body),
            }
        })
        .await?;

        Ok(UploadSession {
            publish_id: require_json_string(&body, "/data/publish_id", NAME)?,
            upload_url: require_json_string(&body, "/data/upload_url", NAME)?,
        })
    }
}

/// Classify the `error` object TikTok includes in every response
fn api_error(body: &serde_json::Value) -> Option<PublishError> {
    let code = json_string(body, "/error/code")?;
    if code == "ok" {
        return None;
    }
    let message = json_string(body, "/error/message").unwrap_or_default();
    let detail = format!("tiktok returned {}: {}", code, message);

    Some(match code.as_str() {
        "access_token_invalid" | "scope_not_authorized" => PublishError::Auth {
            platform: NAME.to_string(),
            status: None,
            detail,
        },
        "rate_limit_exceeded" | "spam_risk_too_many_pending_share" => PublishError::RateLimit {
            retry_after: None,
            detail,
        },
        "file_format_check_failed" | "invalid_file_upload" => {
            PublishError::MediaRejected(detail)
        }
        _ => PublishError::PermanentPublish(detail),
    })
}

#[async_trait]
impl PlatformHandler for TikTokHandler {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::TIKTOK
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        let video = content.video_file().ok_or_else(|| {
            PublishError::PermanentPublish("tiktok requires a video file".to_string())
        })?;
        let bytes = read_media(video).await?;
        if bytes.is_empty() {
            return Err(PublishError::MediaRejected(format!(
                "{} is empty",
                video.display()
            )));
        }

        let session = self.init_upload(content, bytes.len(), credential).await?;
        let range = format!("bytes 0-{}/{}", bytes.len() - 1, bytes.len());

        with_retry(&self.retry, NAME, "upload video", || {
            send(
                NAME,
                RequestPhase::Upload,
                "upload video",
                self.http
                    .put(&session.upload_url)
                    .header(CONTENT_TYPE, mime_for(video))
                    .header(CONTENT_RANGE, &range)
                    .body(bytes.clone()),
            )
        })
        .await?;

        Ok(PublishReceipt::new(NAME, &session.publish_id)
            .with_note("tiktok processes the video asynchronously after upload"))
    }
}
