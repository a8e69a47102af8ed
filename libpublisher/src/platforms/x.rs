//! X (Twitter) API v2 handler
//!
//! Media is uploaded first in a single multipart request; the returned media
//! id is then referenced by the tweet. The two steps retry independently, so a
//! failed tweet creation never uploads the media twice.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde_json::json;

use super::http::{json_string, media_part, read_media, require_json_string, send, RequestPhase};
use super::registry::HandlerContext;
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

const NAME: &str = "x";

pub struct XHandler {
    endpoint: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl XHandler {
    pub fn new(ctx: &HandlerContext) -> Self {
        Self {
            endpoint: ctx.endpoint.clone(),
            http: ctx.http.clone(),
            retry: ctx.retry,
        }
    }

    async fn upload_media(
        &self,
        path: &std::path::Path,
        category: &str,
        credential: &Credential,
    ) -> Result<String, PublishError> {
        let bytes = &read_media(path).await?;
        let url = &format!("{}/media/upload", self.endpoint);

        let response = with_retry(&self.retry, NAME, "upload media", move || async move {
            let form = Form::new()
                .part("media", media_part(bytes.clone(), path)?)
                .text("media_category", category.to_string());
            send(
                NAME,
                RequestPhase::Upload,
                "upload media",
                self.http
                    .post(url)
                    .bearer_auth(&credential.access_token)
                    .multipart(form),
            )
            .await
        })
        .await?;

        let body = response.json(NAME)?;
        json_string(&body, "/data/id")
            .or_else(|| json_string(&body, "/media_id_string"))
            .ok_or_else(|| {
                PublishError::PermanentPublish("x media upload returned no media id".to_string())
            })
    }
}

#[async_trait]
impl PlatformHandler for XHandler {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::X
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        let media_id = match (content.video_file(), content.image_file()) {
            (Some(video), _) => Some(self.upload_media(video, "tweet_video", credential).await?),
            (None, Some(image)) => {
                Some(self.upload_media(image, "tweet_image", credential).await?)
            }
            (None, None) => None,
        };

        let mut tweet = json!({ "text": content.description() });
        if let Some(media_id) = &media_id {
            tweet["media"] = json!({ "media_ids": [media_id] });
        }

        let url = format!("{}/tweets", self.endpoint);
        let response = with_retry(&self.retry, NAME, "create tweet", || {
            send(
                NAME,
                RequestPhase::Metadata,
                "create tweet",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .json(&tweet),
            )
        })
        .await?;

        let id = require_json_string(&response.json(NAME)?, "/data/id", NAME)?;
        let mut receipt = PublishReceipt::new(NAME, &id)
            .with_url(format!("https://x.com/i/web/status/{}", id));
        if content.video_file().is_some() && content.image_file().is_some() {
            receipt = receipt.with_note("image not attached, a tweet carries one video or images");
        }
        Ok(receipt)
    }
}
