//! Facebook Graph API handler
//!
//! Publishes to a page (or the user's own feed when no `page_id` is set) as a
//! video, a photo or a plain text feed post, in that order of preference.

use async_trait::async_trait;
use reqwest::multipart::Form;

use super::http::{json_string, media_part, read_media, send, HttpResponse, RequestPhase};
use super::registry::HandlerContext;
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

const NAME: &str = "facebook";

pub struct FacebookHandler {
    endpoint: String,
    page_id: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl FacebookHandler {
    pub fn new(ctx: &HandlerContext) -> Self {
        Self {
            endpoint: ctx.endpoint.clone(),
            page_id: ctx.setting_or("page_id", "me").to_string(),
            http: ctx.http.clone(),
            retry: ctx.retry,
        }
    }

    fn edge_url(&self, edge: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.page_id, edge)
    }

    async fn post_video(
        &self,
        content: &ValidatedContent,
        video: &std::path::Path,
        credential: &Credential,
    ) -> Result<HttpResponse, PublishError> {
        let bytes = &read_media(video).await?;
        let url = &self.edge_url("videos");

        with_retry(&self.retry, NAME, "upload video", move || async move {
            let mut form = Form::new()
                .part("source", media_part(bytes.clone(), video)?)
                .text("description", content.description().to_string());
            if let Some(title) = content.title() {
                form = form.text("title", title.to_string());
            }
            send(
                NAME,
                RequestPhase::Upload,
                "upload video",
                self.http
                    .post(url)
                    .bearer_auth(&credential.access_token)
                    .multipart(form),
            )
            .await
        })
        .await
    }

    async fn post_photo(
        &self,
        content: &ValidatedContent,
        image: &std::path::Path,
        credential: &Credential,
    ) -> Result<HttpResponse, PublishError> {
        let bytes = &read_media(image).await?;
        let url = &self.edge_url("photos");

        with_retry(&self.retry, NAME, "upload photo", move || async move {
            let form = Form::new()
                .part("source", media_part(bytes.clone(), image)?)
                .text("message", content.description().to_string());
            send(
                NAME,
                RequestPhase::Upload,
                "upload photo",
                self.http
                    .post(url)
                    .bearer_auth(&credential.access_token)
                    .multipart(form),
            )
            .await
        })
        .await
    }

    async fn post_text(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<HttpResponse, PublishError> {
        let url = self.edge_url("feed");

        with_retry(&self.retry, NAME, "create feed post", || {
            send(
                NAME,
                RequestPhase::Metadata,
                "create feed post",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .form(&[("message", content.description())]),
            )
        })
        .await
    }
}

#[async_trait]
impl PlatformHandler for FacebookHandler {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::FACEBOOK
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        let response = match (content.video_file(), content.image_file()) {
            (Some(video), _) => self.post_video(content, video, credential).await?,
            (None, Some(image)) => self.post_photo(content, image, credential).await?,
            (None, None) => self.post_text(content, credential).await?,
        };

        // Photo uploads report the feed story as post_id, the photo itself as id
        let body = response.json(NAME)?;
        let id = json_string(&body, "/post_id")
            .or_else(|| json_string(&body, "/id"))
            .ok_or_else(|| {
                PublishError::PermanentPublish("facebook response is missing an id".to_string())
            })?;

        Ok(PublishReceipt::new(NAME, &id).with_url(format!("https://www.facebook.com/{}", id)))
    }
}
