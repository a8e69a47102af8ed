//! Reddit handler
//!
//! Submits a self post to the configured subreddit, then optionally approves
//! it. Reddit reports most submission failures inside a 200 response as
//! `json.errors`, so those are classified here rather than by HTTP status.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::http::{json_string, send, RequestPhase};
use super::registry::HandlerContext;
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

const NAME: &str = "reddit";
const MAX_TITLE_LENGTH: usize = 100;

pub struct RedditHandler {
    endpoint: String,
    subreddit: Option<String>,
    approve: bool,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl RedditHandler {
    pub fn new(ctx: &HandlerContext) -> Self {
        Self {
            endpoint: ctx.endpoint.clone(),
            subreddit: ctx.setting("subreddit").map(str::to_string),
            approve: ctx.flag("approve", true),
            http: ctx.http.clone(),
            retry: ctx.retry,
        }
    }

    async fn approve_post(
        &self,
        fullname: &str,
        credential: &Credential,
    ) -> Result<(), PublishError> {
        let url = format!("{}/api/approve", self.endpoint);
        with_retry(&self.retry, NAME, "approve", || {
            send(
                NAME,
                RequestPhase::Metadata,
                "approve",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .form(&[("id", fullname)]),
            )
        })
        .await?;
        Ok(())
    }
}

/// Post title: the explicit title, else the head of the description
fn post_title(content: &ValidatedContent) -> String {
    match content.title() {
        Some(title) => title.to_string(),
        None => content.description().chars().take(MAX_TITLE_LENGTH).collect(),
    }
}

/// Classify the `json.errors` list of a submit response
fn submit_error(body: &serde_json::Value) -> Option<PublishError> {
    let errors = body.pointer("/json/errors")?.as_array()?;
    let first = errors.first()?.as_array()?;

    let code = first.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
    let message = first.get(1).and_then(|v| v.as_str()).unwrap_or_default();
    let detail = format!("reddit rejected the submission: {} {}", code, message)
        .trim_end()
        .to_string();

    Some(match code {
        "RATELIMIT" => PublishError::RateLimit {
            retry_after: body
                .pointer("/json/ratelimit")
                .and_then(|v| v.as_f64())
                .and_then(|secs| Duration::try_from_secs_f64(secs.max(0.0)).ok()),
            detail,
        },
        "USER_REQUIRED" => PublishError::Auth {
            platform: NAME.to_string(),
            status: None,
            detail,
        },
        _ => PublishError::PermanentPublish(detail),
    })
}

#[async_trait]
impl PlatformHandler for RedditHandler {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::REDDIT
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        let subreddit = self.subreddit.as_deref().ok_or_else(|| {
            PublishError::PermanentPublish("reddit requires the 'subreddit' setting".to_string())
        })?;

        let title = post_title(content);
        let url = &format!("{}/api/submit", self.endpoint);
        let form = &[
            ("sr", subreddit),
            ("kind", "self"),
            ("title", title.as_str()),
            ("text", content.description()),
            ("api_type", "json"),
        ];

        let body = with_retry(&self.retry, NAME, "submit", move || async move {
            let response = send(
                NAME,
                RequestPhase::Metadata,
                "submit",
                self.http
                    .post(url)
                    .bearer_auth(&credential.access_token)
                    .form(form),
            )
            .await?;
            let body = response.json(NAME)?;
            match submit_error(&body) {
                Some(error) => Err(error),
                None => Ok(body),
            }
        })
        .await?;

        let id = json_string(&body, "/json/data/id").ok_or_else(|| {
            PublishError::PermanentPublish("reddit response is missing the post id".to_string())
        })?;
        let fullname =
            json_string(&body, "/json/data/name").unwrap_or_else(|| format!("t3_{}", id));

        let mut receipt = PublishReceipt::new(NAME, &id);
        if let Some(post_url) = json_string(&body, "/json/data/url") {
            receipt = receipt.with_url(post_url);
        }

        if content.video_file().is_some() || content.image_file().is_some() {
            receipt = receipt.with_note("media not uploaded, self posts carry text only");
        }

        if self.approve {
            match self.approve_post(&fullname, credential).await {
                Ok(()) => receipt = receipt.with_note("post approved"),
                Err(e) => {
                    warn!("reddit approval of {} failed: {}", fullname, e);
                    receipt = receipt.with_note(format!("approval failed: {}", e));
                }
            }
        }

        Ok(receipt)
    }
}
