//! YouTube handler
//!
//! Videos go through the resumable upload protocol: a metadata request opens
//! an upload session, and the media bytes are then sent to the session URL.
//! The session URL is kept across retries, so a failed byte transfer never
//! opens a second session or duplicates the video.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde_json::json;
use tracing::{debug, warn};

use super::http::{mime_for, read_media, require_json_string, send, RequestPhase};
use super::registry::HandlerContext;
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

const NAME: &str = "youtube";
const DEFAULT_TITLE: &str = "Untitled Video";
/// "People & Blogs"
const DEFAULT_CATEGORY: &str = "22";

pub struct YouTubeHandler {
    endpoint: String,
    upload_endpoint: String,
    privacy_status: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl YouTubeHandler {
    pub fn new(ctx: &HandlerContext) -> Self {
        let upload_endpoint = match ctx.setting("upload_endpoint") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => ctx.endpoint.replace("/youtube/v3", "/upload/youtube/v3"),
        };

        Self {
            endpoint: ctx.endpoint.clone(),
            upload_endpoint,
            privacy_status: ctx.setting_or("privacy_status", "public").to_string(),
            http: ctx.http.clone(),
            retry: ctx.retry,
        }
    }

    fn video_metadata(&self, content: &ValidatedContent) -> serde_json::Value {
        let mut snippet = json!({
            "title": content.title().unwrap_or(DEFAULT_TITLE),
            "description": content.description(),
            "tags": content.tags(),
            "categoryId": DEFAULT_CATEGORY,
        });
        if let Some(language) = content.language_code() {
            snippet["defaultLanguage"] = json!(language);
            snippet["defaultAudioLanguage"] = json!(language);
        }

        json!({
            "snippet": snippet,
            "status": {
                "privacyStatus": self.privacy_status,
                "selfDeclaredMadeForKids": false,
            },
        })
    }

    /// Open a resumable upload session and return its URL
    async fn start_session(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
        mime: &str,
        length: usize,
    ) -> Result<String, PublishError> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.upload_endpoint
        );
        let metadata = self.video_metadata(content);

        let response = with_retry(&self.retry, NAME, "start upload session", || {
            send(
                NAME,
                RequestPhase::Metadata,
                "start upload session",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .header("X-Upload-Content-Type", mime)
                    .header("X-Upload-Content-Length", length.to_string())
                    .json(&metadata),
            )
        })
        .await?;

        response
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PublishError::PermanentPublish(
                    "youtube did not return an upload session URL".to_string(),
                )
            })
    }

    async fn set_thumbnail(
        &self,
        video_id: &str,
        image: &std::path::Path,
        credential: &Credential,
    ) -> Result<(), PublishError> {
        let bytes = read_media(image).await?;
        let mime = mime_for(image);
        let url = format!("{}/thumbnails/set?videoId={}", self.upload_endpoint, video_id);

        with_retry(&self.retry, NAME, "set thumbnail", || {
            send(
                NAME,
                RequestPhase::Upload,
                "set thumbnail",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .header(CONTENT_TYPE, &mime)
                    .body(bytes.clone()),
            )
        })
        .await?;
        Ok(())
    }

    async fn insert_caption(
        &self,
        video_id: &str,
        language: &str,
        path: &std::path::Path,
        credential: &Credential,
    ) -> Result<(), PublishError> {
        let data = read_media(path).await?;
        let snippet = json!({
            "snippet": {
                "videoId": video_id,
                "language": language,
                "name": "",
                "isDraft": false,
            }
        });
        let boundary = format!("caption-{}", uuid::Uuid::new_v4().simple());
        let body = related_body(&boundary, &snippet, &mime_for(path), &data);
        let url = format!(
            "{}/captions?uploadType=multipart&part=snippet",
            self.upload_endpoint
        );

        with_retry(&self.retry, NAME, "insert caption", || {
            send(
                NAME,
                RequestPhase::Upload,
                "insert caption",
                self.http
                    .post(&url)
                    .bearer_auth(&credential.access_token)
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/related; boundary={}", boundary),
                    )
                    .body(body.clone()),
            )
        })
        .await?;
        Ok(())
    }
}

/// Build a `multipart/related` body with a JSON metadata part and a media part
fn related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    mime: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
        b = boundary,
        m = metadata,
        t = mime
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl PlatformHandler for YouTubeHandler {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::YOUTUBE
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        let video = content.video_file().ok_or_else(|| {
            PublishError::PermanentPublish("youtube requires a video file".to_string())
        })?;
        let bytes = read_media(video).await?;
        let mime = mime_for(video);

        debug!("Opening youtube upload session at {}", self.endpoint);
        let session_url = self
            .start_session(content, credential, &mime, bytes.len())
            .await?;

        let response = with_retry(&self.retry, NAME, "upload video", || {
            send(
                NAME,
                RequestPhase::Upload,
                "upload video",
                self.http
                    .put(&session_url)
                    .bearer_auth(&credential.access_token)
                    .header(CONTENT_TYPE, &mime)
                    .body(bytes.clone()),
            )
        })
        .await?;

        let video_id = require_json_string(&response.json(NAME)?, "/id", NAME)?;
        let mut receipt = PublishReceipt::new(NAME, &video_id)
            .with_url(format!("https://www.youtube.com/watch?v={}", video_id));

        if let Some(image) = content.image_file() {
            match self.set_thumbnail(&video_id, image, credential).await {
                Ok(()) => receipt = receipt.with_note("thumbnail set"),
                Err(e) => {
                    warn!("youtube thumbnail upload failed for {}: {}", video_id, e);
                    receipt = receipt.with_note(format!("thumbnail upload failed: {}", e));
                }
            }
        }

        Ok(receipt)
    }

    async fn attach_subtitles(
        &self,
        receipt: &PublishReceipt,
        subtitle_files: &BTreeMap<String, PathBuf>,
        credential: &Credential,
    ) -> Result<Vec<String>, PublishError> {
        let mut attached = Vec::new();
        for (language, path) in subtitle_files {
            self.insert_caption(&receipt.id, language, path, credential)
                .await?;
            attached.push(language.clone());
        }
        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        fast_retry, media_file, test_credential, ScriptedResponse, TestServer,
    };
    use crate::types::Content;
    use crate::validation::validate;
    use tempfile::TempDir;

    fn handler(api: &TestServer) -> YouTubeHandler {
        let ctx = HandlerContext::new(
            format!("{}/youtube/v3", api.base_url()),
            BTreeMap::new(),
            reqwest::Client::new(),
            fast_retry(),
        );
        YouTubeHandler::new(&ctx)
    }

    fn video_content(dir: &TempDir, with_cover: bool) -> ValidatedContent {
        let video = media_file(dir.path(), "video.mp4", b"fake-video-bytes");
        let mut builder = Content::builder("A walk through the park")
            .video_file(video)
            .language_code("en")
            .tags(vec!["park".to_string(), "walk".to_string()]);
        if with_cover {
            builder = builder.image_file(media_file(dir.path(), "cover.jpg", b"jpeg"));
        }
        validate(&builder.build().unwrap(), &PlatformCapabilities::YOUTUBE).unwrap()
    }

    #[test]
    fn test_upload_endpoint_derived_from_api_endpoint() {
        let ctx = HandlerContext::new(
            "https://www.googleapis.com/youtube/v3",
            BTreeMap::new(),
            reqwest::Client::new(),
            RetryPolicy::none(),
        );
        let handler = YouTubeHandler::new(&ctx);
        assert_eq!(
            handler.upload_endpoint,
            "https://www.googleapis.com/upload/youtube/v3"
        );
    }

    #[tokio::test]
    async fn test_resumable_upload_publishes_video() {
        let dir = TempDir::new().unwrap();
        let upload = TestServer::start(vec![ScriptedResponse::json(200, r#"{"id":"vid123"}"#)]).await;
        let api = TestServer::start(vec![
            ScriptedResponse::empty(200).with_header("Location", &upload.url("/session/1")),
            ScriptedResponse::json(200, "{}"),
        ])
        .await;

        let receipt = handler(&api)
            .publish(&video_content(&dir, true), &test_credential(NAME))
            .await
            .unwrap();

        assert_eq!(receipt.id, "vid123");
        assert_eq!(
            receipt.url.as_deref(),
            Some("https://www.youtube.com/watch?v=vid123")
        );
        assert_eq!(receipt.notes, vec!["thumbnail set"]);

        let api_requests = api.requests();
        let init = &api_requests[0];
        assert!(init.path().starts_with("/upload/youtube/v3/videos?uploadType=resumable"));
        assert_eq!(init.header("authorization"), Some("Bearer youtube-access"));
        let metadata: serde_json::Value = serde_json::from_slice(&init.body).unwrap();
        assert_eq!(metadata["snippet"]["title"], "Untitled Video");
        assert_eq!(metadata["snippet"]["defaultAudioLanguage"], "en");
        assert_eq!(metadata["snippet"]["tags"][1], "walk");
        assert_eq!(metadata["status"]["selfDeclaredMadeForKids"], false);
        assert!(api_requests[1].path().contains("/thumbnails/set?videoId=vid123"));

        let uploads = upload.requests();
        assert_eq!(uploads[0].method(), "PUT");
        assert_eq!(uploads[0].body_text(), "fake-video-bytes");
    }

    #[tokio::test]
    async fn test_upload_retry_reuses_session() {
        let dir = TempDir::new().unwrap();
        let upload = TestServer::start(vec![
            ScriptedResponse::json(503, r#"{"error":"backend"}"#),
            ScriptedResponse::json(200, r#"{"id":"vid456"}"#),
        ])
        .await;
        let api = TestServer::start(vec![
            ScriptedResponse::empty(200).with_header("Location", &upload.url("/session/2"))
        ])
        .await;

        let receipt = handler(&api)
            .publish(&video_content(&dir, false), &test_credential(NAME))
            .await
            .unwrap();

        assert_eq!(receipt.id, "vid456");
        assert_eq!(api.requests().len(), 1);
        assert_eq!(upload.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_thumbnail_failure_is_noted() {
        let dir = TempDir::new().unwrap();
        let upload = TestServer::start(vec![ScriptedResponse::json(200, r#"{"id":"vid789"}"#)]).await;
        let api = TestServer::start(vec![
            ScriptedResponse::empty(200).with_header("Location", &upload.url("/session/3")),
            ScriptedResponse::json(400, r#"{"error":"bad image"}"#),
        ])
        .await;

        let receipt = handler(&api)
            .publish(&video_content(&dir, true), &test_credential(NAME))
            .await
            .unwrap();

        assert_eq!(receipt.id, "vid789");
        assert!(receipt.notes[0].starts_with("thumbnail upload failed"));
    }

    #[tokio::test]
    async fn test_rejected_credential_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let api = TestServer::start(vec![ScriptedResponse::json(401, r#"{"error":"invalid"}"#)]).await;

        let result = handler(&api)
            .publish(&video_content(&dir, false), &test_credential(NAME))
            .await;
        assert!(matches!(
            result,
            Err(PublishError::Auth {
                status: Some(401),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_attach_subtitles_uploads_one_caption_per_language() {
        let dir = TempDir::new().unwrap();
        let api = TestServer::start(vec![
            ScriptedResponse::json(200, "{}"),
            ScriptedResponse::json(200, "{}"),
        ])
        .await;
        let mut files = BTreeMap::new();
        files.insert(
            "en".to_string(),
            media_file(dir.path(), "talk.en.srt", b"1\n00:00:00,000 --> 00:00:01,000\nHi\n"),
        );
        files.insert(
            "pt-BR".to_string(),
            media_file(dir.path(), "talk.pt-BR.vtt", b"WEBVTT\n"),
        );

        let receipt = PublishReceipt::new(NAME, "vid123");
        let attached = handler(&api)
            .attach_subtitles(&receipt, &files, &test_credential(NAME))
            .await
            .unwrap();

        assert_eq!(attached, vec!["en", "pt-BR"]);
        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0]
            .header("content-type")
            .unwrap()
            .starts_with("multipart/related; boundary="));
        assert!(requests[0].body_text().contains(r#""videoId":"vid123""#));
        assert!(requests[1].body_text().contains("WEBVTT"));
    }
}
