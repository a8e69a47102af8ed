//! End-to-end publishing scenarios against mock handlers and a mock OAuth client

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libpublisher::credentials::{MemoryCredentialStore, MockOAuthClient};
use libpublisher::platforms::mock::MockHandler;
use libpublisher::platforms::retry::RetryPolicy;
use libpublisher::{
    Content, CredentialManager, HandlerRegistry, PlatformCapabilities, PlatformCredentials,
    PlatformKind, PlatformTarget, Publisher,
};
use tempfile::TempDir;

fn publisher(registry: HandlerRegistry, oauth: MockOAuthClient) -> Publisher {
    let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()), Arc::new(oauth));
    Publisher::new(registry, Arc::new(manager)).with_retry_policy(RetryPolicy::none())
}

fn credentials(kind: PlatformKind) -> PlatformCredentials {
    let mut oauth = kind.default_oauth_config();
    oauth.client_id = "client".to_string();
    PlatformCredentials::new("default", oauth)
}

fn target(name: &str, kind: PlatformKind) -> PlatformTarget {
    PlatformTarget {
        name: name.to_string(),
        endpoint: None,
        credentials: credentials(kind),
    }
}

fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_reddit_text_post_has_four_successful_steps() {
    let mock = MockHandler::success("reddit", PlatformCapabilities::REDDIT);
    let mut registry = HandlerRegistry::empty();
    registry.register("reddit", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let content = Content::builder("Hello Reddit").build().unwrap();
    let result = publisher
        .publish_to("reddit", None, &credentials(PlatformKind::Reddit), &content)
        .await;

    assert!(result.success(), "{}", result.message());
    assert_eq!(
        result.step_names(),
        vec!["select_handler", "validate", "authenticate", "publish"]
    );
    assert!(result.trace().iter().all(|step| step.ok));
    assert_eq!(mock.published_descriptions(), vec!["Hello Reddit"]);
}

#[tokio::test]
async fn test_unknown_platform_fails_without_network_or_auth() {
    let oauth = MockOAuthClient::new();
    let publisher = publisher(HandlerRegistry::builtin(), oauth.clone());

    let content = Content::builder("Hello").build().unwrap();
    let result = publisher
        .publish_to(
            "unknown-platform",
            None,
            &credentials(PlatformKind::Reddit),
            &content,
        )
        .await;

    assert!(!result.success());
    assert!(result.message().starts_with("unknown_platform:"));
    assert_eq!(result.step_names(), vec!["select_handler"]);
    assert_eq!(oauth.authorize_calls(), 0);
    assert_eq!(oauth.refresh_calls(), 0);
}

#[tokio::test]
async fn test_youtube_subtitles_are_attached_after_publish() {
    let dir = TempDir::new().unwrap();
    let video = write_file(&dir, "video.mp4", b"video");
    let english = write_file(&dir, "talk.en.srt", b"1\n00:00:00,000 --> 00:00:01,000\nHi\n");
    let portuguese = write_file(&dir, "talk.pt-BR.srt", b"1\n00:00:00,000 --> 00:00:01,000\nOi\n");

    let mock = MockHandler::success("youtube", PlatformCapabilities::YOUTUBE);
    let mut registry = HandlerRegistry::empty();
    registry.register("youtube", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let content = Content::builder("Conference talk")
        .video_file(video)
        .subtitle("en", english)
        .subtitle("pt-BR", portuguese)
        .build()
        .unwrap();
    let result = publisher
        .publish_to("youtube", None, &credentials(PlatformKind::YouTube), &content)
        .await;

    assert!(result.success(), "{}", result.message());
    assert_eq!(
        result.step_names(),
        vec![
            "select_handler",
            "validate",
            "authenticate",
            "publish",
            "attach_subtitles"
        ]
    );
    let step = result.step("attach_subtitles").unwrap();
    assert!(step.ok);
    assert!(step.detail.contains("en"));
    assert!(step.detail.contains("pt-BR"));
    assert_eq!(mock.subtitle_call_count(), 1);
}

#[tokio::test]
async fn test_subtitles_for_unsupporting_platform_are_skipped() {
    let dir = TempDir::new().unwrap();
    let subtitles = write_file(&dir, "clip.en.vtt", b"WEBVTT\n");

    let mock = MockHandler::success("facebook", PlatformCapabilities::FACEBOOK);
    let mut registry = HandlerRegistry::empty();
    registry.register("facebook", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let content = Content::builder("Clip")
        .subtitle("en", subtitles)
        .build()
        .unwrap();
    let result = publisher
        .publish_to("facebook", None, &credentials(PlatformKind::Facebook), &content)
        .await;

    assert!(result.success(), "{}", result.message());
    let step = result.step("attach_subtitles").unwrap();
    assert!(step.ok);
    assert!(step.detail.starts_with("skipped"));
    assert_eq!(mock.subtitle_call_count(), 0);
}

#[tokio::test]
async fn test_subtitle_failure_fails_the_result() {
    let dir = TempDir::new().unwrap();
    let video = write_file(&dir, "video.mp4", b"video");
    let english = write_file(&dir, "talk.en.srt", b"1\n");

    let mock = MockHandler::subtitles_failure(
        "youtube",
        PlatformCapabilities::YOUTUBE,
        libpublisher::PublishError::MediaRejected("caption track rejected".to_string()),
    );
    let mut registry = HandlerRegistry::empty();
    registry.register("youtube", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let content = Content::builder("Talk")
        .video_file(video)
        .subtitle("en", english)
        .build()
        .unwrap();
    let result = publisher
        .publish_to("youtube", None, &credentials(PlatformKind::YouTube), &content)
        .await;

    assert!(!result.success());
    assert!(result.message().starts_with("media_rejected:"));
    let last = result.trace().last().unwrap();
    assert_eq!(last.name, "attach_subtitles");
    assert!(!last.ok);
    // The publish itself went through before the subtitle step failed
    assert!(result.step("publish").unwrap().ok);
}

#[tokio::test]
async fn test_tag_length_limit_is_inclusive() {
    let dir = TempDir::new().unwrap();
    let video = write_file(&dir, "video.mp4", b"video");

    let mock = MockHandler::success("youtube", PlatformCapabilities::YOUTUBE);
    let mut registry = HandlerRegistry::empty();
    registry.register("youtube", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let at_limit = Content::builder("Tagged")
        .video_file(&video)
        .tags(vec!["a".repeat(100)])
        .build()
        .unwrap();
    let result = publisher
        .publish_to("youtube", None, &credentials(PlatformKind::YouTube), &at_limit)
        .await;
    assert!(result.success(), "{}", result.message());

    let over_limit = Content::builder("Tagged")
        .video_file(&video)
        .tags(vec!["a".repeat(101)])
        .build()
        .unwrap();
    let result = publisher
        .publish_to("youtube", None, &credentials(PlatformKind::YouTube), &over_limit)
        .await;
    assert!(!result.success());
    assert!(result.message().starts_with("tag_too_long:"));
    assert_eq!(result.step_names(), vec!["select_handler", "validate"]);
    assert_eq!(mock.publish_call_count(), 1);
}

#[tokio::test]
async fn test_long_description_is_truncated_to_a_prefix() {
    let mock = MockHandler::success("x", PlatformCapabilities::X);
    let mut registry = HandlerRegistry::empty();
    registry.register("x", mock.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let description = "word ".repeat(100);
    let content = Content::builder(description.clone()).build().unwrap();
    let result = publisher
        .publish_to("x", None, &credentials(PlatformKind::X), &content)
        .await;

    assert!(result.success(), "{}", result.message());
    assert!(result.step("adapt").unwrap().detail.contains("truncated"));

    let published = mock.published_descriptions();
    assert_eq!(published.len(), 1);
    assert!(published[0].chars().count() <= 280);
    assert!(description.starts_with(&published[0]));
    // The caller's content is left untouched
    assert_eq!(content.description(), description);
}

#[tokio::test]
async fn test_many_platforms_run_concurrently_and_keep_order() {
    let delay = Duration::from_millis(200);
    let slow_reddit = MockHandler::with_delay("reddit", PlatformCapabilities::REDDIT, delay);
    let slow_facebook = MockHandler::with_delay("facebook", PlatformCapabilities::FACEBOOK, delay);
    let failing_x = MockHandler::publish_failure(
        "x",
        PlatformCapabilities::X,
        libpublisher::PublishError::PermanentPublish("duplicate content".to_string()),
    );

    let mut registry = HandlerRegistry::empty();
    registry.register("reddit", slow_reddit.factory());
    registry.register("facebook", slow_facebook.factory());
    registry.register("x", failing_x.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let targets = vec![
        target("facebook", PlatformKind::Facebook),
        target("unknown-platform", PlatformKind::Reddit),
        target("x", PlatformKind::X),
        target("reddit", PlatformKind::Reddit),
    ];
    let content = Content::builder("Everywhere at once").build().unwrap();

    let start = Instant::now();
    let results = publisher.publish_to_many(&targets, &content).await;
    let elapsed = start.elapsed();

    let platforms: Vec<&str> = results.iter().map(|r| r.platform()).collect();
    assert_eq!(platforms, vec!["facebook", "unknown-platform", "x", "reddit"]);
    let successes: Vec<bool> = results.iter().map(|r| r.success()).collect();
    assert_eq!(successes, vec![true, false, false, true]);

    // Two 200ms publishes overlap instead of running back to back
    assert!(elapsed < delay * 2, "took {:?}", elapsed);
}

#[tokio::test]
async fn test_refreshed_token_reaches_the_handler() {
    let mock = MockHandler::success("reddit", PlatformCapabilities::REDDIT);
    let mut registry = HandlerRegistry::empty();
    registry.register("reddit", mock.factory());
    let oauth = MockOAuthClient::new();
    let publisher = publisher(registry, oauth.clone());

    let content = Content::builder("Hello").build().unwrap();
    let creds = credentials(PlatformKind::Reddit);
    publisher.publish_to("reddit", None, &creds, &content).await;
    publisher.publish_to("reddit", None, &creds, &content).await;

    // One authorization, then the stored token is reused
    assert_eq!(oauth.authorize_calls(), 1);
    assert_eq!(
        mock.access_tokens_seen(),
        vec!["mock-authorize-access-1", "mock-authorize-access-1"]
    );
}

#[tokio::test]
async fn test_panicking_handler_fails_only_its_own_target() {
    let reddit = MockHandler::success("reddit", PlatformCapabilities::REDDIT);
    let broken_x = MockHandler::panicking("x", PlatformCapabilities::X);
    let facebook = MockHandler::success("facebook", PlatformCapabilities::FACEBOOK);

    let mut registry = HandlerRegistry::empty();
    registry.register("reddit", reddit.factory());
    registry.register("x", broken_x.factory());
    registry.register("facebook", facebook.factory());
    let publisher = publisher(registry, MockOAuthClient::new());

    let targets = vec![
        target("reddit", PlatformKind::Reddit),
        target("x", PlatformKind::X),
        target("facebook", PlatformKind::Facebook),
    ];
    let content = Content::builder("One bad handler").build().unwrap();
    let results = publisher.publish_to_many(&targets, &content).await;

    let platforms: Vec<&str> = results.iter().map(|r| r.platform()).collect();
    assert_eq!(platforms, vec!["reddit", "x", "facebook"]);
    assert!(results[0].success(), "{}", results[0].message());
    assert!(results[2].success(), "{}", results[2].message());

    let failed = &results[1];
    assert!(!failed.success());
    assert!(failed.message().starts_with("permanent_publish:"));
    assert_eq!(failed.step_names(), vec!["aborted"]);
    assert_eq!(broken_x.publish_call_count(), 1);
    assert_eq!(reddit.published_descriptions(), vec!["One bad handler"]);
}
