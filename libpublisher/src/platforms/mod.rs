//! Platform handlers and their static capability descriptors
//!
//! Each supported platform has one [`PlatformHandler`] implementation that owns
//! the platform's upload protocol. Handlers are resolved by name through the
//! [`HandlerRegistry`], which is built once at startup from a closed set of
//! platforms.
//!
//! # Examples
//!
//! ```no_run
//! use libpublisher::platforms::{HandlerContext, HandlerRegistry};
//! use libpublisher::platforms::retry::RetryPolicy;
//!
//! let registry = HandlerRegistry::builtin();
//! let context = HandlerContext::new(
//!     "https://oauth.reddit.com",
//!     Default::default(),
//!     reqwest::Client::new(),
//!     RetryPolicy::default(),
//! );
//!
//! if let Some(handler) = registry.create("reddit", &context) {
//!     let caps = handler.capabilities();
//!     println!("{} supports subtitles: {}", handler.name(), caps.supports_subtitles);
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::oauth::{ClientAuth, GrantType, OAuthConfig, DEFAULT_REDIRECT_URI};
use crate::error::PublishError;
use crate::types::{Credential, Orientation, PublishReceipt};
use crate::validation::ValidatedContent;

pub mod facebook;
pub mod http;
pub mod reddit;
pub mod registry;
pub mod retry;
pub mod tiktok;
pub mod x;
pub mod youtube;

// Mock handler is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use registry::{HandlerContext, HandlerFactory, HandlerRegistry};

/// Static feature flags and limits for one platform
///
/// One instance exists per platform and never changes at runtime. Validation
/// and orchestration consult it; handlers never mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformCapabilities {
    pub supports_subtitles: bool,
    pub supports_tags: bool,
    /// Maximum description length in characters, `None` when unbounded
    pub max_description_length: Option<usize>,
    pub max_tag_length: usize,
    pub max_tags: Option<usize>,
    /// Limit on the combined length of all tags
    pub max_total_tag_length: Option<usize>,
    pub requires_video: bool,
    pub supports_text_only: bool,
    /// Orientation the platform favors for video, if any
    pub preferred_orientation: Option<Orientation>,
}

impl PlatformCapabilities {
    pub const YOUTUBE: PlatformCapabilities = PlatformCapabilities {
        supports_subtitles: true,
        supports_tags: true,
        max_description_length: Some(5000),
        max_tag_length: 100,
        max_tags: None,
        max_total_tag_length: Some(500),
        requires_video: true,
        supports_text_only: false,
        preferred_orientation: None,
    };

    pub const FACEBOOK: PlatformCapabilities = PlatformCapabilities {
        supports_subtitles: false,
        supports_tags: false,
        max_description_length: Some(63206),
        max_tag_length: 100,
        max_tags: None,
        max_total_tag_length: None,
        requires_video: false,
        supports_text_only: true,
        preferred_orientation: None,
    };

    pub const X: PlatformCapabilities = PlatformCapabilities {
        supports_subtitles: false,
        supports_tags: false,
        max_description_length: Some(280),
        max_tag_length: 100,
        max_tags: None,
        max_total_tag_length: None,
        requires_video: false,
        supports_text_only: true,
        preferred_orientation: None,
    };

    pub const REDDIT: PlatformCapabilities = PlatformCapabilities {
        supports_subtitles: false,
        supports_tags: false,
        max_description_length: Some(40000),
        max_tag_length: 100,
        max_tags: None,
        max_total_tag_length: None,
        requires_video: false,
        supports_text_only: true,
        preferred_orientation: None,
    };

    pub const TIKTOK: PlatformCapabilities = PlatformCapabilities {
        supports_subtitles: false,
        supports_tags: false,
        max_description_length: Some(2200),
        max_tag_length: 100,
        max_tags: None,
        max_total_tag_length: None,
        requires_video: true,
        supports_text_only: false,
        preferred_orientation: Some(Orientation::Portrait),
    };
}

/// The closed set of platforms with a built-in handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    YouTube,
    Facebook,
    X,
    Reddit,
    TikTok,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 5] = [
        PlatformKind::YouTube,
        PlatformKind::Facebook,
        PlatformKind::X,
        PlatformKind::Reddit,
        PlatformKind::TikTok,
    ];

    /// Resolve a user-supplied platform name, accepting aliases case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "youtube" => Some(PlatformKind::YouTube),
            "facebook" | "meta" => Some(PlatformKind::Facebook),
            "x" | "twitter" => Some(PlatformKind::X),
            "reddit" => Some(PlatformKind::Reddit),
            "tiktok" => Some(PlatformKind::TikTok),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::YouTube => "youtube",
            PlatformKind::Facebook => "facebook",
            PlatformKind::X => "x",
            PlatformKind::Reddit => "reddit",
            PlatformKind::TikTok => "tiktok",
        }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        match self {
            PlatformKind::YouTube => PlatformCapabilities::YOUTUBE,
            PlatformKind::Facebook => PlatformCapabilities::FACEBOOK,
            PlatformKind::X => PlatformCapabilities::X,
            PlatformKind::Reddit => PlatformCapabilities::REDDIT,
            PlatformKind::TikTok => PlatformCapabilities::TIKTOK,
        }
    }

    /// Default API base URL
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            PlatformKind::YouTube => "https://www.googleapis.com/youtube/v3",
            PlatformKind::Facebook => "https://graph.facebook.com/v18.0",
            PlatformKind::X => "https://api.twitter.com/2",
            PlatformKind::Reddit => "https://oauth.reddit.com",
            PlatformKind::TikTok => "https://open.tiktokapis.com/v2",
        }
    }

    /// OAuth settings for the platform, without client secrets
    pub fn default_oauth_config(&self) -> OAuthConfig {
        let (authorize_url, token_url, scopes, client_auth, scope_delimiter) = match self {
            PlatformKind::YouTube => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                vec![
                    "https://www.googleapis.com/auth/youtube.upload",
                    "https://www.googleapis.com/auth/youtube.force-ssl",
                ],
                ClientAuth::Form,
                ' ',
            ),
            PlatformKind::Facebook => (
                "https://www.facebook.com/v18.0/dialog/oauth",
                "https://graph.facebook.com/v18.0/oauth/access_token",
                vec!["pages_manage_posts", "pages_read_engagement", "publish_video"],
                ClientAuth::Form,
                ',',
            ),
            PlatformKind::X => (
                "https://twitter.com/i/oauth2/authorize",
                "https://api.twitter.com/2/oauth2/token",
                vec![
                    "tweet.read",
                    "tweet.write",
                    "users.read",
                    "media.write",
                    "offline.access",
                ],
                ClientAuth::Basic,
                ' ',
            ),
            PlatformKind::Reddit => (
                "https://www.reddit.com/api/v1/authorize",
                "https://www.reddit.com/api/v1/access_token",
                vec!["identity", "submit", "modposts"],
                ClientAuth::Basic,
                ' ',
            ),
            PlatformKind::TikTok => (
                "https://www.tiktok.com/v2/auth/authorize/",
                "https://open.tiktokapis.com/v2/oauth/token/",
                vec!["user.info.basic", "video.upload", "video.publish"],
                ClientAuth::FormClientKey,
                ',',
            ),
        };

        let grant = match self {
            // Reddit script apps authenticate with the account password
            PlatformKind::Reddit => GrantType::Password,
            _ => GrantType::AuthorizationCode,
        };

        let authorize_params = match self {
            PlatformKind::YouTube => vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
            PlatformKind::Reddit => vec![("duration".to_string(), "permanent".to_string())],
            _ => Vec::new(),
        };

        OAuthConfig {
            client_id: String::new(),
            client_secret: None,
            scopes: scopes.into_iter().map(String::from).collect(),
            grant,
            authorize_url: authorize_url.to_string(),
            token_url: token_url.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            username: None,
            password: None,
            client_auth,
            scope_delimiter,
            authorize_params,
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform-specific adapter that performs the publish protocol
///
/// Handlers receive already validated and adapted content together with a
/// credential that the caller guarantees is fresh. They own their retry
/// behavior: transient failures are retried per upload step, and an upload
/// that completed is never repeated when only the metadata step fails.
#[async_trait]
pub trait PlatformHandler: Send + Sync {
    /// Canonical lowercase platform name (e.g., "youtube", "x")
    fn name(&self) -> &str;

    /// Static capabilities of the platform
    fn capabilities(&self) -> PlatformCapabilities;

    /// Upload media (if any) and publish the content
    ///
    /// # Errors
    ///
    /// Returns a `PublishError` classified as auth, rate limit, media rejected,
    /// transient network or permanent failure.
    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError>;

    /// Attach subtitle files, keyed by language code, to a published item
    ///
    /// Returns the languages that were attached. Only called when the platform
    /// supports subtitles and at least one subtitle file was supplied.
    async fn attach_subtitles(
        &self,
        _receipt: &PublishReceipt,
        _subtitle_files: &BTreeMap<String, PathBuf>,
        _credential: &Credential,
    ) -> Result<Vec<String>, PublishError> {
        Err(PublishError::NotSupported(format!(
            "{} does not support subtitles",
            self.name()
        )))
    }
}
