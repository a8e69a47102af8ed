//! Error types for the content publisher

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PublisherError>;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PublishError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PublisherError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PublisherError::InvalidInput(_) => 3,
            PublisherError::Validation(_) => 3,
            PublisherError::Platform(PublishError::Validation(_)) => 3,
            PublisherError::Platform(PublishError::Auth { .. }) => 2,
            PublisherError::Platform(_) => 1,
            PublisherError::Credential(_) => 1,
            PublisherError::Config(_) => 1,
        }
    }

    /// Short, stable name of the failure kind, used in result messages
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherError::Config(_) => "config",
            PublisherError::Credential(_) => "credential",
            PublisherError::Validation(e) => e.kind(),
            PublisherError::Platform(e) => e.kind(),
            PublisherError::InvalidInput(_) => "invalid_input",
        }
    }

    /// The failure without its category prefix
    pub fn detail(&self) -> String {
        match self {
            PublisherError::Config(e) => e.to_string(),
            PublisherError::Credential(e) => e.to_string(),
            PublisherError::Validation(e) => e.to_string(),
            PublisherError::Platform(e) => e.to_string(),
            PublisherError::InvalidInput(msg) => msg.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored credential is malformed: {0}")]
    Format(String),
}

/// Bad input, reported before any network call and never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing media: {0}")]
    MissingMedia(String),

    #[error("Tag '{tag}' is {length} characters long (max {max})")]
    TagTooLong {
        tag: String,
        length: usize,
        max: usize,
    },

    #[error("Too many tags: {count} (max {max})")]
    TooManyTags { count: usize, max: usize },

    #[error("Tags total {total} characters (max {max})")]
    TagsTooLongInTotal { total: usize, max: usize },

    #[error("Media file not found: {0}")]
    MediaNotFound(String),

    #[error("Unsafe storage key component '{component}': {reason}")]
    UnsafeStorageKey { component: String, reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::MissingMedia(_) => "missing_media",
            ValidationError::TagTooLong { .. } => "tag_too_long",
            ValidationError::TooManyTags { .. } => "too_many_tags",
            ValidationError::TagsTooLongInTotal { .. } => "tags_too_long_in_total",
            ValidationError::MediaNotFound(_) => "media_not_found",
            ValidationError::UnsafeStorageKey { .. } => "unsafe_storage_key",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

fn retry_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

/// Failure taxonomy shared by every platform handler
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication failed for {platform}{}: {detail}", status_suffix(.status))]
    Auth {
        platform: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Rate limit exceeded{}: {detail}", retry_suffix(.retry_after))]
    RateLimit {
        retry_after: Option<Duration>,
        detail: String,
    },

    #[error("Media rejected: {0}")]
    MediaRejected(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Publishing failed: {0}")]
    PermanentPublish(String),

    #[error("Unknown platform '{0}': no handler is registered for it")]
    UnknownPlatform(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl PublishError {
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Validation(e) => e.kind(),
            PublishError::Auth { .. } => "auth",
            PublishError::RateLimit { .. } => "rate_limit",
            PublishError::MediaRejected(_) => "media_rejected",
            PublishError::TransientNetwork(_) => "transient_network",
            PublishError::PermanentPublish(_) => "permanent_publish",
            PublishError::UnknownPlatform(_) => "unknown_platform",
            PublishError::NotSupported(_) => "not_supported",
        }
    }

    /// Only platform backpressure and transient network failures are retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PublishError::RateLimit { .. } | PublishError::TransientNetwork(_)
        )
    }

    /// Wrap a token endpoint failure as an authentication error for `platform`
    pub fn from_oauth(platform: &str, error: &OAuthError) -> Self {
        PublishError::Auth {
            platform: platform.to_string(),
            status: error.status(),
            detail: error.to_string(),
        }
    }
}

/// Outcome of a failed call to an OAuth token or authorization endpoint
#[derive(Error, Debug, Clone)]
pub enum OAuthError {
    /// The grant (refresh token or code) is malformed, expired beyond use or revoked
    #[error("Grant is invalid or revoked (status {status}): {detail}")]
    InvalidGrant { status: u16, detail: String },

    #[error("Token request rejected (status {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed token response: {0}")]
    Protocol(String),

    #[error("Authorization callback failed: {0}")]
    Callback(String),

    #[error("OAuth client is not configured: {0}")]
    NotConfigured(String),
}

impl OAuthError {
    pub fn status(&self) -> Option<u16> {
        match self {
            OAuthError::InvalidGrant { status, .. } | OAuthError::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}
