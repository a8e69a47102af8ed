//! Configuration management for the content publisher
//!
//! The configuration file is optional: a missing file yields the defaults,
//! with no platform configured beyond the built-in OAuth endpoints. Secrets
//! may be kept out of the file and supplied through environment variables
//! named `CONTENT_PUBLISHER_<PLATFORM>_<FIELD>`.
//!
//! ```toml
//! [credentials]
//! path = "~/.config/content-publisher/oauth-tokens"
//! refresh_margin = "60s"
//!
//! [retry]
//! max_attempts = 3
//! base_delay = "1s"
//!
//! [platforms.reddit]
//! account = "moderator"
//! settings = { subreddit = "rust", approve = "true" }
//!
//! [platforms.reddit.oauth]
//! client_id = "abc"
//! username = "moderator"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::{GrantType, OAuthConfig};
use crate::error::{ConfigError, Result};
use crate::platforms::retry::RetryPolicy;
use crate::platforms::PlatformKind;
use crate::publisher::{PlatformCredentials, PlatformTarget, DEFAULT_ACCOUNT};

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV: &str = "CONTENT_PUBLISHER_CONFIG";
const ENV_PREFIX: &str = "CONTENT_PUBLISHER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub retry: RetryConfig,
    /// Per-platform sections keyed by platform name
    pub platforms: BTreeMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Directory holding one token file per platform account
    pub path: String,
    /// Minimum remaining token lifetime, in humantime format
    pub refresh_margin: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "~/.config/content-publisher/oauth-tokens".to_string(),
            refresh_margin: "60s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: String,
    pub max_delay: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: "1s".to_string(),
            max_delay: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// API endpoint override
    pub endpoint: Option<String>,
    pub account: Option<String>,
    pub settings: BTreeMap<String, String>,
    pub oauth: OAuthSection,
}

/// OAuth overrides; anything left out comes from the platform defaults
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub grant: Option<GrantType>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for OAuthSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSection")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("grant", &self.grant)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error; the defaults are returned.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No configuration at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    /// Parse and check a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        self.refresh_margin()?;
        self.retry_policy()?;
        for (name, platform) in &self.platforms {
            if let Some(endpoint) = &platform.endpoint {
                url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
                    field: format!("platforms.{}.endpoint", name),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Credential directory with `~` expanded
    pub fn credentials_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.credentials.path).to_string())
    }

    pub fn refresh_margin(&self) -> Result<Duration> {
        parse_duration("credentials.refresh_margin", &self.credentials.refresh_margin)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: parse_duration("retry.base_delay", &self.retry.base_delay)?,
            max_delay: parse_duration("retry.max_delay", &self.retry.max_delay)?,
        })
    }

    /// Section for a platform, looked up by canonical name first
    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        let requested = name.trim().to_lowercase();
        let canonical = PlatformKind::from_name(&requested).map(|kind| kind.as_str());
        canonical
            .and_then(|c| self.platforms.get(c))
            .or_else(|| self.platforms.get(&requested))
    }

    /// OAuth settings for a platform: defaults, then the file, then the environment
    pub fn oauth_config(&self, name: &str) -> OAuthConfig {
        let kind = PlatformKind::from_name(name);
        let mut oauth = match kind {
            Some(kind) => kind.default_oauth_config(),
            None => OAuthConfig::new("", ""),
        };

        if let Some(section) = self.platform(name).map(|p| &p.oauth) {
            merge(&mut oauth.client_id, section.client_id.clone());
            merge_opt(&mut oauth.client_secret, section.client_secret.clone());
            merge(&mut oauth.scopes, section.scopes.clone());
            merge(&mut oauth.grant, section.grant);
            merge(&mut oauth.authorize_url, section.authorize_url.clone());
            merge(&mut oauth.token_url, section.token_url.clone());
            merge(&mut oauth.redirect_uri, section.redirect_uri.clone());
            merge_opt(&mut oauth.username, section.username.clone());
            merge_opt(&mut oauth.password, section.password.clone());
        }

        let env_name = kind
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| name.trim().to_string());
        merge(&mut oauth.client_id, env_override(&env_name, "CLIENT_ID"));
        merge_opt(&mut oauth.client_secret, env_override(&env_name, "CLIENT_SECRET"));
        merge_opt(&mut oauth.username, env_override(&env_name, "USERNAME"));
        merge_opt(&mut oauth.password, env_override(&env_name, "PASSWORD"));

        oauth
    }

    /// Everything the publisher needs for one requested platform
    ///
    /// Unconfigured and unknown platforms still produce a target; whether a
    /// handler exists is decided by the publisher.
    pub fn target(&self, name: &str) -> PlatformTarget {
        let section = self.platform(name);
        let account_id = section
            .and_then(|p| p.account.clone())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());

        PlatformTarget {
            name: name.trim().to_string(),
            endpoint: section.and_then(|p| p.endpoint.clone()),
            credentials: PlatformCredentials {
                account_id,
                oauth: self.oauth_config(name),
                settings: section.map(|p| p.settings.clone()).unwrap_or_default(),
            },
        }
    }
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn merge_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn env_override(platform: &str, field: &str) -> Option<String> {
    let key = format!(
        "{}_{}_{}",
        ENV_PREFIX,
        platform.to_uppercase().replace('-', "_"),
        field
    );
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("content-publisher").join("config.toml"))
}
