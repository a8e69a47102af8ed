//! Publishing orchestration
//!
//! [`Publisher::publish_to`] drives one content item through handler
//! selection, validation, adaptation, authentication, publishing and subtitle
//! attachment for a single platform. Every outcome, including an unknown
//! platform, is returned as a [`PublishResult`]; nothing is thrown across this
//! boundary.
//!
//! [`Publisher::publish_to_many`] runs one such pipeline per platform, each
//! in its own task. Platforms never share state beyond the credential manager,
//! so one platform's failure, even a panicking handler, does not affect
//! another's result.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::credentials::oauth::log_authorization_url;
use crate::credentials::{
    AuthorizationPrompt, CredentialManager, FileCredentialStore, HttpOAuthClient, OAuthConfig,
};
use crate::error::{PublishError, Result};
use crate::platforms::retry::RetryPolicy;
use crate::platforms::{HandlerContext, HandlerRegistry, PlatformKind};
use crate::result::{
    PublishResult, ResultRecorder, ABORTED, ADAPT, ATTACH_SUBTITLES, AUTHENTICATE, PUBLISH,
    SELECT_HANDLER, VALIDATE,
};
use crate::types::Content;
use crate::validation::{adapt, validate};

/// Account used when none is configured
pub const DEFAULT_ACCOUNT: &str = "default";

/// How to authenticate against one platform, plus its handler settings
#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    pub account_id: String,
    pub oauth: OAuthConfig,
    /// Handler settings such as `page_id` or `subreddit`
    pub settings: BTreeMap<String, String>,
}

impl PlatformCredentials {
    pub fn new(account_id: impl Into<String>, oauth: OAuthConfig) -> Self {
        Self {
            account_id: account_id.into(),
            oauth,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

/// One requested platform of a multi-platform publish
#[derive(Debug, Clone)]
pub struct PlatformTarget {
    pub name: String,
    /// API endpoint override; the platform default is used when `None`
    pub endpoint: Option<String>,
    pub credentials: PlatformCredentials,
}

#[derive(Clone)]
pub struct Publisher {
    registry: HandlerRegistry,
    credentials: Arc<CredentialManager>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(registry: HandlerRegistry, credentials: Arc<CredentialManager>) -> Self {
        Self {
            registry,
            credentials,
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Publisher with the built-in handlers, file-backed credentials and
    /// the configured retry policy
    ///
    /// Authorization URLs are logged; see [`Publisher::from_config_with_prompt`].
    pub fn from_config(config: &Config, http: reqwest::Client) -> Result<Self> {
        Self::from_config_with_prompt(config, http, Arc::new(log_authorization_url))
    }

    /// Like [`Publisher::from_config`], showing authorization URLs through `prompt`
    pub fn from_config_with_prompt(
        config: &Config,
        http: reqwest::Client,
        prompt: AuthorizationPrompt,
    ) -> Result<Self> {
        let store = FileCredentialStore::new(config.credentials_root());
        let oauth = HttpOAuthClient::new(http.clone()).with_authorization_prompt(prompt);
        let manager = CredentialManager::new(Arc::new(store), Arc::new(oauth))
            .with_safety_margin(config.refresh_margin()?);

        Ok(Self::new(HandlerRegistry::builtin(), Arc::new(manager))
            .with_http_client(http)
            .with_retry_policy(config.retry_policy()?))
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn credential_manager(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Publish `content` to one platform
    pub async fn publish_to(
        &self,
        platform_name: &str,
        endpoint: Option<&str>,
        credentials: &PlatformCredentials,
        content: &Content,
    ) -> PublishResult {
        let mut recorder = ResultRecorder::new(platform_name.trim());

        let Some(canonical) = self.registry.resolve(platform_name) else {
            return recorder.fail(
                SELECT_HANDLER,
                PublishError::UnknownPlatform(platform_name.trim().to_string()),
            );
        };
        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| {
                PlatformKind::from_name(&canonical).map(|kind| kind.default_endpoint().to_string())
            })
            .unwrap_or_default();
        let context = HandlerContext::new(
            endpoint,
            credentials.settings.clone(),
            self.http.clone(),
            self.retry,
        );
        let Some(handler) = self.registry.create(&canonical, &context) else {
            return recorder.fail(
                SELECT_HANDLER,
                PublishError::UnknownPlatform(platform_name.trim().to_string()),
            );
        };
        recorder.set_platform(handler.name());
        recorder.ok(
            SELECT_HANDLER,
            format!("{} handler at {}", handler.name(), context.endpoint),
        );

        let capabilities = handler.capabilities();
        let validated = match validate(content, &capabilities) {
            Ok(validated) => validated,
            Err(e) => return recorder.fail(VALIDATE, e),
        };
        recorder.ok(
            VALIDATE,
            format!(
                "description {} characters, {} tag(s)",
                validated.description().chars().count(),
                validated.tags().len()
            ),
        );

        let (adapted, notes) = adapt(&validated, &capabilities);
        if !notes.is_empty() {
            recorder.ok(ADAPT, notes.join("; "));
        }

        let credential = match self
            .credentials
            .ensure_valid(handler.name(), &credentials.account_id, &credentials.oauth)
            .await
        {
            Ok(credential) => credential,
            Err(e) => return recorder.fail(AUTHENTICATE, e),
        };
        recorder.ok(
            AUTHENTICATE,
            format!(
                "account {} valid until {}",
                credential.account_id,
                credential.expires_at.to_rfc3339()
            ),
        );

        let receipt = match handler.publish(&adapted, &credential).await {
            Ok(receipt) => receipt,
            Err(e) => return recorder.fail(PUBLISH, e),
        };
        let mut detail = format!("published {}", receipt.id);
        if !receipt.notes.is_empty() {
            detail.push_str(&format!(" ({})", receipt.notes.join("; ")));
        }
        recorder.ok(PUBLISH, detail);

        let subtitle_files = adapted.subtitle_files();
        match (capabilities.supports_subtitles, subtitle_files.is_empty()) {
            (true, false) => {
                match handler
                    .attach_subtitles(&receipt, subtitle_files, &credential)
                    .await
                {
                    Ok(languages) => {
                        recorder.ok(ATTACH_SUBTITLES, format!("attached {}", languages.join(", ")))
                    }
                    Err(e) => return recorder.fail(ATTACH_SUBTITLES, e),
                }
            }
            (true, true) => recorder.ok(ATTACH_SUBTITLES, "skipped: no subtitle files supplied"),
            (false, false) => recorder.ok(
                ATTACH_SUBTITLES,
                format!(
                    "skipped: {} does not support subtitles ({} file(s) not attached)",
                    handler.name(),
                    subtitle_files.len()
                ),
            ),
            (false, true) => {}
        }

        recorder.succeed(receipt)
    }

    /// Publish `content` to every target concurrently, one result per target in request order
    ///
    /// Each target runs as its own task. A task that dies (a handler panic)
    /// yields a failed result for its target only.
    pub async fn publish_to_many(
        &self,
        targets: &[PlatformTarget],
        content: &Content,
    ) -> Vec<PublishResult> {
        info!("Publishing to {} platform(s)", targets.len());
        let content = Arc::new(content.clone());

        let mut tasks = JoinSet::new();
        let mut slots = HashMap::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let publisher = self.clone();
            let target = target.clone();
            let content = Arc::clone(&content);
            let span = info_span!("publish", platform = %target.name.trim());

            let handle = tasks.spawn(
                async move {
                    publisher
                        .publish_to(
                            &target.name,
                            target.endpoint.as_deref(),
                            &target.credentials,
                            &content,
                        )
                        .await
                }
                .instrument(span),
            );
            slots.insert(handle.id(), index);
        }

        let mut results: Vec<Option<PublishResult>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    if let Some(&index) = slots.get(&id) {
                        results[index] = Some(result);
                    }
                }
                Err(e) => {
                    if let Some(&index) = slots.get(&e.id()) {
                        warn!("Publish task for {} died: {}", targets[index].name, e);
                        results[index] = Some(task_failure(&targets[index], &e.to_string()));
                    }
                }
            }
        }

        results
            .into_iter()
            .zip(targets)
            .map(|(result, target)| {
                result.unwrap_or_else(|| task_failure(target, "publish task did not complete"))
            })
            .collect()
    }
}

/// Failed result for a target whose task ended without producing one
fn task_failure(target: &PlatformTarget, detail: &str) -> PublishResult {
    ResultRecorder::new(target.name.trim()).fail(
        ABORTED,
        PublishError::PermanentPublish(format!("publish task failed: {}", detail)),
    )
}
