//! Mock handler implementation for testing
//!
//! This module provides a configurable mock handler that can simulate
//! successes, failures, transient errors and delays. It's designed for use in
//! integration tests to verify orchestration logic without requiring actual
//! platform credentials or network access.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::registry::{HandlerContext, HandlerFactory};
use super::retry::{with_retry, RetryPolicy};
use super::{PlatformCapabilities, PlatformHandler};
use crate::error::PublishError;
use crate::types::{Credential, PublishReceipt};
use crate::validation::ValidatedContent;

/// Configuration for mock handler behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name the handler reports
    pub name: String,

    pub capabilities: PlatformCapabilities,

    /// Error returned by every publish attempt, if set
    pub publish_error: Option<PublishError>,

    /// Error returned by attach_subtitles, if set
    pub subtitles_error: Option<PublishError>,

    /// Number of publish attempts that fail with a transient error first
    pub transient_failures: usize,

    /// Panic inside publish, simulating a handler bug
    pub panic_on_publish: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of publish attempts, retries included
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Number of times attach_subtitles has been called
    pub subtitle_call_count: Arc<Mutex<usize>>,

    /// Descriptions that were published (for verification)
    pub published_descriptions: Arc<Mutex<Vec<String>>>,

    /// Access tokens the handler was called with
    pub access_tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(name: &str, capabilities: PlatformCapabilities) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            publish_error: None,
            subtitles_error: None,
            transient_failures: 0,
            panic_on_publish: false,
            delay: Duration::from_millis(0),
            publish_call_count: Arc::new(Mutex::new(0)),
            subtitle_call_count: Arc::new(Mutex::new(0)),
            published_descriptions: Arc::new(Mutex::new(Vec::new())),
            access_tokens_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock handler for testing
///
/// Clones share their call counters, so a test can keep one instance for
/// assertions and register [`MockHandler::factory`] with a registry.
#[derive(Debug, Clone)]
pub struct MockHandler {
    config: MockConfig,
    retry: RetryPolicy,
}

impl MockHandler {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            retry: RetryPolicy::none(),
        }
    }

    /// Create a mock handler that always succeeds
    pub fn success(name: &str, capabilities: PlatformCapabilities) -> Self {
        Self::new(MockConfig::new(name, capabilities))
    }

    /// Create a mock handler whose publish always fails with `error`
    pub fn publish_failure(
        name: &str,
        capabilities: PlatformCapabilities,
        error: PublishError,
    ) -> Self {
        Self::new(MockConfig {
            publish_error: Some(error),
            ..MockConfig::new(name, capabilities)
        })
    }

    /// Create a mock handler whose subtitle attachment fails with `error`
    pub fn subtitles_failure(
        name: &str,
        capabilities: PlatformCapabilities,
        error: PublishError,
    ) -> Self {
        Self::new(MockConfig {
            subtitles_error: Some(error),
            ..MockConfig::new(name, capabilities)
        })
    }

    /// Create a mock handler that fails transiently `failures` times before succeeding
    pub fn flaky(name: &str, capabilities: PlatformCapabilities, failures: usize) -> Self {
        Self::new(MockConfig {
            transient_failures: failures,
            ..MockConfig::new(name, capabilities)
        })
    }

    /// Create a mock handler whose publish panics
    pub fn panicking(name: &str, capabilities: PlatformCapabilities) -> Self {
        Self::new(MockConfig {
            panic_on_publish: true,
            ..MockConfig::new(name, capabilities)
        })
    }

    /// Create a mock handler with a delay
    pub fn with_delay(name: &str, capabilities: PlatformCapabilities, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(name, capabilities)
        })
    }

    /// Factory that builds clones of this handler, taking the run's retry policy
    pub fn factory(&self) -> HandlerFactory {
        let template = self.clone();
        Arc::new(move |ctx: &HandlerContext| {
            let mut handler = template.clone();
            handler.retry = ctx.retry;
            Box::new(handler) as Box<dyn PlatformHandler>
        })
    }

    /// Get the number of publish attempts
    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    /// Get the number of times attach_subtitles was called
    pub fn subtitle_call_count(&self) -> usize {
        *self.config.subtitle_call_count.lock().unwrap()
    }

    /// Get all descriptions that were published
    pub fn published_descriptions(&self) -> Vec<String> {
        self.config.published_descriptions.lock().unwrap().clone()
    }

    /// Get the access tokens publish was called with
    pub fn access_tokens_seen(&self) -> Vec<String> {
        self.config.access_tokens_seen.lock().unwrap().clone()
    }

    async fn publish_once(
        &self,
        content: &ValidatedContent,
    ) -> Result<PublishReceipt, PublishError> {
        let attempt = {
            let mut count = self.config.publish_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panic_on_publish {
            panic!("mock handler {} panicked", self.config.name);
        }

        if attempt <= self.config.transient_failures {
            return Err(PublishError::TransientNetwork(format!(
                "Mock transient failure {}",
                attempt
            )));
        }

        if let Some(error) = &self.config.publish_error {
            return Err(error.clone());
        }

        self.config
            .published_descriptions
            .lock()
            .unwrap()
            .push(content.description().to_string());

        let id = format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4());
        Ok(PublishReceipt::new(&self.config.name, id))
    }
}

#[async_trait]
impl PlatformHandler for MockHandler {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.config.capabilities
    }

    async fn publish(
        &self,
        content: &ValidatedContent,
        credential: &Credential,
    ) -> Result<PublishReceipt, PublishError> {
        self.config
            .access_tokens_seen
            .lock()
            .unwrap()
            .push(credential.access_token.clone());

        with_retry(&self.retry, &self.config.name, "publish", || {
            self.publish_once(content)
        })
        .await
    }

    async fn attach_subtitles(
        &self,
        _receipt: &PublishReceipt,
        subtitle_files: &BTreeMap<String, PathBuf>,
        _credential: &Credential,
    ) -> Result<Vec<String>, PublishError> {
        *self.config.subtitle_call_count.lock().unwrap() += 1;

        if !self.config.capabilities.supports_subtitles {
            return Err(PublishError::NotSupported(format!(
                "{} does not support subtitles",
                self.config.name
            )));
        }

        if let Some(error) = &self.config.subtitles_error {
            return Err(error.clone());
        }

        Ok(subtitle_files.keys().cloned().collect())
    }
}
