//! Static handler registry
//!
//! The registry maps canonical platform names to handler factories. It is
//! built once, before publishing starts, from the closed set of built-in
//! platforms; tests may replace an entry with a mock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::retry::RetryPolicy;
use super::{facebook, reddit, tiktok, x, youtube, PlatformHandler, PlatformKind};

/// Builds a handler for one publish run
pub type HandlerFactory = Arc<dyn Fn(&HandlerContext) -> Box<dyn PlatformHandler> + Send + Sync>;

/// Wrap a handler constructor as a [`HandlerFactory`]
pub fn handler_factory<H, F>(build: F) -> HandlerFactory
where
    H: PlatformHandler + 'static,
    F: Fn(&HandlerContext) -> H + Send + Sync + 'static,
{
    Arc::new(move |ctx: &HandlerContext| Box::new(build(ctx)) as Box<dyn PlatformHandler>)
}

/// Per-run inputs a handler is built from
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// API base URL, without a trailing slash
    pub endpoint: String,
    /// Platform-specific settings (e.g. `page_id`, `subreddit`)
    pub settings: BTreeMap<String, String>,
    pub http: reqwest::Client,
    pub retry: RetryPolicy,
}

impl HandlerContext {
    pub fn new(
        endpoint: impl Into<String>,
        settings: BTreeMap<String, String>,
        http: reqwest::Client,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            settings,
            http,
            retry,
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn setting_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.setting(key).unwrap_or(default)
    }

    /// Boolean setting; "true", "yes" and "1" are true
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.setting(key) {
            Some(value) => matches!(value.to_lowercase().as_str(), "true" | "yes" | "1"),
            None => default,
        }
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// A registry with no handlers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with a handler for every built-in platform
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for kind in PlatformKind::ALL {
            let factory = match kind {
                PlatformKind::YouTube => handler_factory(youtube::YouTubeHandler::new),
                PlatformKind::Facebook => handler_factory(facebook::FacebookHandler::new),
                PlatformKind::X => handler_factory(x::XHandler::new),
                PlatformKind::Reddit => handler_factory(reddit::RedditHandler::new),
                PlatformKind::TikTok => handler_factory(tiktok::TikTokHandler::new),
            };
            registry.register(kind.as_str(), factory);
        }
        registry
    }

    /// Register (or replace) the factory for a platform name
    pub fn register(&mut self, name: &str, factory: HandlerFactory) {
        self.factories.insert(name.trim().to_lowercase(), factory);
    }

    /// Canonical registered name for a user-supplied name, resolving aliases
    pub fn resolve(&self, name: &str) -> Option<String> {
        let canonical = match PlatformKind::from_name(name) {
            Some(kind) => kind.as_str().to_string(),
            None => name.trim().to_lowercase(),
        };
        self.factories.contains_key(&canonical).then_some(canonical)
    }

    /// Build the handler for `name`, or `None` if no handler is registered
    pub fn create(&self, name: &str, context: &HandlerContext) -> Option<Box<dyn PlatformHandler>> {
        let canonical = self.resolve(name)?;
        self.factories.get(&canonical).map(|factory| factory(context))
    }

    /// Registered platform names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
