//! Publish outcome and its execution trace
//!
//! A [`PublishResult`] is assembled through a [`ResultRecorder`], which only
//! appends steps. The recorder is consumed when the outcome is decided, so a
//! returned result can no longer change.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::PublisherError;
use crate::types::PublishReceipt;

pub const SELECT_HANDLER: &str = "select_handler";
pub const VALIDATE: &str = "validate";
pub const ADAPT: &str = "adapt";
pub const AUTHENTICATE: &str = "authenticate";
pub const PUBLISH: &str = "publish";
pub const ATTACH_SUBTITLES: &str = "attach_subtitles";
/// The platform's task ended without a result
pub const ABORTED: &str = "aborted";

/// One attempted step of a publish operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Outcome of publishing one content item to one platform
#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    platform: String,
    success: bool,
    message: String,
    trace: Vec<TraceStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<PublishReceipt>,
}

impl PublishResult {
    /// Platform name as requested by the caller, or canonical once resolved
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Human-readable summary
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Steps in execution order
    pub fn trace(&self) -> &[TraceStep] {
        &self.trace
    }

    pub fn receipt(&self) -> Option<&PublishReceipt> {
        self.receipt.as_ref()
    }

    /// Names of the recorded steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.trace.iter().map(|s| s.name.as_str()).collect()
    }

    /// The step with the given name, if it was recorded
    pub fn step(&self, name: &str) -> Option<&TraceStep> {
        self.trace.iter().find(|s| s.name == name)
    }
}

/// Append-only builder for a [`PublishResult`]
#[derive(Debug)]
pub struct ResultRecorder {
    platform: String,
    trace: Vec<TraceStep>,
}

impl ResultRecorder {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            trace: Vec::new(),
        }
    }

    /// Switch to the canonical platform name once the handler is known
    pub fn set_platform(&mut self, platform: &str) {
        self.platform = platform.to_string();
    }

    pub fn ok(&mut self, step: &str, detail: impl Into<String>) {
        let detail = detail.into();
        info!(platform = %self.platform, step, "{}", detail);
        self.trace.push(TraceStep {
            name: step.to_string(),
            ok: true,
            detail,
        });
    }

    fn failed(&mut self, step: &str, detail: String) {
        warn!(platform = %self.platform, step, "{}", detail);
        self.trace.push(TraceStep {
            name: step.to_string(),
            ok: false,
            detail,
        });
    }

    /// Record `step` as failed with `error` and freeze the result
    pub fn fail(mut self, step: &str, error: impl Into<PublisherError>) -> PublishResult {
        let error = error.into();
        let message = format!("{}: {}", error.kind(), error.detail());
        self.failed(step, error.detail());
        PublishResult {
            platform: self.platform,
            success: false,
            message,
            trace: self.trace,
            receipt: None,
        }
    }

    /// Freeze a successful result
    pub fn succeed(self, receipt: PublishReceipt) -> PublishResult {
        let message = match &receipt.url {
            Some(url) => format!("Published to {}: {} ({})", self.platform, receipt.id, url),
            None => format!("Published to {}: {}", self.platform, receipt.id),
        };
        info!(platform = %self.platform, "{}", message);
        PublishResult {
            platform: self.platform,
            success: true,
            message,
            trace: self.trace,
            receipt: Some(receipt),
        }
    }
}
