//! Content publisher - one content item, many social platforms
//!
//! This library validates a piece of content against each platform's
//! capabilities, keeps OAuth credentials fresh, and drives the
//! platform-specific upload protocols, reporting every outcome as a
//! structured result with an execution trace.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod publisher;
pub mod result;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use credentials::CredentialManager;
pub use error::{PublishError, PublisherError, Result, ValidationError};
pub use platforms::{HandlerRegistry, PlatformCapabilities, PlatformHandler, PlatformKind};
pub use publisher::{PlatformCredentials, PlatformTarget, Publisher};
pub use result::{PublishResult, TraceStep};
pub use types::{Content, Credential, Orientation, PublishReceipt};
pub use validation::ValidatedContent;
