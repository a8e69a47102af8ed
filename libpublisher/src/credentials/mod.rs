//! OAuth credential storage and lifecycle
//!
//! - [`store`]: one file per (platform, account) with path-safe keys
//! - [`oauth`]: token endpoint client (authorization code + PKCE, client
//!   credentials, password) and a scripted mock
//! - [`callback`]: loopback listener for the authorization redirect
//! - [`manager`]: decides between reuse, refresh and re-authorization
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpublisher::credentials::{
//!     CredentialManager, FileCredentialStore, HttpOAuthClient, OAuthConfig,
//! };
//!
//! # async fn example() -> libpublisher::error::Result<()> {
//! let store = FileCredentialStore::new("/tmp/oauth-tokens".into());
//! let oauth = HttpOAuthClient::new(reqwest::Client::new());
//! let manager = CredentialManager::new(Arc::new(store), Arc::new(oauth));
//!
//! let config = OAuthConfig::new("client-id", "https://example.com/oauth/token");
//! let credential = manager.ensure_valid("x", "default", &config).await?;
//! println!("token valid until {}", credential.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod manager;
pub mod oauth;
pub mod store;

pub use manager::{CredentialManager, DEFAULT_SAFETY_MARGIN};
pub use oauth::{
    AuthorizationPrompt, ClientAuth, GrantType, HttpOAuthClient, MockOAuthClient, OAuthClient,
    OAuthConfig, TokenGrant,
};
pub use store::{
    validate_not_symlink, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
