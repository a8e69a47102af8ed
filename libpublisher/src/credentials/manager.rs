//! Credential lifecycle: load, validate, refresh, re-authorize, persist

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::oauth::{OAuthClient, OAuthConfig};
use super::store::{storage_key, CredentialStore};
use crate::error::{CredentialError, OAuthError, PublishError, PublisherError, Result};
use crate::types::Credential;

/// Minimum remaining lifetime of a credential handed out by the manager
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Hands out credentials that are valid for at least the safety margin
///
/// The manager is an explicit instance shared by the orchestrator for the
/// duration of a run. Work on one (platform, account) key is serialized with
/// a per-key async lock, so two concurrent callers never refresh the same
/// token twice or overwrite each other's rotation.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    oauth: Arc<dyn OAuthClient>,
    safety_margin: Duration,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, oauth: Arc<dyn OAuthClient>) -> Self {
        Self {
            store,
            oauth,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Return a credential valid for at least the safety margin
    ///
    /// 1. No stored credential, or one lacking requested scopes: full authorization.
    /// 2. Stored and still valid: returned as is, nothing is refreshed.
    /// 3. Expired with a refresh token: one refresh; the rotated credential is persisted.
    /// 4. Refresh rejected as `invalid_grant`: full authorization instead of retrying.
    ///
    /// # Errors
    ///
    /// - `ValidationError::UnsafeStorageKey` for unsafe platform or account names
    /// - `PublishError::Auth` when refresh or authorization fails, carrying the
    ///   platform and upstream status; the stored credential is left in place
    /// - `CredentialError` when the store cannot be read or written
    pub async fn ensure_valid(
        &self,
        platform: &str,
        account_id: &str,
        config: &OAuthConfig,
    ) -> Result<Credential> {
        let key = storage_key(platform, account_id)?;
        let lock = self.lock_for(&key)?;
        let _guard = lock.lock().await;

        let stored = match self.store.load(platform, account_id) {
            Ok(credential) => Some(credential),
            Err(PublisherError::Credential(CredentialError::NotFound(_))) => None,
            Err(e) => return Err(e),
        };

        let Some(credential) = stored else {
            info!("No stored credential for {}, starting authorization", key);
            return self.authorize(platform, account_id, config).await;
        };

        if !credential.covers_scopes(&config.scopes) {
            info!(
                "Stored credential for {} does not cover requested scopes, re-authorizing",
                key
            );
            return self.authorize(platform, account_id, config).await;
        }

        if credential.is_valid_at(Utc::now(), self.safety_margin) {
            debug!("Using stored credential for {}", key);
            return Ok(credential);
        }

        if !credential.is_refreshable() {
            info!("Credential for {} expired and cannot be refreshed, re-authorizing", key);
            return self.authorize(platform, account_id, config).await;
        }
        let refresh_token = credential.refresh_token.clone().unwrap_or_default();

        info!("Refreshing expired credential for {}", key);
        match self.oauth.refresh(platform, config, &refresh_token).await {
            Ok(grant) => {
                let granted: Vec<String> = credential.scopes.iter().cloned().collect();
                let refreshed = grant.into_credential(
                    platform,
                    account_id,
                    &granted,
                    Some(refresh_token),
                    Utc::now(),
                );
                self.store.save(&refreshed)?;
                info!("Refreshed credential for {}", key);
                Ok(refreshed)
            }
            Err(e @ OAuthError::InvalidGrant { .. }) => {
                warn!(
                    "Refresh token for {} is invalid ({}), re-authorizing",
                    key, e
                );
                self.authorize(platform, account_id, config).await
            }
            Err(e) => {
                warn!("Refreshing credential for {} failed: {}", key, e);
                Err(PublishError::from_oauth(platform, &e).into())
            }
        }
    }

    async fn authorize(
        &self,
        platform: &str,
        account_id: &str,
        config: &OAuthConfig,
    ) -> Result<Credential> {
        let grant = self.oauth.authorize(platform, config).await.map_err(|e| {
            warn!("Authorization for {}.{} failed: {}", platform, account_id, e);
            PublishError::from_oauth(platform, &e)
        })?;

        let credential =
            grant.into_credential(platform, account_id, &config.scopes, None, Utc::now());
        self.store.save(&credential)?;
        info!(
            "Stored new credential for {}.{} ({} backend)",
            platform,
            account_id,
            self.store.backend_name()
        );
        Ok(credential)
    }

    fn lock_for(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.key_locks.lock().map_err(|_| {
            CredentialError::Io(std::io::Error::other("credential lock map poisoned"))
        })?;
        Ok(locks.entry(key.to_string()).or_default().clone())
    }
}
