//! Credential persistence
//!
//! Credentials are stored one JSON file per (platform, account) under a fixed
//! root directory, named `{platform}.{account}.json`. Key components are
//! validated before any path is built: anything that could escape the root
//! (separators, `..`, absolute paths, leading dots) is rejected with
//! `ValidationError::UnsafeStorageKey` rather than silently rewritten.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{CredentialError, Result, ValidationError};
use crate::types::Credential;

/// Storage backend for OAuth credentials
///
/// Implementations are pure key-value persistence and never touch the network.
///
/// # Example Implementation
///
/// ```no_run
/// use libpublisher::credentials::CredentialStore;
/// use libpublisher::error::Result;
/// use libpublisher::types::Credential;
///
/// struct NullStore;
///
/// impl CredentialStore for NullStore {
///     fn load(&self, platform: &str, account_id: &str) -> Result<Credential> {
///         Err(libpublisher::error::CredentialError::NotFound(
///             format!("{}.{}", platform, account_id),
///         )
///         .into())
///     }
///
///     fn save(&self, _credential: &Credential) -> Result<()> {
///         Ok(())
///     }
///
///     fn delete(&self, _platform: &str, _account_id: &str) -> Result<()> {
///         Ok(())
///     }
///
///     fn backend_name(&self) -> &str {
///         "null"
///     }
/// }
/// ```
pub trait CredentialStore: Send + Sync {
    /// Load the credential for an account
    ///
    /// # Errors
    ///
    /// - `CredentialError::NotFound` if nothing is stored for the key
    /// - `ValidationError::UnsafeStorageKey` if a key component is unsafe
    /// - `CredentialError::Format` if the stored data is corrupt
    fn load(&self, platform: &str, account_id: &str) -> Result<Credential>;

    /// Persist a credential, replacing any previous one for the same key
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove a stored credential; removing a missing one is not an error
    fn delete(&self, platform: &str, account_id: &str) -> Result<()>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &str;
}

/// Check one storage key component (platform name or account id)
///
/// Allowed: ASCII letters, digits, `-`, `_`, `.` and `@`, not starting with a
/// dot and never containing `..`.
pub fn validate_key_component(component: &str) -> std::result::Result<(), ValidationError> {
    let unsafe_key = |reason: &str| ValidationError::UnsafeStorageKey {
        component: component.to_string(),
        reason: reason.to_string(),
    };

    if component.is_empty() {
        return Err(unsafe_key("must not be empty"));
    }
    if Path::new(component).is_absolute() || component.starts_with(['/', '\\']) {
        return Err(unsafe_key("absolute paths are not allowed"));
    }
    if component.contains("..") {
        return Err(unsafe_key("parent directory segments are not allowed"));
    }
    if component.contains(['/', '\\']) {
        return Err(unsafe_key("path separators are not allowed"));
    }
    if component.starts_with('.') {
        return Err(unsafe_key("must not start with '.'"));
    }
    if let Some(c) = component
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')))
    {
        return Err(unsafe_key(&format!("character {:?} is not allowed", c)));
    }

    Ok(())
}

/// Storage key shared by every backend, validated
///
/// The platform and account are joined with `.`, so the platform part may not
/// contain one; otherwise `("a.b", "c")` and `("a", "b.c")` would share a key.
pub fn storage_key(platform: &str, account_id: &str) -> Result<String> {
    validate_key_component(platform)?;
    if platform.contains('.') {
        return Err(ValidationError::UnsafeStorageKey {
            component: platform.to_string(),
            reason: "platform names must not contain '.'".to_string(),
        }
        .into());
    }
    validate_key_component(account_id)?;
    Ok(format!("{}.{}", platform, account_id))
}

/// Validate that a path is not a symlink
///
/// Credential files must be regular files so a planted link cannot redirect
/// reads or writes outside the storage root.
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CredentialError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read metadata for '{}': {}", path.display(), e),
        ))
    })?;

    if metadata.is_symlink() {
        return Err(CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Security: Credential file '{}' is a symbolic link. \
                Credential files must be regular files.",
                path.display()
            ),
        ))
        .into());
    }

    Ok(())
}

/// File storage backend
///
/// - Location: the configured root (default `~/.config/content-publisher/oauth-tokens/`)
/// - Naming: `{platform}.{account}.json`
/// - Permissions: 600 (owner read/write only) on Unix systems
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a concurrent reader sees either the old or the new credential.
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the file for a key, rejecting unsafe components
    pub fn credential_path(&self, platform: &str, account_id: &str) -> Result<PathBuf> {
        let key = storage_key(platform, account_id)?;
        Ok(self.root.join(format!("{}.json", key)))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(CredentialError::Io)?;

        let tmp_path = self
            .root
            .join(format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
        let write_result = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }

            file.write_all(data)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, path)
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(CredentialError::Io(e).into());
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, platform: &str, account_id: &str) -> Result<Credential> {
        let path = self.credential_path(platform, account_id)?;

        if !path.exists() {
            return Err(
                CredentialError::NotFound(format!("{}.{}", platform, account_id)).into(),
            );
        }

        validate_not_symlink(&path)?;

        let data = std::fs::read_to_string(&path).map_err(CredentialError::Io)?;
        let credential: Credential = serde_json::from_str(&data).map_err(|e| {
            CredentialError::Format(format!("{}: {}", path.display(), e))
        })?;

        tracing::debug!(
            "Loaded credential for {}.{} from {:?}",
            platform,
            account_id,
            path
        );
        Ok(credential)
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let path = self.credential_path(&credential.platform, &credential.account_id)?;

        if path.exists() {
            validate_not_symlink(&path)?;
        }

        let data = serde_json::to_vec_pretty(credential)
            .map_err(|e| CredentialError::Format(e.to_string()))?;
        self.write_atomic(&path, &data)?;

        tracing::debug!(
            "Stored credential for {}.{} at {:?}",
            credential.platform,
            credential.account_id,
            path
        );
        Ok(())
    }

    fn delete(&self, platform: &str, account_id: &str) -> Result<()> {
        let path = self.credential_path(platform, account_id)?;

        if path.exists() {
            std::fs::remove_file(&path).map_err(CredentialError::Io)?;
            tracing::debug!("Deleted credential for {}.{}", platform, account_id);
        }

        Ok(())
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// In-memory backend, for tests and one-shot runs that must not touch disk
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, platform: &str, account_id: &str) -> Result<Credential> {
        let key = storage_key(platform, account_id)?;
        let credentials = self.credentials.read().map_err(|_| {
            CredentialError::Io(std::io::Error::other("credential map lock poisoned"))
        })?;
        credentials
            .get(&key)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(key).into())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let key = storage_key(&credential.platform, &credential.account_id)?;
        let mut credentials = self.credentials.write().map_err(|_| {
            CredentialError::Io(std::io::Error::other("credential map lock poisoned"))
        })?;
        credentials.insert(key, credential.clone());
        Ok(())
    }

    fn delete(&self, platform: &str, account_id: &str) -> Result<()> {
        let key = storage_key(platform, account_id)?;
        let mut credentials = self.credentials.write().map_err(|_| {
            CredentialError::Io(std::io::Error::other("credential map lock poisoned"))
        })?;
        credentials.remove(&key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
