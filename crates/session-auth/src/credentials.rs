//! Credential storage for the bearer session
//!
//! Holds the access and refresh credential for the current user and persists
//! them to a JSON file keyed by `accessToken` / `refreshToken`, so a session
//! survives process restarts. Both keys absent means "logged out".
//!
//! Reads are synchronous snapshots of the in-memory state so the credential
//! attacher never suspends. Writes are serialized by a tokio Mutex and use
//! atomic temp-file + rename, so request-time refresh and logout cannot
//! interleave on disk.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// On-disk shape of the credential file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(
        rename = "accessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub access: Option<String>,
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh: Option<String>,
}

impl StoredTokens {
    fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Process-wide credential store.
///
/// Constructed once and shared via `Arc`. `path` is `None` for an ephemeral
/// store that never touches disk.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: RwLock<StoredTokens>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start, logged out).
    /// Missing parent directories are created.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let tokens: StoredTokens = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            let tokens = normalize(tokens);
            info!(
                path = %path.display(),
                has_access = tokens.access.is_some(),
                has_refresh = tokens.refresh.is_some(),
                "loaded credentials"
            );
            tokens
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;
            }
            let tokens = StoredTokens::default();
            write_atomic(&path, &tokens).await?;
            tokens
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    /// In-memory store with no backing file.
    pub fn ephemeral(tokens: StoredTokens) -> Self {
        Self {
            path: None,
            state: RwLock::new(normalize(tokens)),
            write_lock: Mutex::new(()),
        }
    }

    /// Current access credential, if any.
    pub fn access_token(&self) -> Option<Secret<String>> {
        self.read_state().access.as_deref().map(Secret::from)
    }

    /// Current refresh credential, if any.
    pub fn refresh_token(&self) -> Option<Secret<String>> {
        self.read_state().refresh.as_deref().map(Secret::from)
    }

    /// Whether any credential is stored.
    pub fn has_credentials(&self) -> bool {
        !self.read_state().is_empty()
    }

    /// Copy of the stored pair.
    pub fn snapshot(&self) -> StoredTokens {
        self.read_state().clone()
    }

    /// Store tokens minted by a refresh.
    ///
    /// The access credential is always overwritten; the refresh credential is
    /// only replaced when the backend issued a new one. Memory is updated
    /// before the file is written, so a failed write still leaves the new
    /// tokens usable for this process.
    pub async fn update_tokens(&self, access: &str, refresh: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.write_state();
            state.access = non_blank(access);
            if let Some(refresh) = refresh.and_then(non_blank) {
                state.refresh = Some(refresh);
            }
            state.clone()
        };
        debug!(rotated_refresh = refresh.is_some(), "updated tokens");
        self.persist(&snapshot).await
    }

    /// Replace both credentials (login).
    pub async fn replace(&self, access: &str, refresh: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.write_state();
            state.access = non_blank(access);
            state.refresh = refresh.and_then(non_blank);
            state.clone()
        };
        debug!("replaced credentials");
        self.persist(&snapshot).await
    }

    /// Remove both credentials (logout or unrecoverable refresh failure).
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.write_state();
            *state = StoredTokens::default();
            state.clone()
        };
        debug!("cleared credentials");
        self.persist(&snapshot).await
    }

    /// Remove both credentials, but only while `access` is still the stored
    /// access credential. Returns whether this call cleared them, so a
    /// session rejected by several calls at once is ended exactly once.
    pub async fn clear_if_access(&self, access: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.write_state();
            if state.access.as_deref() != Some(access) {
                return Ok(false);
            }
            *state = StoredTokens::default();
            state.clone()
        };
        debug!("cleared rejected credentials");
        self.persist(&snapshot).await?;
        Ok(true)
    }

    async fn persist(&self, tokens: &StoredTokens) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, tokens).await,
            None => Ok(()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoredTokens> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoredTokens> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn non_blank(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Empty strings in the file mean "absent".
fn normalize(tokens: StoredTokens) -> StoredTokens {
    StoredTokens {
        access: tokens.access.as_deref().and_then(non_blank),
        refresh: tokens.refresh.as_deref().and_then(non_blank),
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, tokens: &StoredTokens) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
