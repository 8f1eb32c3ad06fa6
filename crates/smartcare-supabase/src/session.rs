//! Auth session cache with optional on-disk persistence.

use crate::error::{SupabaseError, SupabaseResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use smartcare_types::{Identity, IdentityId};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Refresh this long before the provider's stated expiry.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Tokens issued by the auth provider plus the identity they belong to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl AuthSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// `user` object in auth responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserResponse {
    pub fn into_identity(self) -> Identity {
        Identity::new(IdentityId::new(self.id), self.email.unwrap_or_default())
    }
}

/// Token-grant response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: UserResponse,
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> SupabaseResult<AuthSession> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => DateTime::from_timestamp(at, 0)
                .ok_or_else(|| SupabaseError::Decode(format!("bad expires_at: {at}")))?,
            (None, Some(secs)) => now + Duration::seconds(secs),
            (None, None) => {
                return Err(SupabaseError::Decode(
                    "token response carries no expiry".into(),
                ))
            }
        };
        Ok(AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into_identity(),
        })
    }
}

/// Current session, mirrored to `path` when one is configured.
pub(crate) struct SessionCache {
    current: RwLock<Option<AuthSession>>,
    path: Option<PathBuf>,
}

impl SessionCache {
    /// Load the persisted session, if any. An unreadable file is ignored.
    pub fn open(path: Option<PathBuf>) -> Self {
        let current = path.as_deref().and_then(|path| match load(path) {
            Ok(session) => session,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable session file");
                None
            }
        });
        Self {
            current: RwLock::new(current),
            path,
        }
    }

    pub fn get(&self) -> Option<AuthSession> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the session and mirror it to disk. Returns the previous one.
    pub fn replace(&self, next: Option<AuthSession>) -> Option<AuthSession> {
        if let Some(path) = &self.path {
            if let Err(err) = store(path, next.as_ref()) {
                warn!(path = %path.display(), error = %err, "failed to persist session");
            }
        }
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, next)
    }
}

fn load(path: &Path) -> SupabaseResult<Option<AuthSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let session = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), "loaded persisted session");
    Ok(Some(session))
}

fn store(path: &Path, session: Option<&AuthSession>) -> SupabaseResult<()> {
    let Some(session) = session else {
        if path.exists() {
            fs::remove_file(path)?;
        }
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
