//! # Session Caching
//!
//! Keeps the logged-in user and the backend session cookie between runs, so
//! that every command does not need a fresh login.
//!
//! ## Lifecycle
//! - **Populated** on successful login or registration
//! - **Read** at startup; a stale, missing or corrupt file is treated as logged out
//! - **Invalidated** on logout, and whenever the backend rejects the session
//!   (a 401 from `/api/me` or any other call)
//!
//! ## Storage
//! - **Location**: configurable, `/tmp/potbot_session.json` by default (cleared on reboot)
//! - **Format**: JSON
//! - **Permissions**: written to a fresh `0600` temporary file and renamed
//!   into place, so the cookie is never readable by other users and a symlink
//!   planted at the cache path is replaced rather than followed
//! - **TTL**: checked against the file modification time; defaults to the
//!   backend's 24 hour cookie lifetime
//!
//! The cache is only a hint. The backend stays the authority on whether a
//! session is valid.

use crate::client::{ClientError, PotbotClient, User};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use std::{fs, io};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session cache IO: {0}")]
    Io(#[from] io::Error),

    #[error("session cache corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("session cache expired")]
    Stale,

    #[error("backend did not set a session cookie")]
    NoCookie,
}

/// What gets persisted for a logged-in user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    /// `potbot_session=...` cookie pair to replay on requests
    pub cookie: String,
}

/// File-backed session cache with a time-to-live.
#[derive(Clone, Debug)]
pub struct SessionCache {
    path: PathBuf,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// Load the cached session if it is present and younger than the TTL.
    pub fn load(&self) -> Result<Session, SessionError> {
        let meta = fs::metadata(&self.path)?;

        // Check if cache has expired based on file modification time
        let age = SystemTime::now()
            .duration_since(meta.modified()?)
            .unwrap_or_default();
        if age > self.ttl {
            debug!(path = %self.path.display(), ?age, "session cache is stale");
            return Err(SessionError::Stale);
        }

        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Cached session, or `None` for any reason the cache cannot be used.
    pub fn current(&self) -> Option<Session> {
        match self.load() {
            Ok(session) => Some(session),
            Err(err) => {
                debug!(error = %err, "no usable session cache");
                None
            }
        }
    }

    pub fn store(&self, session: &Session) -> Result<(), SessionError> {
        let data = serde_json::to_vec(session)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&data)?;
        file.persist(&self.path).map_err(|err| err.error)?;
        info!(user_id = session.user.user_id, "session cached");
        Ok(())
    }

    /// Cache the session that a login or registration just opened on `client`.
    pub fn remember(&self, client: &PotbotClient, user: &User) -> Result<Session, SessionError> {
        let cookie = client.session_cookie().ok_or(SessionError::NoCookie)?;
        let session = Session {
            user: user.clone(),
            cookie: cookie.to_string(),
        };
        self.store(&session)?;
        Ok(session)
    }

    /// Pass a backend result through, forgetting the session if the backend
    /// rejected it.
    pub fn check<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::Unauthorized(_)) = &result {
            self.forget();
        }
        result
    }

    /// [`invalidate`](Self::invalidate), logging instead of failing.
    pub fn forget(&self) {
        if let Err(err) = self.invalidate() {
            warn!(error = %err, "could not clear session cache");
        }
    }

    /// Forget the cached session. A missing file is not an error.
    pub fn invalidate(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "session cache cleared");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
