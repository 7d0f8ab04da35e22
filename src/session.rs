//! Session identifiers and the session store registry
//!
//! A session is one upload-to-query lifecycle. Each session:
//! - Has an unguessable UUIDv4 identifier, rendered as 32 lowercase hex chars
//! - Owns exactly one SQLite store at `<db_dir>/<id>.db`
//! - Is never expired or deleted by the server
//!
//! The filesystem is the registry: a session exists exactly when its store
//! file exists. Callers go through [`SessionRegistry`] so that a metadata
//! index could replace the path check without touching them.

use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{Result, SheetSqlError};

/// File extension of session stores
pub const STORE_EXTENSION: &str = "db";

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a client-supplied id.
    ///
    /// Only the generated shape is accepted, which also keeps the derived
    /// store path inside the database directory.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == 32
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved session store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    pub session_id: SessionId,
    pub path: PathBuf,
}

/// Maps session ids to their relational stores
pub trait SessionRegistry: Send + Sync {
    /// Canonical store path for a session, whether or not it exists yet
    fn store_path(&self, id: &SessionId) -> PathBuf;

    /// Look up an existing session store
    ///
    /// # Errors
    ///
    /// Returns `SheetSqlError::SessionNotFound` if the id is malformed or no
    /// store exists for it.
    fn resolve(&self, raw_id: &str) -> Result<StoreLocation>;
}

/// Registry that derives store paths from session ids
#[derive(Debug, Clone)]
pub struct FsSessionRegistry {
    db_dir: PathBuf,
}

impl FsSessionRegistry {
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
        }
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }
}

impl SessionRegistry for FsSessionRegistry {
    fn store_path(&self, id: &SessionId) -> PathBuf {
        self.db_dir.join(format!("{}.{}", id.as_str(), STORE_EXTENSION))
    }

    fn resolve(&self, raw_id: &str) -> Result<StoreLocation> {
        let session_id = SessionId::parse(raw_id)
            .ok_or_else(|| SheetSqlError::SessionNotFound(raw_id.to_string()))?;

        let path = self.store_path(&session_id);
        if !path.is_file() {
            return Err(SheetSqlError::SessionNotFound(raw_id.to_string()));
        }

        Ok(StoreLocation { session_id, path })
    }
}
