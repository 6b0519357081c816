//! Session blob storage.
//!
//! A session is either persisted in a per-identifier SQLite file or kept in
//! process memory.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{AppError, Result};

/// File extension of persisted sessions.
const SESSION_EXTENSION: &str = "session";

/// Storage for the credential/session blob backing a connection.
pub trait SessionStore: Send + Sync {
    /// Load the blob, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    fn save(&self, blob: &[u8]) -> Result<()>;

    /// Remove the persisted blob. Missing data is not an error.
    fn destroy(&self) -> Result<()>;
}

/// SQLite-backed session, one file per session identifier.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Session file for `name` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.{SESSION_EXTENSION}")),
        }
    }

    /// Opens or creates the session database.
    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create session directory", e))?;
        }

        let conn = Connection::open(&self.path).map_err(AppError::session_store)?;
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS session (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )
        .map_err(AppError::session_store)?;

        Ok(conn)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.is_file() {
            return Ok(None);
        }

        let conn = self.open()?;
        conn.query_row("SELECT data FROM session WHERE id = 1", [], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .map_err(AppError::session_store)
    }

    fn save(&self, blob: &[u8]) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            r"
            INSERT INTO session (id, data) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = datetime('now')
            ",
            params![blob],
        )
        .map_err(AppError::session_store)?;

        tracing::debug!(path = %self.path.display(), bytes = blob.len(), "Session saved");
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Session file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::io(
                format!("Failed to remove {}", self.path.display()),
                e,
            )),
        }
    }
}

/// Session held purely in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        // A poisoned lock still holds a usable blob.
        self.blob
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().clone())
    }

    fn save(&self, blob: &[u8]) -> Result<()> {
        *self.lock() = Some(blob.to_vec());
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

/// Remove every persisted session file in `dir`.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub fn delete_all_session_files(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to read directory {}", dir.display()), e))?;

    let mut removed = 0;
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SESSION_EXTENSION) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove session file"),
            }
        }
    }

    Ok(removed)
}
