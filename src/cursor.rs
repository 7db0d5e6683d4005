// src/cursor.rs
//! Persisted ingestion cursor: the id of the last fully-disposed message.
//!
//! The cursor bounds how much of the inbox a cycle must re-scan and only
//! ever advances (monotonic in mailbox order). It is loaded at the start of
//! each poll cycle, mutated in memory as messages are disposed of, and
//! persisted once at the end of the cycle.

use std::path::{Path, PathBuf};

use crate::error::StateError;

/// Pointer to the last successfully processed message. An empty id means a
/// fresh start: the whole fetched page is the processing window.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cursor {
    pub last_message_id: String,
}

impl Cursor {
    pub fn is_empty(&self) -> bool {
        self.last_message_id.is_empty()
    }

    pub fn advance_to(&mut self, id: &str) {
        self.last_message_id = id.to_string();
    }
}

/// Durable JSON slot for the cursor, e.g. `{"last_message_id": "19af3c..."}`.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing backing file is a fresh start, not an error. Any other read
    /// or parse failure is a `StateError`: running a cycle against a guessed
    /// cursor would reprocess the whole page.
    pub fn load(&self) -> Result<Cursor, StateError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Cursor::default()),
            Err(e) => {
                return Err(StateError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&data).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    /// Best-effort durability: a save failure is reported, not fatal to the
    /// cycle whose in-memory work already completed.
    pub fn save(&self, cursor: &Cursor) -> Result<(), StateError> {
        let data = serde_json::to_string(cursor).map_err(|e| StateError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })?;
        std::fs::write(&self.path, data).map_err(|e| StateError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}
