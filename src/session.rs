//! Session Store: an append-only per-session message log with metadata.
//!
//! Messages are stored as one JSON object per line (`sessions/<key>.jsonl`).
//! The write path holds a per-session lock (single writer per key) and
//! flushes on every append; the read path tolerates a truncated tail (skips
//! lines that fail to parse) so a crash mid-write never poisons history
//! replay. Metadata (`displayName`, `createdAt`, `updatedAt`) lives in a
//! small sibling JSON document per session.

use crate::error::{Error, Result};
use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

const DISPLAY_NAME_MAX_CHARS: usize = 40;

/// Per-session metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub display_name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Summary row returned by `list_sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub key: String,
    pub display_name: String,
}

/// Normalise a client-supplied opaque string into a stable, filesystem-safe
/// session key: strips path separators and non-printing characters, and
/// bounds the length. The normalisation is lossless enough that distinct
/// inputs differing only in stripped characters collide — callers should
/// treat the opaque string, not the normalised key, as their handle.
pub fn normalize_session_key(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_graphic() && *c != '/' && *c != '\\' && *c != '.')
        .collect();
    if cleaned.is_empty() {
        return Err(Error::invalid_input("session_key must contain at least one printable, non-separator character"));
    }
    Ok(cleaned.chars().take(200).collect())
}

/// Append-only, file-backed session store.
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn metadata_dir(&self) -> PathBuf {
        self.root.join("session_metadata")
    }

    fn log_path(&self, key: &str) -> PathBuf {
        self.sessions_dir().join(format!("{key}.jsonl"))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.metadata_dir().join(format!("{key}.json"))
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Durably append one message to the session's log, creating the session
    /// (and its metadata, if absent) as needed.
    pub async fn append(&self, key: &str, message: &Message) -> Result<()> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        std::fs::create_dir_all(self.sessions_dir())?;
        std::fs::create_dir_all(self.metadata_dir())?;

        let line = serde_json::to_string(message)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(key))?;
        writeln!(file, "{line}")?;
        file.sync_all()?;

        self.touch_metadata(key, message).await?;
        Ok(())
    }

    async fn touch_metadata(&self, key: &str, message: &Message) -> Result<()> {
        let path = self.metadata_path(key);
        let now = chrono::Utc::now().timestamp_millis();

        let mut metadata = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<SessionMetadata>(&contents).unwrap_or(SessionMetadata {
                display_name: String::new(),
                created_at: now,
                updated_at: now,
            }),
            Err(_) => SessionMetadata {
                display_name: default_display_name(message),
                created_at: now,
                updated_at: now,
            },
        };
        metadata.updated_at = now;
        if metadata.display_name.is_empty() {
            metadata.display_name = default_display_name(message);
        }

        std::fs::write(&path, serde_json::to_string(&metadata)?)?;
        Ok(())
    }

    /// List all messages for a session in insertion order, tolerating a
    /// truncated or corrupt final line.
    pub async fn list(&self, key: &str) -> Result<Vec<Message>> {
        let path = self.log_path(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str::<Message>(line).ok())
            .collect())
    }

    /// List all known sessions, sorted by `updated_at` descending.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let dir = self.metadata_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut rows: Vec<(i64, SessionSummary)> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(metadata) = serde_json::from_str::<SessionMetadata>(&contents) else {
                continue;
            };
            rows.push((
                metadata.updated_at,
                SessionSummary {
                    key: key.to_string(),
                    display_name: metadata.display_name,
                },
            ));
        }

        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, s)| s).collect())
    }

    /// Rename a session's display name.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the session has no metadata on disk.
    pub async fn rename(&self, key: &str, new_name: &str) -> Result<()> {
        let path = self.metadata_path(key);
        let contents = std::fs::read_to_string(&path)
            .map_err(|_| Error::not_found(format!("session '{key}'")))?;
        let mut metadata: SessionMetadata = serde_json::from_str(&contents)?;
        metadata.display_name = new_name.to_string();
        metadata.updated_at = chrono::Utc::now().timestamp_millis();
        std::fs::write(&path, serde_json::to_string(&metadata)?)?;
        Ok(())
    }

    /// Delete a session's log and metadata.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the session has no metadata on disk.
    /// Tool-context pointers referenced by the deleted session's messages are
    /// intentionally left behind (no cascade-delete — see DESIGN.md).
    pub async fn delete(&self, key: &str) -> Result<()> {
        let meta_path = self.metadata_path(key);
        if !meta_path.exists() {
            return Err(Error::not_found(format!("session '{key}'")));
        }
        let _ = std::fs::remove_file(meta_path);
        let _ = std::fs::remove_file(self.log_path(key));
        Ok(())
    }
}

fn default_display_name(first_message: &Message) -> String {
    let text = first_message.content.as_deref().unwrap_or("");
    truncate_chars(text, DISPLAY_NAME_MAX_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
