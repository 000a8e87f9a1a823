//! Persisted run state and the key-value store behind it.
//!
//! ## Layout
//!
//! Three logical keys are stored, each as an independent value:
//!
//! | Key                          | Content                                  |
//! |------------------------------|------------------------------------------|
//! | [`StorageKey::Credential`]   | API key, plain text                      |
//! | [`StorageKey::CustomPrompt`] | extra translation instructions           |
//! | [`StorageKey::RunState`]     | [`RunState`] as JSON                     |
//!
//! The JSON field names (`paragraphs`, `translatedParagraphs`,
//! `documentSummary`, `customPrompt`, `timestamp`) are a stable format:
//! state files exported from one run can be loaded into another.
//!
//! [`FileStore`] writes each key through a temp file in the same directory
//! followed by a rename, so a crash mid-write leaves the previous value
//! intact rather than a truncated JSON document.

use crate::error::TranslateError;
use crate::pipeline::segment::Paragraph;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

// ── Run state ────────────────────────────────────────────────────────────

/// Snapshot of a translation run, written after every completed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub paragraphs: Vec<Paragraph>,
    /// Aligned by index with `paragraphs`; `null` marks an untranslated slot.
    #[serde(default)]
    pub translated_paragraphs: Vec<Option<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub document_summary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub custom_prompt: String,
    /// Unix epoch milliseconds of the save.
    #[serde(default)]
    pub timestamp: i64,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl RunState {
    /// Build a snapshot stamped with the current time.
    pub fn new(
        paragraphs: Vec<Paragraph>,
        translated_paragraphs: Vec<Option<String>>,
        document_summary: String,
        custom_prompt: String,
    ) -> Self {
        Self {
            paragraphs,
            translated_paragraphs,
            document_summary,
            custom_prompt,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Pad `translated_paragraphs` with `None` up to the paragraph count and
    /// turn blank translations into `None`. Never truncates.
    pub fn reconcile(&mut self) {
        if self.translated_paragraphs.len() < self.paragraphs.len() {
            self.translated_paragraphs.resize(self.paragraphs.len(), None);
        }
        for slot in &mut self.translated_paragraphs {
            if slot.as_deref().is_some_and(|t| t.trim().is_empty()) {
                *slot = None;
            }
        }
    }

    /// 0-based index of the first paragraph without a translation.
    pub fn first_absent(&self) -> Option<usize> {
        (0..self.paragraphs.len()).find(|&i| {
            self.translated_paragraphs
                .get(i)
                .and_then(|t| t.as_deref())
                .is_none_or(|t| t.trim().is_empty())
        })
    }

    /// Number of paragraphs that have a translation.
    pub fn translated_count(&self) -> usize {
        self.translated_paragraphs
            .iter()
            .take(self.paragraphs.len())
            .filter(|t| t.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .count()
    }

    /// Pretty-printed JSON, as written by `export state`.
    pub fn to_pretty_json(&self) -> Result<String, TranslateError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TranslateError::Internal(format!("serialising run state: {e}")))
    }

    fn validate(&self) -> Result<(), String> {
        if self.paragraphs.is_empty() {
            return Err("no paragraphs".into());
        }
        if let Some((i, p)) = self
            .paragraphs
            .iter()
            .enumerate()
            .find(|(i, p)| p.number != i + 1)
        {
            return Err(format!(
                "paragraph at position {} is numbered {}",
                i + 1,
                p.number
            ));
        }
        Ok(())
    }
}

// ── Key-value backends ───────────────────────────────────────────────────

/// The three values the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Credential,
    CustomPrompt,
    RunState,
}

impl StorageKey {
    /// File name used by [`FileStore`].
    pub fn file_name(self) -> &'static str {
        match self {
            StorageKey::Credential => "api_key",
            StorageKey::CustomPrompt => "custom_prompt.txt",
            StorageKey::RunState => "translation_state.json",
        }
    }
}

/// Durable string storage keyed by [`StorageKey`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, TranslateError>;
    fn set(&self, key: StorageKey, value: &str) -> Result<(), TranslateError>;
    fn remove(&self, key: StorageKey) -> Result<(), TranslateError>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TranslateError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| TranslateError::StorageFailed {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: StorageKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, TranslateError> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TranslateError::StorageFailed { path, source }),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), TranslateError> {
        let path = self.path(key);
        let storage_err = |source: std::io::Error| TranslateError::StorageFailed {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(storage_err)?;
        tmp.write_all(value.as_bytes()).map_err(storage_err)?;
        tmp.as_file().sync_all().map_err(storage_err)?;
        tmp.persist(&path).map_err(|e| storage_err(e.error))?;
        debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), TranslateError> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TranslateError::StorageFailed { path, source }),
        }
    }
}

/// Process-local store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, TranslateError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), TranslateError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), TranslateError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(&key);
        Ok(())
    }
}

// ── State store ──────────────────────────────────────────────────────────

/// Typed access to the credential, custom prompt, and run state.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

impl StateStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Write the run snapshot. Errors are returned; callers mid-run log them
    /// and carry on.
    pub fn save(&self, state: &RunState) -> Result<(), TranslateError> {
        let json = serde_json::to_string(state)
            .map_err(|e| TranslateError::Internal(format!("serialising run state: {e}")))?;
        self.backend.set(StorageKey::RunState, &json)
    }

    /// Read the saved snapshot. Missing, unreadable, or corrupt data all
    /// yield `None`; the latter two are logged.
    pub fn load(&self) -> Option<RunState> {
        let raw = match self.backend.get(StorageKey::RunState) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read saved state: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<RunState>(&raw) {
            Ok(mut state) => match state.validate() {
                Ok(()) => {
                    state.reconcile();
                    Some(state)
                }
                Err(detail) => {
                    warn!("Ignoring saved state: {}", detail);
                    None
                }
            },
            Err(e) => {
                warn!("Ignoring corrupt saved state: {}", e);
                None
            }
        }
    }

    /// Parse a state blob supplied by the user (e.g. an exported file).
    pub fn load_from_external(bytes: &[u8]) -> Result<RunState, TranslateError> {
        let mut state: RunState =
            serde_json::from_slice(bytes).map_err(|e| TranslateError::InvalidStateFile {
                detail: e.to_string(),
            })?;
        state
            .validate()
            .map_err(|detail| TranslateError::InvalidStateFile { detail })?;
        state.reconcile();
        Ok(state)
    }

    pub fn clear_run_state(&self) -> Result<(), TranslateError> {
        self.backend.remove(StorageKey::RunState)
    }

    /// Stored API key, if any non-blank one exists.
    pub fn credential(&self) -> Option<String> {
        self.read_trimmed(StorageKey::Credential)
    }

    pub fn set_credential(&self, key: &str) -> Result<(), TranslateError> {
        self.backend.set(StorageKey::Credential, key.trim())
    }

    pub fn clear_credential(&self) -> Result<(), TranslateError> {
        self.backend.remove(StorageKey::Credential)
    }

    pub fn custom_prompt(&self) -> Option<String> {
        self.read_trimmed(StorageKey::CustomPrompt)
    }

    pub fn set_custom_prompt(&self, prompt: &str) -> Result<(), TranslateError> {
        self.backend.set(StorageKey::CustomPrompt, prompt)
    }

    fn read_trimmed(&self, key: StorageKey) -> Option<String> {
        match self.backend.get(key) {
            Ok(v) => v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            Err(e) => {
                warn!("Could not read {:?}: {}", key, e);
                None
            }
        }
    }
}
