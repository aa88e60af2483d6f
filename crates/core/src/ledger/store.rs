//! Durable storage for the ledger document.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::types::RunState;
use super::LedgerError;

/// Trait for ledger document storage.
///
/// The document is one structured unit; there is no per-field update
/// primitive, `save` always replaces the whole thing.
pub trait LedgerStore: Send + Sync {
    /// Read the document. `Ok(None)` when no document exists yet.
    fn load(&self) -> Result<Option<RunState>, LedgerError>;

    /// Replace the document with the given state, atomically.
    fn save(&self, state: &RunState) -> Result<(), LedgerError>;
}

/// File-backed store: one pretty-printed JSON document per run.
///
/// Writes go to a sibling temp file first and are moved into place with a
/// rename, so observers never see a half-written document.
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> Result<Option<RunState>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Io(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let state: RunState = serde_json::from_str(&content).map_err(|e| {
            LedgerError::Corrupt(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(state))
    }

    fn save(&self, state: &RunState) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::Io(format!(
                        "failed to create ledger directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| {
            LedgerError::Io(format!("failed to write {}: {}", temp.display(), e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            LedgerError::Io(format!(
                "failed to move {} into place: {}",
                temp.display(),
                e
            ))
        })?;
        Ok(())
    }
}
