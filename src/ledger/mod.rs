//! Persisted record of pipeline work that is already done.
//!
//! The ledger maps [`ArtifactKey`]s to a status. Only confirmed keys survive a
//! [`Ledger::persist`]; pending keys are an in-memory notion for the current
//! pass. Persisting writes a temporary sibling file and renames it over the
//! previous checkpoint, so an interrupted write leaves the old ledger intact.

pub mod error;
pub mod key;

use crate::ledger::error::LedgerError;
use crate::ledger::key::ArtifactKey;
use bincode::config::{Configuration, Fixint, LittleEndian};
use log::{debug, info};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const LEDGER_FILE_NAME: &str = "ledger.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<ArtifactKey, EntryStatus>,
}

impl Ledger {
    /// Loads the ledger at `path`. A missing file yields an empty ledger.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let entries = match std::fs::read(path) {
            Ok(bytes) => {
                let (keys, _) = bincode::serde::decode_from_slice::<Vec<String>, _>(
                    &bytes,
                    BINCODE_CONFIG,
                )
                .map_err(|e| LedgerError::Decode(path.to_path_buf(), Box::new(e)))?;
                debug!("Loaded {} ledger entries from {}", keys.len(), path.display());
                keys.into_iter()
                    .map(|k| (ArtifactKey::from(k), EntryStatus::Confirmed))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No ledger at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(LedgerError::Read(path.to_path_buf(), e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Loads `ledger.bin` from a request output directory.
    pub fn load_in(dir: &Path) -> Result<Self, LedgerError> {
        Self::load(&dir.join(LEDGER_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_done(&self, key: &ArtifactKey) -> bool {
        self.entries.get(key) == Some(&EntryStatus::Confirmed)
    }

    pub fn status(&self, key: &ArtifactKey) -> Option<EntryStatus> {
        self.entries.get(key).copied()
    }

    /// Records that work on `key` has started. Does not downgrade a confirmed key.
    pub fn mark_pending(&mut self, key: &ArtifactKey) {
        self.entries
            .entry(key.clone())
            .or_insert(EntryStatus::Pending);
    }

    pub fn mark_done(&mut self, key: &ArtifactKey) {
        self.entries.insert(key.clone(), EntryStatus::Confirmed);
    }

    /// Forgets `key`. Returns whether it was present.
    pub fn unmark(&mut self, key: &ArtifactKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn confirmed_keys(&self) -> impl Iterator<Item = &ArtifactKey> {
        self.entries
            .iter()
            .filter(|(_, status)| **status == EntryStatus::Confirmed)
            .map(|(key, _)| key)
    }

    /// Number of confirmed keys.
    pub fn len(&self) -> usize {
        self.confirmed_keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes all confirmed keys to disk, replacing the previous checkpoint atomically.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let keys: Vec<&str> = self.confirmed_keys().map(ArtifactKey::as_str).collect();
        let bytes = bincode::serde::encode_to_vec(&keys, BINCODE_CONFIG)
            .map_err(|e| LedgerError::Encode(Box::new(e)))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| LedgerError::Write(dir.to_path_buf(), e))?;

        let mut temp =
            NamedTempFile::new_in(dir).map_err(|e| LedgerError::Write(self.path.clone(), e))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| LedgerError::Write(self.path.clone(), e))?;
        temp.persist(&self.path)
            .map_err(|e| LedgerError::Persist(self.path.clone(), e))?;

        debug!("Persisted {} ledger entries to {}", keys.len(), self.path.display());
        Ok(())
    }
}
