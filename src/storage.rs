//! Persistence of numbered states and repository settings
//!
//! ## Layout
//!
//! ```text
//! .snapsum/
//! ├── settings.json            # Settings, pretty JSON
//! └── states/
//!     ├── state_1.json.lz4     # First state, every file added
//!     ├── state_2.json.lz4
//!     └── ...
//! ```
//!
//! State numbers are contiguous from 1. The last state is found by probing
//! 1, 2, ... until a file is missing, so a stray file past a gap is never
//! taken for history. Every write goes through a temp file and a rename.

use crate::compression::CompressionEngine;
use crate::error::{Result, SnapsumError};
use crate::types::{LogEntry, Settings, State};
use crate::utils::atomic_write;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the settings record inside the repository directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Directory holding the state files inside the repository directory
pub const STATES_DIR: &str = "states";

/// Read `settings.json`
pub fn load_settings(repository_dir: &Path) -> Result<Settings> {
    let content = fs::read_to_string(repository_dir.join(SETTINGS_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

/// Write `settings.json`
pub fn save_settings(repository_dir: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    atomic_write(&repository_dir.join(SETTINGS_FILE), json.as_bytes())
}

/// Numbered, append-only sequence of states
#[derive(Debug)]
pub struct StateStore {
    states_dir: PathBuf,
    compression: CompressionEngine,
}

impl StateStore {
    /// Create the states directory and open it
    pub fn create(states_dir: PathBuf, compression: CompressionEngine) -> Result<Self> {
        fs::create_dir_all(&states_dir)?;
        info!("Created state store at {:?}", states_dir);
        Ok(Self {
            states_dir,
            compression,
        })
    }

    /// Open an existing states directory
    pub fn open(states_dir: PathBuf, compression: CompressionEngine) -> Result<Self> {
        if !states_dir.is_dir() {
            return Err(SnapsumError::internal(format!(
                "State directory {:?} is missing",
                states_dir
            )));
        }
        Ok(Self {
            states_dir,
            compression,
        })
    }

    /// Path of state `number`
    pub fn state_path(&self, number: u32) -> PathBuf {
        self.states_dir.join(format!("state_{}.json.lz4", number))
    }

    /// Number of the last state, 0 when the store is empty
    pub fn last_state_number(&self) -> u32 {
        let mut number = 0;
        while self.state_path(number + 1).is_file() {
            number += 1;
        }
        number
    }

    /// Store `state` as the next number and return that number
    pub fn append(&self, state: &State) -> Result<u32> {
        let number = self.last_state_number() + 1;
        let json = serde_json::to_vec(state)?;
        let blob = self.compression.compress(&json);
        atomic_write(&self.state_path(number), &blob)?;

        debug!(
            "Stored state {} ({} files, {} -> {} bytes)",
            number,
            state.file_count,
            json.len(),
            blob.len()
        );
        Ok(number)
    }

    /// Load state `number`
    ///
    /// A file that fails to decompress, parse or verify is reported as a
    /// corrupted state, never skipped.
    pub fn load(&self, number: u32) -> Result<State> {
        let path = self.state_path(number);
        let blob = match fs::read(&path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapsumError::internal(format!("State {} does not exist", number)));
            }
            Err(e) => return Err(e.into()),
        };

        let json = self
            .compression
            .decompress(&blob)
            .map_err(|e| SnapsumError::corrupted(&path, e))?;
        let state: State =
            serde_json::from_slice(&json).map_err(|e| SnapsumError::corrupted(&path, e))?;
        if !state.verify_integrity() {
            return Err(SnapsumError::corrupted(&path, "state hash mismatch"));
        }
        Ok(state)
    }

    /// Load the last state, `None` on an empty store
    pub fn load_last(&self) -> Result<Option<(u32, State)>> {
        match self.last_state_number() {
            0 => Ok(None),
            number => Ok(Some((number, self.load(number)?))),
        }
    }

    /// Delete the highest-numbered state and return its number
    pub fn rollback_last(&self) -> Result<Option<u32>> {
        match self.last_state_number() {
            0 => Ok(None),
            number => {
                fs::remove_file(self.state_path(number))?;
                info!("Removed state {}", number);
                Ok(Some(number))
            }
        }
    }

    /// Summaries of states 1..=N
    pub fn enumerate(&self) -> Result<Vec<LogEntry>> {
        (1..=self.last_state_number())
            .map(|number| Ok(self.load(number)?.log_entry(number)))
            .collect()
    }
}
