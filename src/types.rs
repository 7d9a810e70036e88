//! Core types used throughout snapsum
//!
//! The persisted model is small: a [`State`] is an ordered list of
//! [`FileState`] records plus the counters of the comparison that produced
//! it. Everything here derives serde so states and settings round-trip
//! through JSON unchanged.

use crate::compression::CompressionStrategy;
use crate::error::SnapsumError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Current on-disk format version for states and settings
pub const FORMAT_VERSION: u32 = 1;

/// How much of each file is hashed
///
/// Modes are ordered by strength, so `min` of two modes is the strongest
/// level at which two states can still be compared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum HashMode {
    /// No hashing: identity falls back to length and modification time
    None,
    /// Hash of the first 32 KiB
    SmallBlock,
    /// Hash of the first 512 KiB
    MediumBlock,
    /// Hash of the whole content
    #[default]
    Full,
}

impl HashMode {
    /// All modes, weakest first
    pub const ALL: [HashMode; 4] = [
        HashMode::None,
        HashMode::SmallBlock,
        HashMode::MediumBlock,
        HashMode::Full,
    ];

    /// Name used on the command line and in JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            HashMode::None => "none",
            HashMode::SmallBlock => "small-block",
            HashMode::MediumBlock => "medium-block",
            HashMode::Full => "full",
        }
    }

    /// Whether file content is read at all
    pub fn is_hashing(&self) -> bool {
        *self != HashMode::None
    }
}

impl fmt::Display for HashMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashMode {
    type Err = SnapsumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| SnapsumError::InvalidHashMode(s.to_string()))
    }
}

/// Content fingerprint of one file
///
/// A file hashed with mode M carries every digest up to M, which lets a
/// `full` state be compared against a `small-block` one at the weaker level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHash {
    /// SHA-256 of the first 32 KiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_block: Option<String>,
    /// SHA-256 of the first 512 KiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium_block: Option<String>,
    /// SHA-256 of the whole file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
}

impl FileHash {
    /// Digest at the given level, absent under `None` or when not computed
    pub fn digest(&self, mode: HashMode) -> Option<&str> {
        match mode {
            HashMode::None => None,
            HashMode::SmallBlock => self.small_block.as_deref(),
            HashMode::MediumBlock => self.medium_block.as_deref(),
            HashMode::Full => self.full.as_deref(),
        }
    }
}

/// Permission and ownership bits of a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attributes {
    /// Unix mode bits (mapped from the read-only flag elsewhere)
    pub permissions: u32,
    /// Owner user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Owner group id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

/// Category assigned to a file when two states are compared
///
/// "Unchanged" is not a variant: it is the absence of a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modification {
    /// New path with no matching content elsewhere
    Added,
    /// Path gone from the tree and not consumed by a rename
    Deleted,
    /// Content moved from a path that disappeared
    Renamed,
    /// Content copied from a file still present and unchanged
    Copied,
    /// Content equal to another file added in the same state
    Duplicated,
    /// Same path, different content
    ContentModified,
    /// Same path and content, different modification time
    DateModified,
    /// Same path, content and time, different permissions or owner
    AttributesModified,
}

impl Modification {
    /// All categories in reporting order
    pub const ALL: [Modification; 8] = [
        Modification::Added,
        Modification::Copied,
        Modification::Duplicated,
        Modification::DateModified,
        Modification::ContentModified,
        Modification::AttributesModified,
        Modification::Renamed,
        Modification::Deleted,
    ];

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Modification::Added => "Added",
            Modification::Deleted => "Deleted",
            Modification::Renamed => "Renamed",
            Modification::Copied => "Copied",
            Modification::Duplicated => "Duplicated",
            Modification::ContentModified => "Content modified",
            Modification::DateModified => "Date modified",
            Modification::AttributesModified => "Attributes modified",
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Recorded state of a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Size in bytes
    pub length: u64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// Permission and owner bits
    pub attributes: Attributes,
    /// Content fingerprint
    pub file_hash: FileHash,
    /// Set only by the comparator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification: Option<Modification>,
    /// Transient mark used while removing duplicates
    #[serde(skip)]
    pub to_remove: bool,
}

impl FileState {
    /// Digest at the given hash mode
    pub fn digest(&self, mode: HashMode) -> Option<&str> {
        self.file_hash.digest(mode)
    }
}

/// Lexicographic order of relative paths, byte by byte on the whole string
///
/// `Path::cmp` walks components, which would put `a/z.txt` before `a.txt`.
pub fn path_order(a: &Path, b: &Path) -> Ordering {
    a.as_os_str().cmp(b.as_os_str())
}

/// Per-category counters of one comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModificationCounts {
    pub added: usize,
    pub copied: usize,
    pub duplicated: usize,
    pub date_modified: usize,
    pub content_modified: usize,
    pub attributes_modified: usize,
    pub renamed: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ModificationCounts {
    /// Count one classified file
    pub fn record(&mut self, modification: Option<Modification>) {
        match modification {
            None => self.unchanged += 1,
            Some(m) => *self.slot(m) += 1,
        }
    }

    /// Counter for one category
    pub fn get(&self, modification: Modification) -> usize {
        match modification {
            Modification::Added => self.added,
            Modification::Deleted => self.deleted,
            Modification::Renamed => self.renamed,
            Modification::Copied => self.copied,
            Modification::Duplicated => self.duplicated,
            Modification::ContentModified => self.content_modified,
            Modification::DateModified => self.date_modified,
            Modification::AttributesModified => self.attributes_modified,
        }
    }

    fn slot(&mut self, modification: Modification) -> &mut usize {
        match modification {
            Modification::Added => &mut self.added,
            Modification::Deleted => &mut self.deleted,
            Modification::Renamed => &mut self.renamed,
            Modification::Copied => &mut self.copied,
            Modification::Duplicated => &mut self.duplicated,
            Modification::ContentModified => &mut self.content_modified,
            Modification::DateModified => &mut self.date_modified,
            Modification::AttributesModified => &mut self.attributes_modified,
        }
    }

    /// Number of files with any modification
    pub fn modified_count(&self) -> usize {
        Modification::ALL.iter().map(|m| self.get(*m)).sum()
    }

    /// Every counter including unchanged files
    pub fn total(&self) -> usize {
        self.modified_count() + self.unchanged
    }

    /// True when nothing but unchanged files were seen
    pub fn is_clean(&self) -> bool {
        self.modified_count() == 0
    }
}

/// Immutable snapshot of every tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// On-disk format version
    pub format_version: u32,
    /// Free text from the command that created the state
    pub comment: String,
    /// When the tree was scanned
    pub timestamp: DateTime<Utc>,
    /// Hash mode used to build the state
    pub hash_mode: HashMode,
    /// Number of file states
    pub file_count: usize,
    /// Counters of the comparison that produced this state
    pub modification_counts: ModificationCounts,
    /// File states sorted by path
    pub file_states: Vec<FileState>,
    /// Files gone since the previous state, tagged `deleted`
    ///
    /// Kept apart from `file_states` so a state used as the previous one
    /// only ever offers files that exist.
    #[serde(default)]
    pub deleted_files: Vec<FileState>,
    /// SHA-256 over everything above
    pub state_hash: String,
}

impl State {
    /// Build a sealed state, sorting the files by path
    pub fn new(comment: impl Into<String>, hash_mode: HashMode, mut file_states: Vec<FileState>) -> Self {
        file_states.sort_by(|a, b| path_order(&a.path, &b.path));
        let mut state = Self {
            format_version: FORMAT_VERSION,
            comment: comment.into(),
            timestamp: Utc::now(),
            hash_mode,
            file_count: file_states.len(),
            modification_counts: ModificationCounts::default(),
            file_states,
            deleted_files: Vec::new(),
            state_hash: String::new(),
        };
        state.seal();
        state
    }

    /// Recompute `file_count` and `state_hash` after a mutation
    pub fn seal(&mut self) {
        self.file_count = self.file_states.len();
        self.state_hash = self.compute_state_hash();
    }

    /// Compute the integrity hash of this state
    pub fn compute_state_hash(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.format_version.to_le_bytes());
        hasher.update(&self.comment);
        hasher.update(self.timestamp.to_rfc3339());
        hasher.update(self.hash_mode.as_str());
        hasher.update((self.file_count as u64).to_le_bytes());

        if let Ok(counts) = serde_json::to_vec(&self.modification_counts) {
            hasher.update(&counts);
        }
        if let Ok(files) = serde_json::to_vec(&self.file_states) {
            hasher.update(&files);
        }
        if let Ok(deleted) = serde_json::to_vec(&self.deleted_files) {
            hasher.update(&deleted);
        }

        hex::encode(hasher.finalize())
    }

    /// Check that the stored hash matches the content
    pub fn verify_integrity(&self) -> bool {
        self.file_count == self.file_states.len() && self.compute_state_hash() == self.state_hash
    }

    /// Look up a file by relative path
    pub fn file(&self, path: &Path) -> Option<&FileState> {
        self.file_states
            .binary_search_by(|f| path_order(&f.path, path))
            .ok()
            .map(|idx| &self.file_states[idx])
    }

    /// Number of stored records carrying `modification`, deletions included
    pub fn count_tagged(&self, modification: Modification) -> usize {
        self.file_states
            .iter()
            .chain(&self.deleted_files)
            .filter(|f| f.modification == Some(modification))
            .count()
    }

    /// Summary line for `log`
    pub fn log_entry(&self, state_number: u32) -> LogEntry {
        LogEntry {
            state_number,
            comment: self.comment.clone(),
            timestamp: self.timestamp,
            hash_mode: self.hash_mode,
            file_count: self.file_count,
            modification_counts: self.modification_counts,
        }
    }
}

/// One line of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based state number
    pub state_number: u32,
    /// Comment of the state
    pub comment: String,
    /// When the state was scanned
    pub timestamp: DateTime<Utc>,
    /// Hash mode of the state
    pub hash_mode: HashMode,
    /// Number of files in the state
    pub file_count: usize,
    /// Counters of the comparison that produced the state
    pub modification_counts: ModificationCounts,
}

/// A file left out of a state because it could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// Repository settings, persisted as `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// On-disk format version
    pub format_version: u32,
    /// Version of snapsum that created the repository
    pub snapsum_version: String,
    /// When the repository was created
    pub created_at: DateTime<Utc>,
    /// Default and strongest allowed hash mode
    pub global_hash_mode: HashMode,
    /// How state files are compressed
    #[serde(default)]
    pub compression: CompressionStrategy,
    /// Extra ignore patterns (gitignore syntax, relative to the root)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Whether symbolic links are followed while walking
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Hashing threads, 0 means one per CPU
    #[serde(default)]
    pub parallel_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            snapsum_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            global_hash_mode: HashMode::default(),
            compression: CompressionStrategy::default(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel_workers: 0,
        }
    }
}

/// Per-command options
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Hash mode for this run, defaults to the repository's global mode
    pub hash_mode: Option<HashMode>,
    /// Comment attached to a committed state
    pub comment: String,
    /// Print per-file detail
    pub verbose: bool,
    /// Skip interactive prompts
    pub always_yes: bool,
    /// Remove duplicates after listing them
    pub remove_duplicates: bool,
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Predicate over relative paths, `true` keeps the file
pub type FileFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Size of the current item in bytes
    pub item_bytes: u64,
    /// Items processed so far
    pub processed: usize,
    /// Bytes processed so far
    pub bytes_processed: u64,
}
