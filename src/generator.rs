//! Directory walking and state generation
//!
//! The walk itself is sequential and cheap: it only collects the regular
//! files that survive the ignore rules. Hashing is the expensive part and
//! runs on a bounded rayon pool. The resulting state is sorted by path, so
//! its content never depends on which worker finished first.
//!
//! Ignore rules come from three places:
//! - the repository directory, always excluded
//! - `.snapsumignore` files (gitignore syntax, inherited by subdirectories)
//! - the repository-wide patterns from the settings

use crate::error::{Result, SnapsumError};
use crate::hashing;
use crate::types::{path_order, FileFilter, FileState, HashMode, ProgressCallback, ProgressInfo, SkippedFile, State};
use crate::utils;
use globset::GlobBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};

/// Name of the repository directory at the root of a tracked tree
pub const REPOSITORY_DIR: &str = ".snapsum";

/// Name of the per-directory ignore file
pub const IGNORE_FILE_NAME: &str = ".snapsumignore";

/// Output of one generation run
#[derive(Debug, Clone)]
pub struct Generation {
    /// The freshly built state, sorted by path
    pub state: State,
    /// Files that could not be read and were left out
    pub skipped: Vec<SkippedFile>,
}

/// A regular file found by the walk
struct Candidate {
    absolute: PathBuf,
    relative: PathBuf,
}

/// Builds [`State`]s from a directory tree
///
/// ```rust,no_run
/// use snapsum::{HashMode, StateGenerator};
///
/// # fn main() -> snapsum::Result<()> {
/// let generation = StateGenerator::new("/data/photos")
///     .with_hash_mode(HashMode::MediumBlock)
///     .with_ignore_patterns(vec!["*.tmp".to_string()])
///     .generate("nightly", None)?;
/// println!("{} files", generation.state.file_count);
/// # Ok(())
/// # }
/// ```
pub struct StateGenerator {
    root_path: PathBuf,
    hash_mode: HashMode,
    ignore_patterns: Vec<String>,
    follow_symlinks: bool,
    parallel_workers: usize,
    scope: Option<PathBuf>,
    filter: Option<FileFilter>,
}

impl std::fmt::Debug for StateGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGenerator")
            .field("root_path", &self.root_path)
            .field("hash_mode", &self.hash_mode)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("follow_symlinks", &self.follow_symlinks)
            .field("parallel_workers", &self.parallel_workers)
            .field("scope", &self.scope)
            .field("filter", &self.filter.as_ref().map(|_| "Fn"))
            .finish()
    }
}

impl StateGenerator {
    /// Create a generator with default settings
    ///
    /// Full hashing, no extra patterns, symlinks skipped, one hashing
    /// thread per CPU.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            hash_mode: HashMode::default(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel_workers: num_cpus::get(),
            scope: None,
            filter: None,
        }
    }

    /// Set the hash mode
    pub fn with_hash_mode(mut self, mode: HashMode) -> Self {
        self.hash_mode = mode;
        self
    }

    /// Set extra ignore patterns (gitignore syntax, relative to the root)
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Follow symbolic links instead of skipping them
    ///
    /// Links that lead back to one of their ancestors are reported by the
    /// walker and skipped, so a cycle never loops.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set the number of hashing threads, 0 means one per CPU
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = if workers == 0 { num_cpus::get() } else { workers };
        self
    }

    /// Only walk the subtree at `scope`, a path relative to the root
    ///
    /// Ignore files of the directories above the subtree still apply. An
    /// empty path means the whole tree.
    pub fn with_scope(mut self, scope: impl Into<PathBuf>) -> Self {
        let scope = scope.into();
        self.scope = (!scope.as_os_str().is_empty()).then_some(scope);
        self
    }

    /// Exclude every relative path for which `filter` returns false
    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Root of the walked tree
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Walk the tree and build a state
    ///
    /// Unreadable files never abort the run: they are logged and returned in
    /// [`Generation::skipped`].
    #[instrument(skip(self, progress), fields(root = ?self.root_path, mode = %self.hash_mode))]
    pub fn generate(&self, comment: &str, progress: Option<ProgressCallback>) -> Result<Generation> {
        let start = Instant::now();
        let (candidates, mut skipped) = self.collect_candidates(true)?;
        debug!("Walk found {} files in {:?}", candidates.len(), start.elapsed());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallel_workers)
            .build()
            .map_err(|e| SnapsumError::internal(format!("Failed to build thread pool: {}", e)))?;

        let processed = AtomicUsize::new(0);
        let bytes_processed = AtomicU64::new(0);
        let unreadable = Mutex::new(Vec::new());

        let file_states: Vec<FileState> = pool.install(|| {
            candidates
                .par_iter()
                .filter_map(|candidate| match self.file_state(candidate) {
                    Ok(file_state) => {
                        let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        let bytes = bytes_processed
                            .fetch_add(file_state.length, Ordering::Relaxed)
                            + file_state.length;
                        if let Some(ref callback) = progress {
                            callback(ProgressInfo {
                                operation: "Hashing files".to_string(),
                                current_item: Some(file_state.path.to_string_lossy().to_string()),
                                item_bytes: file_state.length,
                                processed: count,
                                bytes_processed: bytes,
                            });
                        }
                        Some(file_state)
                    }
                    Err(e) => {
                        warn!("Skipping unreadable file {:?}: {}", candidate.relative, e);
                        unreadable.lock().push(SkippedFile {
                            path: candidate.relative.clone(),
                            reason: e.to_string(),
                        });
                        None
                    }
                })
                .collect()
        });

        skipped.extend(unreadable.into_inner());
        skipped.sort_by(|a, b| path_order(&a.path, &b.path));

        let state = State::new(comment, self.hash_mode, file_states);
        debug!(
            "Generated state with {} files ({} bytes, {} skipped) in {:?}",
            state.file_count,
            bytes_processed.load(Ordering::Relaxed),
            skipped.len(),
            start.elapsed()
        );

        Ok(Generation { state, skipped })
    }

    /// Regular files excluded by ignore rules or the filter, in path order
    pub fn ignored_files(&self) -> Result<Vec<PathBuf>> {
        let (everything, _) = self.collect_candidates(false)?;
        let (kept, _) = self.collect_candidates(true)?;

        let kept: HashSet<PathBuf> = kept.into_iter().map(|c| c.relative).collect();
        let mut ignored: Vec<PathBuf> = everything
            .into_iter()
            .map(|c| c.relative)
            .filter(|path| !kept.contains(path))
            .collect();
        ignored.sort_by(|a, b| path_order(a, b));
        Ok(ignored)
    }

    fn file_state(&self, candidate: &Candidate) -> Result<FileState> {
        let metadata = utils::get_file_metadata(&candidate.absolute, self.follow_symlinks)?;
        // The entry may have been replaced since the walk saw it
        if !metadata.is_file {
            return Err(SnapsumError::internal(format!(
                "{} is no longer a regular file",
                candidate.relative.display()
            )));
        }
        let file_hash = hashing::hash_file(&candidate.absolute, self.hash_mode)?;
        trace!(
            "{} {:?} ({} bytes)",
            hashing::progress_char(metadata.length as i64),
            candidate.relative,
            metadata.length
        );

        Ok(FileState {
            path: candidate.relative.clone(),
            length: metadata.length,
            last_modified: metadata.modified,
            attributes: metadata.attributes,
            file_hash,
            modification: None,
            to_remove: false,
        })
    }

    /// Walk the tree depth-first in file name order
    ///
    /// With `apply_ignores` unset only the repository directory and the scope
    /// limit the walk. Entries the walker cannot read are returned as skipped
    /// files; only an unreadable root aborts.
    fn collect_candidates(&self, apply_ignores: bool) -> Result<(Vec<Candidate>, Vec<SkippedFile>)> {
        let mut walker_builder = WalkBuilder::new(&self.root_path);
        walker_builder
            .standard_filters(false)
            .parents(false)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name(|a, b| a.cmp(b));

        // `!` marks an override as an exclusion
        let mut override_builder = OverrideBuilder::new(&self.root_path);
        override_builder
            .add(&format!("!/{}", REPOSITORY_DIR))?
            .add(&format!("!/{}/**", REPOSITORY_DIR))?;
        walker_builder.overrides(override_builder.build()?);

        let patterns = if apply_ignores {
            walker_builder.add_custom_ignore_filename(IGNORE_FILE_NAME);
            Some(self.pattern_matcher()?)
        } else {
            None
        };
        if patterns.is_some() || self.scope.is_some() {
            let root = self.root_path.clone();
            let scope = self.scope.clone();
            walker_builder.filter_entry(move |entry| {
                let relative = match entry.path().strip_prefix(&root) {
                    Ok(relative) if !relative.as_os_str().is_empty() => relative,
                    _ => return true,
                };
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                if let Some(ref scope) = scope {
                    // Directories above the scope are entered, nothing beside it
                    let inside = relative.starts_with(scope) || (is_dir && scope.starts_with(relative));
                    if !inside {
                        return false;
                    }
                }
                patterns
                    .as_ref()
                    .map(|p| !p.matched(relative, is_dir).is_ignore())
                    .unwrap_or(true)
            });
        }

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for entry in walker_builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    match walk_error_path(&e) {
                        Some(path) => {
                            let relative = utils::make_relative(path, &self.root_path)
                                .unwrap_or_else(|_| path.to_path_buf());
                            if relative.as_os_str().is_empty() {
                                return Err(e.into());
                            }
                            warn!("Skipping {:?}: {}", relative, e);
                            skipped.push(SkippedFile {
                                path: relative,
                                reason: e.to_string(),
                            });
                        }
                        None => warn!("Walk error: {}", e),
                    }
                    continue;
                }
            };

            let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
            if !is_file {
                if entry.path_is_symlink() && !self.follow_symlinks {
                    trace!("Skipping symbolic link {:?}", entry.path());
                }
                continue;
            }
            if entry.file_name() == IGNORE_FILE_NAME {
                continue;
            }

            let relative = utils::make_relative(entry.path(), &self.root_path)?;
            if relative.to_str().is_none() {
                warn!("Skipping non UTF-8 path {:?}", relative);
                skipped.push(SkippedFile {
                    path: relative,
                    reason: "path is not valid UTF-8".to_string(),
                });
                continue;
            }
            if apply_ignores {
                if let Some(ref filter) = self.filter {
                    if !filter(&relative) {
                        continue;
                    }
                }
            }

            candidates.push(Candidate {
                absolute: entry.into_path(),
                relative,
            });
        }

        Ok((candidates, skipped))
    }

    fn pattern_matcher(&self) -> Result<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root_path);
        for pattern in &self.ignore_patterns {
            validate_pattern(pattern)?;
            builder
                .add_line(None, pattern)
                .map_err(|e| SnapsumError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        }
        builder
            .build()
            .map_err(|e| SnapsumError::InvalidPattern(e.to_string()))
    }
}

/// Reject a settings pattern whose glob does not parse
///
/// `GitignoreBuilder` takes malformed globs such as `a[` without complaint
/// and never matches them.
fn validate_pattern(pattern: &str) -> Result<()> {
    let line = pattern.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(());
    }
    let glob = line.strip_prefix('!').unwrap_or(line);
    let glob = glob.trim_start_matches('/').trim_end_matches('/');
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map(|_| ())
        .map_err(|e| SnapsumError::InvalidPattern(format!("{}: {}", pattern, e.kind())))
}

/// Entry an I/O or loop error of the walker is about
fn walk_error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, err } if err.is_io() => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } => walk_error_path(err),
        ignore::Error::Loop { child, .. } => Some(child.as_path()),
        _ => None,
    }
}
