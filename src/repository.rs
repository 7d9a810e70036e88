//! Repository facade tying generation, comparison and storage together
//!
//! A repository is a directory tree with a `.snapsum` directory at its root.
//! Every command walks the tree afresh; nothing but the settings and the
//! numbered states is kept between runs.
//!
//! A repository found from a subdirectory is scoped to that subtree:
//! `status`, `find_duplicates` and `ignored_files` only look inside it, and
//! `commit` stores the subtree's files next to the last state's files from
//! everywhere else.

use crate::compare::{self, CompareResult};
use crate::compression::{CompressionEngine, CompressionStrategy};
use crate::duplicates::{self, DuplicateResult};
use crate::error::{Result, SnapsumError};
use crate::generator::{StateGenerator, REPOSITORY_DIR};
use crate::storage::{self, StateStore, STATES_DIR};
use crate::types::{
    path_order, CommandOptions, FileState, HashMode, LogEntry, ProgressCallback, Settings, State,
    FORMAT_VERSION,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// An opened snapsum repository
pub struct Repository {
    root_path: PathBuf,
    repository_dir: PathBuf,
    settings: Settings,
    store: StateStore,
    scope: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root_path", &self.root_path)
            .field("settings", &self.settings)
            .field("store", &self.store)
            .field("scope", &self.scope)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Repository {
    /// Open the repository rooted at `root_path`
    ///
    /// Fails with [`SnapsumError::RepositoryNotFound`] when `root_path` has
    /// no `.snapsum` directory.
    #[instrument]
    pub fn open(root_path: &Path) -> Result<Self> {
        let root_path = root_path
            .canonicalize()
            .map_err(|_| SnapsumError::RepositoryNotFound(root_path.to_path_buf()))?;
        let repository_dir = root_path.join(REPOSITORY_DIR);
        if !repository_dir.join(storage::SETTINGS_FILE).is_file() {
            return Err(SnapsumError::RepositoryNotFound(root_path));
        }

        let settings = storage::load_settings(&repository_dir)?;
        if settings.format_version > FORMAT_VERSION {
            return Err(SnapsumError::internal(format!(
                "Repository format version {} is newer than the supported version {}",
                settings.format_version, FORMAT_VERSION
            )));
        }

        let store = StateStore::open(
            repository_dir.join(STATES_DIR),
            CompressionEngine::new(settings.compression),
        )?;
        debug!("Opened repository at {:?}", root_path);

        Ok(Self {
            root_path,
            repository_dir,
            settings,
            store,
            scope: None,
            progress: None,
        })
    }

    /// Open the repository containing `path`
    ///
    /// `path` and then each of its parents is tried. When the repository
    /// root lies above `path`, the repository is scoped to that subtree.
    #[instrument]
    pub fn discover(path: &Path) -> Result<Self> {
        let start = path
            .canonicalize()
            .map_err(|_| SnapsumError::RepositoryNotFound(path.to_path_buf()))?;

        let root = start
            .ancestors()
            .find(|dir| dir.join(REPOSITORY_DIR).join(storage::SETTINGS_FILE).is_file())
            .ok_or_else(|| SnapsumError::RepositoryNotFound(start.clone()))?;

        let mut repository = Self::open(root)?;
        let scope = start.strip_prefix(root).unwrap_or(Path::new(""));
        if !scope.as_os_str().is_empty() {
            debug!("Scoped to {:?}", scope);
            repository.scope = Some(scope.to_path_buf());
        }
        Ok(repository)
    }

    /// Report hashing progress to `progress`
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Root of the tracked tree
    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// The `.snapsum` directory
    pub fn repository_dir(&self) -> &Path {
        &self.repository_dir
    }

    /// Subtree the commands are limited to, relative to the root
    pub fn scope(&self) -> Option<&Path> {
        self.scope.as_deref()
    }

    /// Settings read at open time
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Compare the tree against the last state without storing anything
    #[instrument(skip(self))]
    pub fn status(&self, options: &CommandOptions) -> Result<CompareResult> {
        let hash_mode = self.resolve_hash_mode(options.hash_mode)?;
        info!("Comparing {:?} with the last state", self.root_path);
        self.compare_tree(hash_mode, &options.comment)
            .map(|(result, _)| result)
    }

    /// Compare the tree against the last state and store it when it differs
    ///
    /// A tree with no modification stores nothing, so `state_number` stays
    /// `None` on the result.
    #[instrument(skip(self))]
    pub fn commit(&self, options: &CommandOptions) -> Result<CompareResult> {
        let hash_mode = self.resolve_hash_mode(options.hash_mode)?;
        info!("Committing {:?}", self.root_path);

        let (mut result, last) = self.compare_tree(hash_mode, &options.comment)?;
        if result.modified_count() > 0 {
            if let (Some(scope), Some(last)) = (&self.scope, &last) {
                merge_outside_scope(&mut result, last, scope);
            }
            let number = self.store.append(&result.current)?;
            result.state_number = Some(number);
            info!(
                "Stored state {} with {} modified files",
                number,
                result.modified_count()
            );
        } else {
            debug!("Nothing modified, no state stored");
        }
        Ok(result)
    }

    /// Summaries of every stored state, oldest first
    pub fn log(&self) -> Result<Vec<LogEntry>> {
        self.store.enumerate()
    }

    /// Drop the last state and return its number
    ///
    /// State 1 is the baseline written by init and is never removed.
    #[instrument(skip(self))]
    pub fn rollback(&self) -> Result<Option<u32>> {
        if self.store.last_state_number() <= 1 {
            info!("Only the initial state remains, nothing to roll back");
            return Ok(None);
        }
        self.store.rollback_last()
    }

    /// Find duplicate files in the current tree
    #[instrument(skip(self))]
    pub fn find_duplicates(&self, options: &CommandOptions) -> Result<DuplicateResult> {
        let hash_mode = self.resolve_hash_mode(options.hash_mode)?;
        if !hash_mode.is_hashing() {
            return Err(SnapsumError::usage(
                "Duplicate detection needs a hash mode other than 'none'",
            ));
        }

        let generation = self
            .generator(hash_mode)
            .generate(&options.comment, self.progress.clone())?;
        let result = duplicates::find_duplicates(&generation.state)?;
        info!(
            "Found {} duplicate sets, {} bytes wasted",
            result.sets.len(),
            result.total_wasted_space
        );
        Ok(result)
    }

    /// Files the ignore rules leave out, relative to the root
    pub fn ignored_files(&self) -> Result<Vec<PathBuf>> {
        self.generator(self.settings.global_hash_mode).ignored_files()
    }

    /// Pick the hash mode for one command
    ///
    /// A mode stronger than the repository's global mode is refused: the
    /// stored states would not carry the digests to compare against.
    fn resolve_hash_mode(&self, requested: Option<HashMode>) -> Result<HashMode> {
        let global = self.settings.global_hash_mode;
        match requested {
            None => Ok(global),
            Some(mode) if mode > global => Err(SnapsumError::usage(format!(
                "Hash mode '{}' is stronger than the repository mode '{}'",
                mode, global
            ))),
            Some(mode) => Ok(mode),
        }
    }

    fn generator(&self, hash_mode: HashMode) -> StateGenerator {
        let generator = StateGenerator::new(&self.root_path)
            .with_hash_mode(hash_mode)
            .with_ignore_patterns(self.settings.ignore_patterns.clone())
            .with_follow_symlinks(self.settings.follow_symlinks)
            .with_parallel_workers(self.settings.parallel_workers);
        match self.scope {
            Some(ref scope) => generator.with_scope(scope.clone()),
            None => generator,
        }
    }

    /// Compare the tree, or the scoped subtree, with the last state
    ///
    /// Also returns the whole last state for a commit to merge with.
    fn compare_tree(&self, hash_mode: HashMode, comment: &str) -> Result<(CompareResult, Option<State>)> {
        let generation = self
            .generator(hash_mode)
            .generate(comment, self.progress.clone())?;
        if !generation.skipped.is_empty() {
            warn!("{} unreadable files left out", generation.skipped.len());
        }

        let last = self.store.load_last()?;
        let scoped = match (&last, &self.scope) {
            (Some((_, state)), Some(scope)) => Some(restrict_to_scope(state, scope)),
            _ => None,
        };
        let previous = scoped.as_ref().or(last.as_ref().map(|(_, state)| state));
        let mut result = compare::compare(previous, generation.state);
        result.previous_state_number = last.as_ref().map(|(number, _)| *number);
        Ok((result, last.map(|(_, state)| state)))
    }
}

/// The part of `state` inside `scope`
fn restrict_to_scope(state: &State, scope: &Path) -> State {
    let mut scoped = state.clone();
    scoped.file_states.retain(|f| f.path.starts_with(scope));
    scoped.deleted_files.clear();
    scoped.seal();
    scoped
}

/// Carry the files outside `scope` over from `last`, as unchanged files
///
/// The stored state keeps the weaker of the two hash modes since the carried
/// files only hold the digests `last` was built with.
fn merge_outside_scope(result: &mut CompareResult, last: &State, scope: &Path) {
    let outside: Vec<FileState> = last
        .file_states
        .iter()
        .filter(|f| !f.path.starts_with(scope))
        .map(|f| FileState {
            modification: None,
            ..f.clone()
        })
        .collect();
    debug!("Carrying {} files from outside {:?}", outside.len(), scope);

    result.counts.unchanged += outside.len();
    let current = &mut result.current;
    current.file_states.extend(outside);
    current.file_states.sort_by(|a, b| path_order(&a.path, &b.path));
    current.hash_mode = current.hash_mode.min(last.hash_mode);
    current.modification_counts = result.counts;
    current.seal();
}

/// Options for creating a repository
///
/// ```rust,no_run
/// use snapsum::{HashMode, RepositoryBuilder};
///
/// # fn main() -> snapsum::Result<()> {
/// let (repository, initial) = RepositoryBuilder::new()
///     .hash_mode(HashMode::MediumBlock)
///     .ignore_patterns(vec!["*.tmp".to_string()])
///     .init("/data/photos", "Initial state")?;
/// println!("{} files in state 1", initial.current.file_count);
/// # let _ = repository;
/// # Ok(())
/// # }
/// ```
pub struct RepositoryBuilder {
    hash_mode: HashMode,
    compression: CompressionStrategy,
    ignore_patterns: Vec<String>,
    follow_symlinks: bool,
    parallel_workers: usize,
    progress: Option<ProgressCallback>,
}

impl RepositoryBuilder {
    /// Defaults: `full` hashing, fast compression, one worker per CPU
    pub fn new() -> Self {
        Self {
            hash_mode: HashMode::default(),
            compression: CompressionStrategy::default(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            parallel_workers: 0,
            progress: None,
        }
    }

    /// Global hash mode, also the strongest mode later commands may use
    pub fn hash_mode(mut self, mode: HashMode) -> Self {
        self.hash_mode = mode;
        self
    }

    /// Compression of the state files
    pub fn compression(mut self, strategy: CompressionStrategy) -> Self {
        self.compression = strategy;
        self
    }

    /// Repository-wide ignore patterns in gitignore syntax
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Follow symbolic links while walking
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Hashing threads, 0 for one per CPU
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers;
        self
    }

    /// Report hashing progress of the initial state
    pub fn progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Create the repository and store state 1
    ///
    /// Returns the opened repository and the initial comparison, where every
    /// file is `added`.
    #[instrument(skip_all)]
    pub fn init(self, root_path: impl AsRef<Path>, comment: &str) -> Result<(Repository, CompareResult)> {
        let root_path = root_path.as_ref();
        if !root_path.is_dir() {
            return Err(SnapsumError::usage(format!(
                "{} is not a directory",
                root_path.display()
            )));
        }
        let root_path = root_path.canonicalize()?;
        let repository_dir = root_path.join(REPOSITORY_DIR);
        if repository_dir.exists() {
            return Err(SnapsumError::RepositoryAlreadyExists(root_path));
        }

        info!("Initializing repository at {:?}", root_path);
        let settings = Settings {
            global_hash_mode: self.hash_mode,
            compression: self.compression,
            ignore_patterns: self.ignore_patterns,
            follow_symlinks: self.follow_symlinks,
            parallel_workers: self.parallel_workers,
            ..Default::default()
        };

        // Nothing is written until the tree has been hashed
        let generation = StateGenerator::new(&root_path)
            .with_hash_mode(settings.global_hash_mode)
            .with_ignore_patterns(settings.ignore_patterns.clone())
            .with_follow_symlinks(settings.follow_symlinks)
            .with_parallel_workers(settings.parallel_workers)
            .generate(comment, self.progress.clone())?;
        let mut result = compare::compare(None, generation.state);

        fs::create_dir_all(&repository_dir)?;
        storage::save_settings(&repository_dir, &settings)?;
        let store = StateStore::create(
            repository_dir.join(STATES_DIR),
            CompressionEngine::new(settings.compression),
        )?;
        result.state_number = Some(store.append(&result.current)?);
        info!("Initial state holds {} files", result.current.file_count);

        let repository = Repository {
            root_path,
            repository_dir,
            settings,
            store,
            scope: None,
            progress: self.progress,
        };
        Ok((repository, result))
    }
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
