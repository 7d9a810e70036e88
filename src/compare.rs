//! Classification of every file between two states
//!
//! The comparison is a pure function of its two inputs. Files are matched
//! through index maps keyed by path and by content key, and a previous file
//! can be consumed by at most one rename. Rules are applied in priority
//! order, the first match wins:
//!
//! 1. same path, nothing differs: unchanged
//! 2. same path: content, date or attributes modified
//! 3. new path whose content equals an earlier new path: duplicated
//! 4. new path whose content equals an unchanged file elsewhere: copied
//! 5. new path whose content equals a vanished file: renamed
//! 6. any other new path: added
//! 7. vanished path not consumed by a rename: deleted
//!
//! "Content" is the digest at the weaker of the two states' hash modes. With
//! no hashing it degrades to length plus modification time.

use crate::types::{path_order, FileState, HashMode, Modification, ModificationCounts, State};
use crate::utils::common_prefix_len;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// One modified file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// The current file, or the old record for a deletion
    pub file: FileState,
    /// What it was matched against: the old record for in-place changes and
    /// renames, the source file for copies and duplicates
    pub previous: Option<FileState>,
}

impl Difference {
    /// Category of this difference
    pub fn modification(&self) -> Option<Modification> {
        self.file.modification
    }
}

/// Outcome of comparing a fresh state against the last stored one
#[derive(Debug, Clone)]
pub struct CompareResult {
    /// Number of the state compared against, if any
    pub previous_state_number: Option<u32>,
    /// Number under which `current` was stored, set by a commit
    pub state_number: Option<u32>,
    /// Mode the two states were compared at
    pub hash_mode: HashMode,
    /// The new state with modifications assigned and counters filled in
    pub current: State,
    /// Modified files in path order
    pub differences: Vec<Difference>,
    /// Counters per category, unchanged included
    pub counts: ModificationCounts,
}

impl CompareResult {
    /// Number of modified files
    pub fn modified_count(&self) -> usize {
        self.counts.modified_count()
    }

    /// True when the tree matches the previous state
    pub fn is_clean(&self) -> bool {
        self.counts.is_clean()
    }
}

/// What two files must share to be considered the same content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ContentKey<'a> {
    Digest(u64, &'a str),
    Metadata(u64, DateTime<Utc>),
}

fn content_key(file: &FileState, mode: HashMode) -> Option<ContentKey<'_>> {
    if mode.is_hashing() {
        file.digest(mode).map(|digest| ContentKey::Digest(file.length, digest))
    } else {
        Some(ContentKey::Metadata(file.length, file.last_modified))
    }
}

/// Same path in both states
fn classify_in_place(previous: &FileState, current: &FileState, mode: HashMode) -> Option<Modification> {
    if previous.length != current.length
        || (mode.is_hashing() && previous.digest(mode) != current.digest(mode))
    {
        Some(Modification::ContentModified)
    } else if previous.last_modified != current.last_modified {
        Some(Modification::DateModified)
    } else if previous.attributes != current.attributes {
        Some(Modification::AttributesModified)
    } else {
        None
    }
}

/// Pick the vanished file a new path was most likely renamed from
///
/// The longest shared directory prefix wins, then the smallest path.
fn rename_source(
    candidates: Option<&Vec<usize>>,
    consumed: &HashSet<usize>,
    previous: &[FileState],
    new_path: &Path,
) -> Option<usize> {
    candidates?
        .iter()
        .copied()
        .filter(|idx| !consumed.contains(idx))
        .min_by(|&a, &b| {
            let pa = &previous[a].path;
            let pb = &previous[b].path;
            common_prefix_len(pb, new_path)
                .cmp(&common_prefix_len(pa, new_path))
                .then_with(|| path_order(pa, pb))
        })
}

/// Compare `current` against `previous`
///
/// Without a previous state every file is added.
pub fn compare(previous: Option<&State>, mut current: State) -> CompareResult {
    current.file_states.sort_by(|a, b| path_order(&a.path, &b.path));

    let mode = previous
        .map(|p| p.hash_mode.min(current.hash_mode))
        .unwrap_or(current.hash_mode);
    let previous_files: &[FileState] = previous.map(|p| p.file_states.as_slice()).unwrap_or(&[]);

    let previous_by_path: HashMap<&Path, usize> = previous_files
        .iter()
        .enumerate()
        .map(|(idx, f)| (f.path.as_path(), idx))
        .collect();
    let current_paths: HashSet<&Path> = current.file_states.iter().map(|f| f.path.as_path()).collect();

    let files = &current.file_states;
    let mut modifications: Vec<Option<Modification>> = vec![None; files.len()];
    let mut sources: Vec<Option<FileState>> = vec![None; files.len()];

    // Pass 1: paths present in both states
    let mut new_paths = Vec::new();
    let mut unchanged_by_key: HashMap<ContentKey<'_>, usize> = HashMap::new();
    for (idx, file) in files.iter().enumerate() {
        match previous_by_path.get(file.path.as_path()) {
            Some(&prev_idx) => {
                let old = &previous_files[prev_idx];
                modifications[idx] = classify_in_place(old, file, mode);
                match modifications[idx] {
                    None => {
                        if let Some(key) = content_key(file, mode) {
                            // Files are in path order, so the first entry is the smallest path
                            unchanged_by_key.entry(key).or_insert(idx);
                        }
                    }
                    Some(_) => sources[idx] = Some(old.clone()),
                }
            }
            None => new_paths.push(idx),
        }
    }

    // Vanished files, the only rename sources
    let vanished: Vec<usize> = previous_files
        .iter()
        .enumerate()
        .filter(|(_, old)| !current_paths.contains(old.path.as_path()))
        .map(|(idx, _)| idx)
        .collect();
    let mut vanished_by_key: HashMap<ContentKey<'_>, Vec<usize>> = HashMap::new();
    for &idx in &vanished {
        if let Some(key) = content_key(&previous_files[idx], mode) {
            vanished_by_key.entry(key).or_default().push(idx);
        }
    }

    // Pass 2: new paths, in path order
    let mut first_new_by_key: HashMap<ContentKey<'_>, usize> = HashMap::new();
    let mut consumed: HashSet<usize> = HashSet::new();
    for idx in new_paths {
        let file = &files[idx];
        let Some(key) = content_key(file, mode) else {
            modifications[idx] = Some(Modification::Added);
            continue;
        };

        if let Some(&first) = first_new_by_key.get(&key) {
            modifications[idx] = Some(Modification::Duplicated);
            sources[idx] = Some(files[first].clone());
            continue;
        }
        first_new_by_key.insert(key.clone(), idx);

        if let Some(&source) = unchanged_by_key.get(&key) {
            modifications[idx] = Some(Modification::Copied);
            sources[idx] = Some(files[source].clone());
        } else if let Some(old) =
            rename_source(vanished_by_key.get(&key), &consumed, previous_files, &file.path)
        {
            consumed.insert(old);
            modifications[idx] = Some(Modification::Renamed);
            sources[idx] = Some(previous_files[old].clone());
        } else {
            modifications[idx] = Some(Modification::Added);
        }
    }

    let mut counts = ModificationCounts::default();
    let mut differences = Vec::new();
    for ((file, modification), source) in current
        .file_states
        .iter_mut()
        .zip(modifications)
        .zip(sources)
    {
        file.modification = modification;
        counts.record(modification);
        if modification.is_some() {
            differences.push(Difference {
                file: file.clone(),
                previous: source,
            });
        }
    }

    let mut deleted_files = Vec::new();
    for idx in vanished {
        if !consumed.contains(&idx) {
            counts.record(Some(Modification::Deleted));
            let mut file = previous_files[idx].clone();
            file.modification = Some(Modification::Deleted);
            deleted_files.push(file.clone());
            differences.push(Difference { file, previous: None });
        }
    }
    deleted_files.sort_by(|a, b| path_order(&a.path, &b.path));
    differences.sort_by(|a, b| path_order(&a.file.path, &b.file.path));

    current.modification_counts = counts;
    current.deleted_files = deleted_files;
    current.seal();

    debug!(
        "Compared {} files against {} at {}: {} modified",
        current.file_count,
        previous_files.len(),
        mode,
        counts.modified_count()
    );

    CompareResult {
        previous_state_number: None,
        state_number: None,
        hash_mode: mode,
        current,
        differences,
        counts,
    }
}
