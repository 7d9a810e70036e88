//! Duplicate detection and removal
//!
//! Files are grouped by length and digest. Zero-length files are left out:
//! they are all identical and removing them frees nothing. Sets are sorted
//! by wasted space, largest first, and the sort is stable so equal sets keep
//! path order.
//!
//! Choosing which copies to delete goes through [`SelectionPrompt`], so the
//! interactive, always-yes and scripted paths share the same code.

use crate::error::{Result, SnapsumError};
use crate::types::{path_order, FileState, HashMode, State};
use crate::utils::format_bytes;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Files sharing one content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    /// Members in path order, at least two
    pub files: Vec<FileState>,
}

impl DuplicateSet {
    /// Size of each member
    pub fn file_length(&self) -> u64 {
        self.files.first().map(|f| f.length).unwrap_or(0)
    }

    /// Bytes held by every member but one
    pub fn wasted_space(&self) -> u64 {
        (self.files.len().saturating_sub(1) as u64) * self.file_length()
    }
}

/// All duplicate sets of one state, plus removal accounting
#[derive(Debug, Clone)]
pub struct DuplicateResult {
    /// Hash mode of the analysed state
    pub hash_mode: HashMode,
    /// Sets ordered by descending wasted space
    pub sets: Vec<DuplicateSet>,
    /// Members beyond the first of every set
    pub duplicated_files_count: usize,
    /// Sum of the sets' wasted space
    pub total_wasted_space: u64,
    /// Files actually deleted
    pub files_removed: usize,
    /// Bytes actually freed
    pub space_freed: u64,
}

/// What [`DuplicateResult::manage`] should do
#[derive(Debug, Clone, Copy, Default)]
pub struct ManageOptions {
    /// List every set even without removal
    pub verbose: bool,
    /// Ask which files to delete and delete them
    pub remove: bool,
}

/// Decides which members of a set get deleted
pub trait SelectionPrompt {
    /// Return one flag per file, `true` meaning remove
    fn select(&mut self, files: &[FileState]) -> Result<Vec<bool>>;
}

/// Keep the first file of every set and remove the others
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

impl SelectionPrompt for AutoAccept {
    fn select(&mut self, files: &[FileState]) -> Result<Vec<bool>> {
        Ok(default_selection(files.len()))
    }
}

/// Ask on a line-based terminal which files to preserve
///
/// An answer without a valid token is asked again. When the input ends
/// before a valid answer, every file of the set is kept. Works over any
/// reader and writer so tests can script the answers.
#[derive(Debug)]
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    /// Prompt on `output`, read answers from `input`
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> SelectionPrompt for LinePrompt<R, W> {
    fn select(&mut self, files: &[FileState]) -> Result<Vec<bool>> {
        for (idx, file) in files.iter().enumerate() {
            writeln!(self.output, "  [{}] {}", idx + 1, file.path.display())?;
        }
        loop {
            write!(self.output, "  Preserve files [1 - {}, all or a]: ", files.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                writeln!(self.output, "  No answer, keeping every file of this set")?;
                return Ok(vec![false; files.len()]);
            }
            match parse_preserve_answer(&line, files.len()) {
                Some(selection) => return Ok(selection),
                None => writeln!(
                    self.output,
                    "  Invalid answer '{}', expected file numbers, all or a",
                    line.trim()
                )?,
            }
        }
    }
}

/// Remove everything but the first file
fn default_selection(count: usize) -> Vec<bool> {
    (0..count).map(|idx| idx > 0).collect()
}

/// Parse one answer line into removal flags
///
/// `a` or `all` preserves every file. Otherwise each 1-based index names a
/// file to preserve and every other file is removed. Tokens are separated by
/// commas or whitespace; invalid ones are ignored. Returns `None` when the
/// line holds no valid token.
pub fn parse_preserve_answer(line: &str, count: usize) -> Option<Vec<bool>> {
    let mut remove = vec![true; count];
    let mut valid = false;

    for token in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token == "a" || token == "all" {
            return Some(vec![false; count]);
        }
        if let Ok(index) = token.parse::<usize>() {
            if (1..=count).contains(&index) {
                remove[index - 1] = false;
                valid = true;
            }
        }
    }

    valid.then_some(remove)
}

fn plural(word: &str, count: u64) -> String {
    if count > 1 {
        format!("{}s", word)
    } else {
        word.to_string()
    }
}

/// Group the files of `state` by content
///
/// Fails with a usage error when the state carries no digests.
pub fn find_duplicates(state: &State) -> Result<DuplicateResult> {
    let mode = state.hash_mode;
    if !mode.is_hashing() {
        return Err(SnapsumError::usage(
            "Duplicate detection needs file hashes, it cannot run with hash mode 'none'",
        ));
    }

    let mut ordered: Vec<&FileState> = state.file_states.iter().collect();
    ordered.sort_by(|a, b| path_order(&a.path, &b.path));

    let mut group_of: HashMap<(u64, &str), usize> = HashMap::new();
    let mut groups: Vec<Vec<FileState>> = Vec::new();
    for file in ordered {
        if file.length == 0 {
            continue;
        }
        let Some(digest) = file.digest(mode) else {
            continue;
        };
        let idx = *group_of.entry((file.length, digest)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[idx].push(file.clone());
    }

    let mut sets: Vec<DuplicateSet> = groups
        .into_iter()
        .filter(|files| files.len() > 1)
        .map(|files| DuplicateSet { files })
        .collect();
    sets.sort_by(|a, b| b.wasted_space().cmp(&a.wasted_space()));

    let duplicated_files_count = sets.iter().map(|s| s.files.len() - 1).sum();
    let total_wasted_space = sets.iter().map(|s| s.wasted_space()).sum();
    debug!(
        "Found {} duplicate sets, {} duplicated files",
        sets.len(),
        duplicated_files_count
    );

    Ok(DuplicateResult {
        hash_mode: mode,
        sets,
        duplicated_files_count,
        total_wasted_space,
        files_removed: 0,
        space_freed: 0,
    })
}

impl DuplicateResult {
    /// True when no set was found
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Print the sets, optionally delete the unwanted copies, print a summary
    ///
    /// `root` is the directory the state's relative paths start from. A file
    /// that cannot be deleted is logged and stays counted as a duplicate.
    pub fn manage<P, W>(
        &mut self,
        root: &Path,
        options: ManageOptions,
        prompt: &mut P,
        out: &mut W,
    ) -> Result<()>
    where
        P: SelectionPrompt + ?Sized,
        W: Write,
    {
        if options.remove && self.hash_mode != HashMode::Full {
            return Err(SnapsumError::usage(format!(
                "Removing duplicates needs hash mode 'full', the state was built with '{}'",
                self.hash_mode
            )));
        }

        if options.verbose || options.remove {
            for idx in 0..self.sets.len() {
                self.manage_set(idx, root, options, prompt, out)?;
            }
        }

        self.write_summary(out)?;
        Ok(())
    }

    fn manage_set<P, W>(
        &mut self,
        idx: usize,
        root: &Path,
        options: ManageOptions,
        prompt: &mut P,
        out: &mut W,
    ) -> Result<()>
    where
        P: SelectionPrompt + ?Sized,
        W: Write,
    {
        let set = &self.sets[idx];
        let times = (set.files.len() - 1) as u64;
        writeln!(
            out,
            "- Duplicate set #{}: duplicated {} {}, {} each, {} of wasted space",
            idx + 1,
            times,
            plural("time", times),
            format_bytes(set.file_length()),
            format_bytes(set.wasted_space())
        )?;

        let selection = if options.remove {
            prompt.select(&set.files)?
        } else {
            vec![false; set.files.len()]
        };

        let mut removed = 0;
        let mut freed = 0;
        for (file, to_remove) in self.sets[idx].files.iter_mut().zip(selection) {
            file.to_remove = to_remove && remove_file(root, file);
            if file.to_remove {
                removed += 1;
                freed += file.length;
            }
            let action = if file.to_remove { "[-]" } else { "   " };
            writeln!(out, "  {} {}", action, file.path.display())?;
        }
        writeln!(out)?;

        self.files_removed += removed;
        self.space_freed += freed;
        Ok(())
    }

    fn write_summary<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.files_removed == 0 {
            if self.duplicated_files_count > 0 {
                let count = self.duplicated_files_count as u64;
                writeln!(
                    out,
                    "{} duplicate {}, {} of total wasted space",
                    count,
                    plural("file", count),
                    format_bytes(self.total_wasted_space)
                )?;
            } else {
                writeln!(out, "No duplicate file found")?;
            }
            return Ok(());
        }

        writeln!(
            out,
            "Removed {} files and freed {}",
            self.files_removed,
            format_bytes(self.space_freed)
        )?;
        let remaining = self.duplicated_files_count.saturating_sub(self.files_removed) as u64;
        if remaining > 0 {
            writeln!(
                out,
                "Still have {} duplicate {}, {} of total wasted space",
                remaining,
                plural("file", remaining),
                format_bytes(self.total_wasted_space.saturating_sub(self.space_freed))
            )?;
        } else {
            writeln!(out, "No duplicate file remains")?;
        }
        Ok(())
    }
}

fn remove_file(root: &Path, file: &FileState) -> bool {
    match fs::remove_file(root.join(&file.path)) {
        Ok(()) => {
            info!("Removed duplicate {:?}", file.path);
            true
        }
        Err(e) => {
            warn!("Failed to remove duplicate {:?}: {}", file.path, e);
            false
        }
    }
}
