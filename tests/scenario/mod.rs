//! End-to-end scenarios driving a repository through init, modifications,
//! commits and rollbacks under every hash mode.

use ::snapsum::*;
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Base of the timestamps given to the initial files
const BASE_TIME: i64 = 1_600_000_000;

/// A tree of ten files with distinct lengths and a shared mtime
pub struct ScenarioHarness {
    pub temp_dir: TempDir,
    pub repository: Repository,
}

impl ScenarioHarness {
    pub fn new(hash_mode: HashMode) -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        for i in 1..=10 {
            let path = temp_dir.path().join(format!("file{:02}", i));
            fs::write(&path, initial_content(i))?;
            set_mtime(&path, BASE_TIME)?;
        }

        let (repository, initial) = RepositoryBuilder::new()
            .hash_mode(hash_mode)
            .init(temp_dir.path(), "Initial state")?;
        assert_eq!(initial.counts.added, 10);

        Ok(Self {
            temp_dir,
            repository,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Apply one modification of every kind
    pub fn modify_everything(&self) -> anyhow::Result<()> {
        let root = self.root();

        fs::create_dir_all(root.join("dir01"))?;
        fs::rename(root.join("file01"), root.join("dir01/file01"))?;

        set_mtime(&root.join("file02"), BASE_TIME + 100)?;

        fs::copy(root.join("file03"), root.join("file03.dup1"))?;
        set_mtime(&root.join("file03.dup1"), BASE_TIME + 200)?;
        fs::copy(root.join("file03"), root.join("file03.dup2"))?;
        set_mtime(&root.join("file03.dup2"), BASE_TIME + 300)?;

        fs::write(root.join("file04"), "foo")?;
        set_mtime(&root.join("file04"), BASE_TIME + 400)?;

        fs::copy(root.join("file05"), root.join("file11"))?;
        set_mtime(&root.join("file11"), BASE_TIME + 500)?;
        fs::write(root.join("file05"), "bar")?;
        set_mtime(&root.join("file05"), BASE_TIME + 600)?;

        fs::remove_file(root.join("file06"))?;

        fs::copy(root.join("file07"), root.join("file07.dup1"))?;
        set_mtime(&root.join("file07.dup1"), BASE_TIME + 700)?;

        fs::write(root.join("file12"), "brand new file twelve")?;
        set_mtime(&root.join("file12"), BASE_TIME + 800)?;
        Ok(())
    }
}

/// Content of `fileNN`, each one a different length
pub fn initial_content(i: usize) -> String {
    format!("file{:02} content {}", i, "x".repeat(i * 10))
}

fn set_mtime(path: &Path, secs: i64) -> anyhow::Result<()> {
    set_file_mtime(path, FileTime::from_unix_time(secs, 0))?;
    Ok(())
}

/// Write a small file whose content is its own name
fn create_file(root: &Path, relative: &str) -> anyhow::Result<()> {
    fs::write(root.join(relative), format!("content of {}", relative))?;
    Ok(())
}

/// Load the newest state straight from the repository directory
fn last_stored_state(repository: &Repository) -> anyhow::Result<State> {
    let store = StateStore::open(
        repository.repository_dir().join(storage::STATES_DIR),
        CompressionEngine::new(repository.settings().compression),
    )?;
    let (_, state) = store.load_last()?.expect("at least the initial state");
    Ok(state)
}

/// Every counter of the last stored state is backed by as many tagged records
fn assert_last_state_contains(repository: &Repository, counts: &ModificationCounts) -> anyhow::Result<()> {
    let state = last_stored_state(repository)?;
    assert_eq!(&state.modification_counts, counts);
    for modification in Modification::ALL {
        assert_eq!(
            state.count_tagged(modification),
            counts.get(modification),
            "{} records in the stored state",
            modification
        );
    }
    Ok(())
}

fn options(comment: &str) -> CommandOptions {
    CommandOptions {
        comment: comment.to_string(),
        ..Default::default()
    }
}

fn assert_full_scenario(hash_mode: HashMode) -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(hash_mode)?;
    harness.modify_everything()?;

    let result = harness.repository.commit(&options("All modifications"))?;
    let counts = &result.counts;
    assert_eq!(result.state_number, Some(2));
    assert_eq!(counts.renamed, 1, "{:?}", counts);
    assert_eq!(counts.date_modified, 1, "{:?}", counts);
    assert_eq!(counts.content_modified, 2, "{:?}", counts);
    assert_eq!(counts.deleted, 1, "{:?}", counts);
    assert_eq!(counts.attributes_modified, 0, "{:?}", counts);

    if hash_mode.is_hashing() {
        assert_eq!(counts.copied, 2, "{:?}", counts);
        assert_eq!(counts.duplicated, 1, "{:?}", counts);
        assert_eq!(counts.added, 2, "{:?}", counts);
    } else {
        assert_eq!(counts.copied, 0, "{:?}", counts);
        assert_eq!(counts.duplicated, 0, "{:?}", counts);
        assert_eq!(counts.added, 5, "{:?}", counts);
    }
    assert_eq!(result.modified_count(), 10);
    assert_eq!(counts.total(), result.current.file_count + counts.deleted);
    assert_last_state_contains(&harness.repository, counts)?;

    let renamed = result
        .differences
        .iter()
        .find(|d| d.modification() == Some(Modification::Renamed))
        .expect("a rename");
    assert_eq!(renamed.file.path, Path::new("dir01/file01"));
    assert_eq!(renamed.previous.as_ref().map(|p| p.path.as_path()), Some(Path::new("file01")));

    // Committing the same tree again stores nothing
    let again = harness.repository.commit(&options("No change"))?;
    assert!(again.is_clean());
    assert_eq!(again.state_number, None);
    assert_eq!(again.counts.unchanged, result.current.file_count);
    assert_eq!(harness.repository.log()?.len(), 2);

    if hash_mode.is_hashing() {
        let duplicates = harness.repository.find_duplicates(&options(""))?;
        assert_eq!(duplicates.sets.len(), 2);
        assert_eq!(duplicates.duplicated_files_count, 3);
        let wasted: Vec<u64> = duplicates.sets.iter().map(|s| s.wasted_space()).collect();
        assert!(wasted.windows(2).all(|w| w[0] >= w[1]), "{:?}", wasted);
    }
    Ok(())
}

#[test]
fn test_full_scenario_full() -> anyhow::Result<()> {
    assert_full_scenario(HashMode::Full)
}

#[test]
fn test_full_scenario_medium_block() -> anyhow::Result<()> {
    assert_full_scenario(HashMode::MediumBlock)
}

#[test]
fn test_full_scenario_small_block() -> anyhow::Result<()> {
    assert_full_scenario(HashMode::SmallBlock)
}

#[test]
fn test_full_scenario_none() -> anyhow::Result<()> {
    assert_full_scenario(HashMode::None)
}

#[test]
fn test_init_records_every_file() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    let log = harness.repository.log()?;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].state_number, 1);
    assert_eq!(log[0].file_count, 10);
    assert_eq!(log[0].modification_counts.added, 10);
    assert_eq!(log[0].comment, "Initial state");
    Ok(())
}

#[test]
fn test_rollback_restores_previous_view() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    harness.modify_everything()?;

    let before = harness.repository.status(&options(""))?;
    harness.repository.commit(&options("to undo"))?;
    assert!(harness.repository.status(&options(""))?.is_clean());

    assert_eq!(harness.repository.rollback()?, Some(2));
    let after = harness.repository.status(&options(""))?;
    assert_eq!(after.counts, before.counts);
    assert_eq!(after.previous_state_number, Some(1));

    // The baseline stays
    assert_eq!(harness.repository.rollback()?, None);
    Ok(())
}

#[test]
fn test_rename_and_copy_then_delete() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    let root = harness.root();

    // A lone file moved by copy and delete is a rename
    fs::copy(root.join("file08"), root.join("moved08"))?;
    fs::remove_file(root.join("file08"))?;

    // With an unchanged twin elsewhere the copy wins and the source is deleted
    fs::copy(root.join("file09"), root.join("twin09"))?;
    harness.repository.commit(&options("twin"))?;
    fs::copy(root.join("file09"), root.join("moved09"))?;
    fs::remove_file(root.join("file09"))?;

    let result = harness.repository.status(&options(""))?;
    let kind = |path: &str| {
        result
            .differences
            .iter()
            .find(|d| d.file.path == Path::new(path))
            .and_then(|d| d.modification())
    };
    assert_eq!(kind("moved09"), Some(Modification::Copied));
    assert_eq!(kind("file09"), Some(Modification::Deleted));
    assert_eq!(result.counts.renamed, 0);

    let first = harness.repository.log()?;
    assert_eq!(first[1].modification_counts.renamed, 1);
    Ok(())
}

#[test]
fn test_duplicate_detection_on_five_files() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let same = "identical content in three files";
    for name in ["a", "b", "c"] {
        fs::write(temp_dir.path().join(name), same)?;
    }
    fs::write(temp_dir.path().join("d"), "unique one")?;
    fs::write(temp_dir.path().join("e"), "unique two, longer")?;

    let (repository, _) = RepositoryBuilder::new().init(temp_dir.path(), "init")?;
    let result = repository.find_duplicates(&options(""))?;
    assert_eq!(result.sets.len(), 1);
    assert_eq!(result.sets[0].files.len(), 3);
    assert_eq!(result.sets[0].wasted_space(), 2 * same.len() as u64);
    assert_eq!(result.total_wasted_space, 2 * same.len() as u64);
    Ok(())
}

#[test]
fn test_duplicate_removal_with_auto_accept() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let same = "the same bytes everywhere";
    for name in ["keep", "x1", "x2"] {
        fs::write(temp_dir.path().join(name), same)?;
    }
    let (repository, _) = RepositoryBuilder::new().init(temp_dir.path(), "init")?;

    let mut result = repository.find_duplicates(&options(""))?;
    let mut out = Vec::new();
    result.manage(
        repository.root(),
        ManageOptions {
            verbose: false,
            remove: true,
        },
        &mut AutoAccept,
        &mut out,
    )?;

    assert_eq!(result.files_removed, 2);
    assert_eq!(result.space_freed, 2 * same.len() as u64);
    assert!(temp_dir.path().join("keep").exists());
    assert!(!temp_dir.path().join("x1").exists());
    assert!(!temp_dir.path().join("x2").exists());

    let status = repository.status(&options(""))?;
    assert_eq!(status.counts.deleted, 2);
    Ok(())
}

#[test]
fn test_duplicates_refused_without_hashing() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::None)?;
    let err = harness.repository.find_duplicates(&options("")).unwrap_err();
    assert!(err.is_usage_error());
    Ok(())
}

#[test]
fn test_cross_mode_comparison_is_clean() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    fs::write(harness.root().join("extra"), "one more file")?;

    let small = CommandOptions {
        hash_mode: Some(HashMode::SmallBlock),
        ..options("small")
    };
    let committed = harness.repository.commit(&small)?;
    assert_eq!(committed.state_number, Some(2));
    assert_eq!(committed.current.hash_mode, HashMode::SmallBlock);

    let full = harness.repository.status(&options(""))?;
    assert_eq!(full.hash_mode, HashMode::SmallBlock);
    assert!(full.is_clean(), "{:?}", full.counts);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_permission_change_is_attribute_modification() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let harness = ScenarioHarness::new(HashMode::Full)?;
    let path = harness.root().join("file03");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

    let result = harness.repository.status(&options(""))?;
    assert_eq!(result.counts.attributes_modified, 1, "{:?}", result.counts);
    assert_eq!(result.modified_count(), 1);
    Ok(())
}

#[test]
fn test_truncated_state_fails_loudly() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    let state_file = harness
        .repository
        .repository_dir()
        .join("states")
        .join("state_1.json.lz4");
    let blob = fs::read(&state_file)?;
    fs::write(&state_file, &blob[..blob.len() / 3])?;

    let err = harness.repository.status(&options("")).unwrap_err();
    assert!(err.is_corruption(), "{}", err);
    assert!(harness.repository.log().unwrap_err().is_corruption());
    Ok(())
}

#[test]
fn test_ignore_file_is_honored() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    fs::write(harness.root().join(IGNORE_FILE_NAME), "*.log\n")?;
    fs::write(harness.root().join("debug.log"), "noise")?;

    let result = harness.repository.status(&options(""))?;
    assert!(result.is_clean(), "{:?}", result.differences);

    let ignored = harness.repository.ignored_files()?;
    assert!(ignored.contains(&PathBuf::from("debug.log")));
    Ok(())
}

#[test]
fn test_commit_from_subdirectory() -> anyhow::Result<()> {
    let harness = ScenarioHarness::new(HashMode::Full)?;
    harness.modify_everything()?;
    let root = harness.root();
    let dir01 = root.join("dir01");

    for name in ["ignored_type1", "ignored_type2", "media.mp3", "media.mp4"] {
        create_file(root, name)?;
        create_file(&dir01, name)?;
    }
    fs::write(root.join(IGNORE_FILE_NAME), "**/*.mp3\nignored_type1\n")?;

    // Seen from dir01 nothing of the subtree is known yet
    let sub = Repository::discover(&dir01)?;
    assert_eq!(sub.root(), root.canonicalize()?);
    assert_eq!(sub.scope(), Some(Path::new("dir01")));
    let status = sub.status(&options(""))?;
    assert_eq!(status.modified_count(), 3, "{:?}", status.differences);
    assert_eq!(status.counts.added, 3);

    fs::write(dir01.join(IGNORE_FILE_NAME), "*.mp4\nignored_type2\n")?;
    let status = sub.status(&options(""))?;
    assert_eq!(status.modified_count(), 1, "{:?}", status.differences);
    assert!(sub.find_duplicates(&options(""))?.is_empty());

    let committed = sub.commit(&options("From dir01"))?;
    assert_eq!(committed.state_number, Some(2));
    assert_eq!(committed.modified_count(), 1);
    assert_eq!(committed.counts.added, 1);
    assert_last_state_contains(&harness.repository, &committed.counts)?;
    assert!(sub.status(&options(""))?.is_clean());

    // Files outside dir01 were carried over untouched
    let stored = last_stored_state(&harness.repository)?;
    assert!(stored.file(Path::new("file01")).is_some());
    assert!(stored.file(Path::new("file06")).is_some());
    assert!(stored.file(Path::new("dir01/file01")).is_some());
    assert!(stored.file(Path::new("file12")).is_none());

    // From the root, file01 now has an unchanged twin in dir01
    let whole = harness.repository.commit(&options("Everything else"))?;
    let counts = &whole.counts;
    assert_eq!(whole.state_number, Some(3));
    assert_eq!(counts.renamed, 0, "{:?}", counts);
    assert_eq!(counts.deleted, 2, "{:?}", counts);
    assert_eq!(counts.copied, 2, "{:?}", counts);
    assert_eq!(counts.duplicated, 1, "{:?}", counts);
    assert_eq!(counts.added, 4, "{:?}", counts);
    assert_eq!(whole.modified_count(), 12);
    assert_last_state_contains(&harness.repository, counts)?;

    assert!(harness.repository.commit(&options(""))?.is_clean());
    assert_eq!(harness.repository.log()?.len(), 3);
    assert_eq!(harness.repository.ignored_files()?.len(), 6);
    Ok(())
}
