//! Main test module for snapsum
//!
//! This module includes all test suites:
//! - End-to-end scenarios under every hash mode
//! - Property-based tests for ordering and coverage invariants

pub mod property;
pub mod scenario;

#[cfg(test)]
mod edge_cases {
    use ::snapsum::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let (repository, initial) = RepositoryBuilder::new()
            .init(temp_dir.path(), "Empty")
            .unwrap();
        assert_eq!(initial.current.file_count, 0);
        assert!(initial.is_clean());

        fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
        let result = repository.commit(&CommandOptions::default()).unwrap();
        assert_eq!(result.counts.added, 1);
        assert_eq!(result.state_number, Some(2));
    }

    #[test]
    fn test_unicode_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let unicode_names = vec![
            "файл.txt",
            "文件.txt",
            "ファイル.txt",
            "αρχείο.txt",
            "🚀🌟💾.txt",
        ];

        let mut created = Vec::new();
        for name in &unicode_names {
            if fs::write(temp_dir.path().join(name), format!("Unicode content: {}", name)).is_ok() {
                created.push(*name);
            }
        }
        if created.is_empty() {
            return;
        }

        let (repository, initial) = RepositoryBuilder::new()
            .init(temp_dir.path(), "Unicode names")
            .unwrap();
        assert_eq!(initial.current.file_count, created.len());

        // Renaming across scripts is still a rename
        fs::rename(temp_dir.path().join(created[0]), temp_dir.path().join("renamed.txt")).unwrap();
        let result = repository.status(&CommandOptions::default()).unwrap();
        assert_eq!(result.counts.renamed, 1);
        let renamed = &result.differences[0];
        assert_eq!(renamed.previous.as_ref().unwrap().path, Path::new(created[0]));
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file[with]brackets.txt",
            "file{with}braces.txt",
        ];
        for name in &special_names {
            let _ = fs::write(temp_dir.path().join(name), format!("Content of {}", name));
        }

        let (repository, initial) = RepositoryBuilder::new()
            .init(temp_dir.path(), "Special names")
            .unwrap();
        assert!(initial.current.file_count > 0);
        assert!(repository.status(&CommandOptions::default()).unwrap().is_clean());
    }

    #[test]
    fn test_repository_directory_is_never_tracked() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), "a content").unwrap();
        let (repository, _) = RepositoryBuilder::new().init(temp_dir.path(), "init").unwrap();

        // Each commit writes into .snapsum, which must not show up as a change
        for i in 0..3 {
            fs::write(temp_dir.path().join(format!("n{}", i)), format!("new {}", i)).unwrap();
            let result = repository.commit(&CommandOptions::default()).unwrap();
            assert_eq!(result.modified_count(), 1, "{:?}", result.differences);
        }
        assert!(repository
            .ignored_files()
            .unwrap()
            .iter()
            .all(|p| !p.starts_with(REPOSITORY_DIR)));
    }
}
