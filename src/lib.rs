//! # snapsum - checksum states of directory trees
//!
//! snapsum records a fingerprint of every file under a directory and tells
//! you what happened since the last record: files added, deleted, renamed,
//! copied, duplicated, or modified in content, date or attributes. It is
//! aimed at large binary trees (photo archives, backups) where a version
//! control system would be overkill but silent corruption must not go
//! unnoticed. It can also find and remove duplicate files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapsum::{CommandOptions, Repository, RepositoryBuilder};
//!
//! # fn main() -> snapsum::Result<()> {
//! // Record the first state
//! let (repository, initial) = RepositoryBuilder::new().init("./photos", "Initial state")?;
//! println!("Tracking {} files", initial.current.file_count);
//!
//! // Later, see what changed and store a new state
//! let options = CommandOptions {
//!     comment: "after import".to_string(),
//!     ..Default::default()
//! };
//! let result = repository.commit(&options)?;
//! for difference in &result.differences {
//!     println!("{:?}: {}", difference.modification(), difference.file.path.display());
//! }
//!
//! // A repository can be reopened from any process
//! let repository = Repository::open(std::path::Path::new("./photos"))?;
//! println!("{} states", repository.log()?.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Hash modes
//!
//! | mode           | bytes hashed per file | speed     |
//! |----------------|-----------------------|-----------|
//! | `none`         | none, length + mtime  | fastest   |
//! | `small-block`  | first 32 KiB          | fast      |
//! | `medium-block` | first 512 KiB         | medium    |
//! | `full`         | whole file            | slowest   |
//!
//! A repository is created with a global mode. Later commands may use a
//! weaker mode, never a stronger one. Only `full` states are trusted for
//! deleting duplicates.
//!
//! ## Module Organization
//!
//! - [`generator`]: directory walk and state generation
//! - [`hashing`]: per-file fingerprints
//! - [`compare`]: classification of every file between two states
//! - [`duplicates`]: duplicate sets and their removal
//! - [`storage`]: numbered state files and settings
//! - [`repository`]: the facade used by the CLI
//! - [`report`]: console rendering
//! - [`types`], [`error`], [`compression`]: shared building blocks

pub mod compare;
pub mod compression;
pub mod duplicates;
pub mod error;
pub mod generator;
pub mod hashing;
pub mod report;
pub mod repository;
pub mod storage;
pub mod types;

mod utils;

pub use compare::{compare, CompareResult, Difference};
pub use compression::{CompressionEngine, CompressionStrategy};
pub use duplicates::{
    find_duplicates, AutoAccept, DuplicateResult, DuplicateSet, LinePrompt, ManageOptions,
    SelectionPrompt,
};
pub use error::{Result, SnapsumError};
pub use generator::{Generation, StateGenerator, IGNORE_FILE_NAME, REPOSITORY_DIR};
pub use repository::{Repository, RepositoryBuilder};
pub use storage::StateStore;
pub use types::*;
pub use utils::format_bytes;
