//! Per-file fingerprints
//!
//! Every hash mode above `none` reads the file once from the start and feeds
//! the same bytes to one SHA-256 per level, so a `full` fingerprint also
//! carries the small and medium block digests.

use crate::error::Result;
use crate::types::{FileHash, HashMode};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Bytes hashed by the `small-block` mode
pub const SMALL_BLOCK_SIZE: u64 = 32 * 1024;

/// Bytes hashed by the `medium-block` mode
pub const MEDIUM_BLOCK_SIZE: u64 = 512 * 1024;

const BUFFER_SIZE: usize = 64 * 1024;

const MB: i64 = 1024 * 1024;

/// Fingerprint the file at `path`
///
/// Under [`HashMode::None`] the file is not opened.
pub fn hash_file(path: &Path, mode: HashMode) -> Result<FileHash> {
    if !mode.is_hashing() {
        return Ok(FileHash::default());
    }
    hash_reader(File::open(path)?, mode)
}

/// Fingerprint any byte source
pub fn hash_reader<R: Read>(mut reader: R, mode: HashMode) -> Result<FileHash> {
    let limit = match mode {
        HashMode::None => return Ok(FileHash::default()),
        HashMode::SmallBlock => Some(SMALL_BLOCK_SIZE),
        HashMode::MediumBlock => Some(MEDIUM_BLOCK_SIZE),
        HashMode::Full => None,
    };

    let mut small = Sha256::new();
    let mut medium = Sha256::new();
    let mut full = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut offset: u64 = 0;

    loop {
        let want = match limit {
            Some(limit) if offset >= limit => break,
            Some(limit) => ((limit - offset) as usize).min(buffer.len()),
            None => buffer.len(),
        };

        let read = match reader.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let chunk = &buffer[..read];

        update_prefix(&mut small, chunk, offset, SMALL_BLOCK_SIZE);
        if mode >= HashMode::MediumBlock {
            update_prefix(&mut medium, chunk, offset, MEDIUM_BLOCK_SIZE);
        }
        if mode == HashMode::Full {
            full.update(chunk);
        }
        offset += read as u64;
    }

    Ok(FileHash {
        small_block: Some(hex::encode(small.finalize())),
        medium_block: (mode >= HashMode::MediumBlock).then(|| hex::encode(medium.finalize())),
        full: (mode == HashMode::Full).then(|| hex::encode(full.finalize())),
    })
}

/// Feed the part of `chunk` that lies before `limit`
fn update_prefix(hasher: &mut Sha256, chunk: &[u8], offset: u64, limit: u64) {
    if offset < limit {
        let take = ((limit - offset) as usize).min(chunk.len());
        hasher.update(&chunk[..take]);
    }
}

/// Coarse progress symbol for a file of the given length
///
/// Bigger files get heavier symbols so a run over a media archive shows
/// where the time goes. A negative length prints a blank.
pub fn progress_char(length: i64) -> char {
    match length {
        l if l < 0 => ' ',
        l if l < 20 * MB => '.',
        l if l < 50 * MB => 'o',
        l if l < 100 * MB => '8',
        l if l < 200 * MB => 'O',
        l if l < 1024 * MB => '@',
        _ => '#',
    }
}
