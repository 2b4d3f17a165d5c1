//! ZIP extraction into a confined output directory.
//!
//! Names containing NUL bytes and symlink entries are rejected for the whole
//! archive before anything is written. Every entry then goes through the same
//! pipeline, and any failing step aborts the whole extraction:
//!
//! 1. optional removal of the single root folder
//! 2. lexical confinement of the joined, normalized destination
//! 3. create missing parents one component at a time, re-checking every
//!    existing component through the filesystem
//! 4. confinement of the canonicalized parent actually written to
//! 5. write, counting decompressed bytes against [`ExtractLimits`]
//!
//! Step 2 runs before anything touches the filesystem, so forged names never
//! cause a directory to be created, not even transiently.

mod error;

pub use error::ExtractError;

use std::fs::{self, OpenOptions};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use common::path::{is_confined, normalize_lexical};
use serde::Deserialize;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Size ceilings guarding against decompression bombs.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Total decompressed bytes across all entries. Default: 256 MiB.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    /// Decompressed bytes for a single entry. Default: 128 MiB.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    /// Number of entries in the central directory. Default: 100000.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_total_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_max_entry_bytes() -> u64 {
    128 * 1024 * 1024
}
fn default_max_entries() -> usize {
    100_000
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: default_max_total_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            max_entries: default_max_entries(),
        }
    }
}

/// What an extraction wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes_written: u64,
}

/// Extracts every entry of `archive_bytes` under `output_dir`.
///
/// `output_dir` is created if missing. On error, entries extracted before the
/// failing one remain on disk.
pub fn extract(
    archive_bytes: &[u8],
    output_dir: &Path,
    limits: &ExtractLimits,
) -> Result<ExtractSummary, ExtractError> {
    extract_entries(archive_bytes, output_dir, limits, None)
}

/// Like [`extract`], but entries under the top-level folder `root` land
/// directly in `output_dir`. See [`single_root_folder`].
pub fn extract_stripping_root(
    archive_bytes: &[u8],
    output_dir: &Path,
    limits: &ExtractLimits,
    root: &str,
) -> Result<ExtractSummary, ExtractError> {
    extract_entries(archive_bytes, output_dir, limits, Some(root))
}

/// Returns the folder name when every entry of the archive lives under one
/// and the same top-level directory.
pub fn single_root_folder(archive_bytes: &[u8]) -> Result<Option<String>, ExtractError> {
    let archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut root: Option<&str> = None;
    let mut nested = false;

    for name in archive.file_names() {
        let mut segments = name.split('/').filter(|s| !s.is_empty() && *s != ".");
        let Some(first) = segments.next() else {
            continue;
        };
        if first == ".." {
            return Ok(None);
        }
        match root {
            Some(r) if r != first => return Ok(None),
            Some(_) => {}
            None => root = Some(first),
        }
        // A lone file at the top level is not a folder to strip.
        if segments.next().is_some() || name.ends_with('/') {
            nested = true;
        } else {
            return Ok(None);
        }
    }

    Ok(root.filter(|_| nested).map(str::to_string))
}

/// Drops the leading `root` segment from an entry name, reading segments the
/// way [`single_root_folder`] does. An empty result is the root folder itself.
fn strip_root(name: &str, root: &str) -> Result<String, ExtractError> {
    let mut segments = name.split('/').filter(|s| !s.is_empty() && *s != ".");
    match segments.next() {
        None => Ok(String::new()),
        Some(first) if first == root => Ok(segments.collect::<Vec<_>>().join("/")),
        Some(_) => Err(ExtractError::EntryOutsideRoot {
            entry: name.to_string(),
            root: root.to_string(),
        }),
    }
}

/// Rejects NUL bytes in names and symlink entries anywhere in the archive.
fn screen_entries(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<(), ExtractError> {
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name();

        if name.contains('\0') {
            return Err(ExtractError::InvalidEntryName(name.to_string()));
        }
        if entry.unix_mode().is_some_and(is_symlink_mode) {
            warn!(entry = %name, "Rejected symlink entry");
            return Err(ExtractError::SymlinkEntryRejected {
                entry: name.to_string(),
            });
        }
    }
    Ok(())
}

fn extract_entries(
    archive_bytes: &[u8],
    output_dir: &Path,
    limits: &ExtractLimits,
    root: Option<&str>,
) -> Result<ExtractSummary, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    if archive.len() > limits.max_entries {
        return Err(ExtractError::TooManyEntries {
            count: archive.len(),
            limit: limits.max_entries,
        });
    }

    screen_entries(&mut archive)?;

    let lexical_base = normalize_lexical(output_dir);
    fs::create_dir_all(&lexical_base)?;
    let real_base = fs::canonicalize(&lexical_base)?;

    let mut summary = ExtractSummary::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();

        let stripped = match root {
            Some(root) => strip_root(&name, root)?,
            None => name.clone(),
        };

        let relative = confined_relative_path(&stripped, &lexical_base).map_err(|err| match err {
            ExtractError::PathTraversalDetected { resolved, .. } => {
                ExtractError::traversal(&name, resolved)
            }
            other => other,
        })?;
        if relative.as_os_str().is_empty() {
            debug!(entry = %name, "Entry resolves to the output directory, skipping");
            continue;
        }

        if entry.is_dir() {
            let dir = materialize_dir(&real_base, &relative, &name)?;
            verify_real_path(&dir, &real_base, &name)?;
            summary.directories += 1;
            continue;
        }

        let parent_rel = relative.parent().unwrap_or_else(|| Path::new(""));
        let Some(file_name) = relative.file_name() else {
            return Err(ExtractError::InvalidEntryName(name));
        };

        let parent = materialize_dir(&real_base, parent_rel, &name)?;
        let parent = verify_real_path(&parent, &real_base, &name)?;
        let dest = parent.join(file_name);

        let remaining = limits.max_total_bytes.saturating_sub(summary.bytes_written);
        let written = write_entry(&mut entry, &dest, limits.max_entry_bytes.min(remaining))?;

        if written > limits.max_entry_bytes {
            let _ = fs::remove_file(&dest);
            warn!(entry = %name, limit = limits.max_entry_bytes, "Entry too large");
            return Err(ExtractError::EntryTooLarge {
                entry: name,
                limit: limits.max_entry_bytes,
            });
        }
        if written > remaining {
            let _ = fs::remove_file(&dest);
            warn!(entry = %name, limit = limits.max_total_bytes, "Archive too large");
            return Err(ExtractError::ArchiveTooLarge {
                limit: limits.max_total_bytes,
            });
        }

        summary.bytes_written += written;
        summary.files += 1;
        debug!(entry = %name, bytes = written, "Extracted entry");
    }

    info!(
        output = %lexical_base.display(),
        files = summary.files,
        directories = summary.directories,
        bytes = summary.bytes_written,
        "Archive extracted"
    );

    Ok(summary)
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Joins the entry name onto `base` as plain text (a leading `/` does not
/// reset the join), normalizes it and returns the part below `base`.
fn confined_relative_path(name: &str, base: &Path) -> Result<PathBuf, ExtractError> {
    let mut joined = base.to_path_buf();
    for segment in name.split('/').filter(|s| !s.is_empty()) {
        joined.push(segment);
    }
    let candidate = normalize_lexical(&joined);

    if !is_confined(&candidate, base) {
        warn!(entry = %name, resolved = %candidate.display(), "Rejected path traversal");
        return Err(ExtractError::traversal(name, candidate));
    }

    Ok(candidate
        .strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_default())
}

/// Walks `relative` below `real_base`, creating missing directories.
///
/// Components that already exist are resolved through the filesystem and
/// must stay inside `real_base`, so a planted symlink can never redirect a
/// `create_dir` outside of it.
fn materialize_dir(
    real_base: &Path,
    relative: &Path,
    entry: &str,
) -> Result<PathBuf, ExtractError> {
    let mut current = real_base.to_path_buf();

    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() || meta.is_dir() => {
                let resolved = fs::canonicalize(&current)?;
                if !is_confined(&resolved, real_base) {
                    warn!(entry = %entry, resolved = %resolved.display(), "Existing path escapes output directory");
                    return Err(ExtractError::traversal(entry, resolved));
                }
                if !resolved.is_dir() {
                    return Err(not_a_directory(&current));
                }
                current = resolved;
            }
            Ok(_) => return Err(not_a_directory(&current)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(&current) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        }
    }

    Ok(current)
}

/// Second confinement check, on the canonicalized path the write will use.
fn verify_real_path(path: &Path, real_base: &Path, entry: &str) -> Result<PathBuf, ExtractError> {
    let real = fs::canonicalize(path)?;
    if !is_confined(&real, real_base) {
        warn!(entry = %entry, resolved = %real.display(), "Real path escapes output directory");
        return Err(ExtractError::traversal(entry, real));
    }
    Ok(real)
}

/// Replaces whatever file sits at `dest` and streams at most `cap + 1` bytes
/// into it. The returned count exceeding `cap` signals a size violation.
fn write_entry(reader: &mut impl Read, dest: &Path, cap: u64) -> Result<u64, ExtractError> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => {
            return Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{}' is a directory", dest.display()),
            )));
        }
        // Unlink first so an existing symlink at the destination is replaced,
        // not followed.
        Ok(_) => fs::remove_file(dest)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut file = OpenOptions::new().write(true).create_new(true).open(dest)?;
    let written = io::copy(&mut reader.take(cap.saturating_add(1)), &mut file)?;
    Ok(written)
}

fn not_a_directory(path: &Path) -> ExtractError {
    ExtractError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("'{}' exists and is not a directory", path.display()),
    ))
}
