//! Lexical path confinement.
//!
//! Everything here works on path strings only: nothing touches the
//! filesystem, so candidates that do not exist yet can be checked. Callers
//! that also need to defend against symlinks planted on disk must re-check
//! the canonicalized path themselves (see the archive extractor).

use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use crate::paths::PathsConfig;

/// Resolves `path` to an absolute path and collapses `.`, `..` and repeated
/// separators without consulting the filesystem.
///
/// Relative paths are anchored at the process working directory. A `..` at
/// the root stays at the root.
pub fn normalize_lexical(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let anchored;
    let path = if path.is_absolute() {
        path
    } else {
        anchored = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from(MAIN_SEPARATOR.to_string()))
            .join(path);
        anchored.as_path()
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Returns true when `candidate` resolves to `base` itself or to a path
/// nested under it.
///
/// The comparison is a byte prefix match on the normalized strings with the
/// separator boundary always included, so `/base` never contains
/// `/base-evil`.
pub fn is_confined(candidate: impl AsRef<Path>, base: impl AsRef<Path>) -> bool {
    let candidate = normalize_lexical(candidate);
    let base = normalize_lexical(base);
    starts_with_boundary(&candidate, &base)
}

/// Prefix check on already-normalized absolute paths.
pub(crate) fn starts_with_boundary(candidate: &Path, base: &Path) -> bool {
    let candidate = candidate.as_os_str().as_encoded_bytes();
    let base = base.as_os_str().as_encoded_bytes();
    let sep = MAIN_SEPARATOR as u8;

    if candidate == base {
        return true;
    }
    if !candidate.starts_with(base) {
        return false;
    }
    // The filesystem root is the only normalized path ending in a separator.
    if base.last() == Some(&sep) {
        return candidate.len() > base.len();
    }
    candidate.get(base.len()) == Some(&sep)
}

/// Validates a user-supplied directory against `BASE_PATH` of the execution
/// context: the remote base when `server_id` is set, the local one otherwise.
pub fn read_valid_directory(
    directory: impl AsRef<Path>,
    server_id: Option<&str>,
    paths: &PathsConfig,
) -> bool {
    let base = paths.resolve(server_id.is_some()).base_path;
    let valid = is_confined(directory.as_ref(), &base);
    if !valid {
        tracing::warn!(
            directory = %directory.as_ref().display(),
            base = %base.display(),
            "Rejected directory outside base path"
        );
    }
    valid
}
