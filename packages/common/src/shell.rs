//! Validation and quoting for values that end up inside shell command text.
//!
//! Validators are allowlists: a value either matches a strict format or is
//! rejected, never sanitized.

use std::path::Path;

use thiserror::Error;

const ALLOWED_SHELLS: &[&str] = &[
    "sh",
    "bash",
    "zsh",
    "ash",
    "/bin/sh",
    "/bin/bash",
    "/bin/zsh",
    "/bin/ash",
];

/// Maximum number of log lines a caller may request.
pub const MAX_TAIL: u32 = 10_000;

/// Maximum length of a log search filter.
pub const MAX_SEARCH_LEN: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteError {
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(String),
    #[error("path contains a null byte: {0}")]
    NulByte(String),
}

/// Quotes a path so it can be embedded in a POSIX shell command as a single word.
pub fn quote_path(path: &Path) -> Result<String, QuoteError> {
    let raw = path
        .to_str()
        .ok_or_else(|| QuoteError::NotUtf8(path.to_string_lossy().into_owned()))?;
    quote_arg(raw)
}

/// Quotes an arbitrary argument as a single shell word.
pub fn quote_arg(raw: &str) -> Result<String, QuoteError> {
    shlex::try_quote(raw)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| QuoteError::NulByte(raw.escape_debug().to_string()))
}

/// Container ids are 12-64 hex characters; names are alphanumeric with `_`,
/// `.` and `-` after the first character, up to 128 characters.
pub fn is_valid_container_id(id: &str) -> bool {
    let is_hex_id = (12..=64).contains(&id.len()) && id.chars().all(|c| c.is_ascii_hexdigit());
    if is_hex_id {
        return true;
    }

    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    id.len() <= 128
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Number of log lines: digits only, at most [`MAX_TAIL`].
pub fn is_valid_tail(tail: &str) -> bool {
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    tail.parse::<u32>().is_ok_and(|n| n <= MAX_TAIL)
}

/// `all`, or a duration such as `5s`, `10m`, `1h`, `2d`.
pub fn is_valid_since(since: &str) -> bool {
    if since == "all" {
        return true;
    }
    let Some((unit_idx, unit)) = since.char_indices().last() else {
        return false;
    };
    let digits = &since[..unit_idx];
    matches!(unit, 's' | 'm' | 'h' | 'd')
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Printable ASCII only, at most [`MAX_SEARCH_LEN`] characters.
pub fn is_valid_search(search: &str) -> bool {
    search.len() <= MAX_SEARCH_LEN && search.chars().all(|c| (' '..='~').contains(&c))
}

pub fn is_valid_shell(shell: &str) -> bool {
    ALLOWED_SHELLS.contains(&shell)
}
