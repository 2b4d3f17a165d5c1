//! Deploying an uploaded archive as an application's code.

use std::fs;
use std::path::{Path, PathBuf};

use common::PathsConfig;
use tracing::{info, instrument, warn};

use crate::archive::{self, ExtractLimits, ExtractSummary};
use crate::error::{AppError, Result};

/// Where a drop for `app_name` is extracted: `APPLICATIONS_PATH/<app_name>/code`
/// on the local host.
pub fn drop_output_dir(paths: &PathsConfig, app_name: &str) -> Result<PathBuf> {
    if app_name.is_empty()
        || app_name == "."
        || app_name == ".."
        || app_name.contains(['/', '\\', '\0'])
    {
        return Err(AppError::Validation(format!(
            "Invalid app name: {app_name:?}"
        )));
    }
    Ok(paths
        .resolve(false)
        .applications_path
        .join(app_name)
        .join("code"))
}

/// Replaces the application's code with the content of `archive_bytes`.
///
/// When every entry sits under one top-level folder, that folder is
/// stripped. If extraction fails the output directory is removed, so a
/// rejected archive never leaves partial code behind.
#[instrument(skip(archive_bytes, paths, limits), fields(size = archive_bytes.len()))]
pub fn unzip_drop(
    archive_bytes: &[u8],
    app_name: &str,
    paths: &PathsConfig,
    limits: &ExtractLimits,
) -> Result<ExtractSummary> {
    let output = drop_output_dir(paths, app_name)?;

    match fs::remove_dir_all(&output) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let summary = extract_or_discard(archive_bytes, &output, limits, true)?;
    info!(app_name, files = summary.files, "Drop extracted");
    Ok(summary)
}

/// Extracts `archive_bytes` into `output`, stripping a single root folder
/// when `strip_root` is set.
///
/// If `output` did not exist before the call, it is removed again on
/// failure. A directory that already existed is never removed; it keeps the
/// entries written before the failing one.
pub fn extract_or_discard(
    archive_bytes: &[u8],
    output: &Path,
    limits: &ExtractLimits,
    strip_root: bool,
) -> Result<ExtractSummary> {
    let existed = fs::symlink_metadata(output).is_ok();

    let root = if strip_root {
        archive::single_root_folder(archive_bytes)
    } else {
        Ok(None)
    };
    let result = root.and_then(|root| match root {
        Some(root) => archive::extract_stripping_root(archive_bytes, output, limits, &root),
        None => archive::extract(archive_bytes, output, limits),
    });

    result.map_err(|err| {
        if existed {
            warn!(output = %output.display(), error = %err, "Extraction failed, keeping existing directory");
        } else {
            warn!(output = %output.display(), error = %err, "Extraction failed, removing output");
            if let Err(cleanup) = fs::remove_dir_all(output) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %cleanup, "Failed to remove output directory");
                }
            }
        }
        err.into()
    })
}
