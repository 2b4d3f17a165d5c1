//! Read-only browsing of a checked-out repository for the patch editor.

use std::path::{Path, PathBuf};

use common::PathsConfig;
use common::path::{is_confined, read_valid_directory};
use common::shell::quote_path;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::executor::CommandExecutor;
use crate::lookup::EntityLookup;
use crate::models::patch::{PatchOwner, validate_file_path};
use crate::patch::RenderError;
use crate::services::PatchService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One node of the repository tree. `path` is relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RepoNode>,
}

fn invalid_directory(repo_path: &Path) -> AppError {
    AppError::Validation(format!(
        "Directory '{}' is outside the allowed base path",
        repo_path.display()
    ))
}

fn quote(path: &Path) -> Result<String> {
    quote_path(path).map_err(|e| AppError::Render(RenderError::Quote(e)))
}

/// Lists the tree under `repo_path`, skipping `.git`.
#[instrument(skip(executor, paths))]
pub async fn read_repo_directory<E>(
    executor: &E,
    paths: &PathsConfig,
    repo_path: &Path,
    server_id: Option<&str>,
) -> Result<Vec<RepoNode>>
where
    E: CommandExecutor + ?Sized,
{
    if !read_valid_directory(repo_path, server_id, paths) {
        return Err(invalid_directory(repo_path));
    }

    let script = format!(
        "find {} -mindepth 1 -name .git -prune -o -printf '%y\\t%P\\n'",
        quote(repo_path)?
    );
    let output = executor.execute(&script, server_id).await?;
    Ok(build_tree(&output.stdout))
}

/// Returns the file as the editor should show it: the owner's enabled patch
/// content when there is one, otherwise the file in the repository, read in
/// the owner's execution context.
#[instrument(skip(db, lookup, executor, paths))]
pub async fn read_repo_file<C, L, E>(
    db: &C,
    lookup: &L,
    executor: &E,
    paths: &PathsConfig,
    owner: &PatchOwner,
    repo_path: &Path,
    file_path: &str,
) -> Result<String>
where
    C: ConnectionTrait,
    L: EntityLookup + ?Sized,
    E: CommandExecutor + ?Sized,
{
    let record = lookup.get(owner).await?;
    let server_id = record.server_id.as_deref();
    let target = repo_file_target(paths, repo_path, file_path, server_id)?;

    let patch = PatchService::new(db)
        .find_by_file_path(file_path, owner)
        .await?
        .filter(|patch| patch.enabled);
    if let Some(patch) = patch {
        debug!(patch_id = %patch.id, "Serving enabled patch content");
        return Ok(patch.content);
    }

    read_stored_file(executor, &target, server_id).await
}

fn repo_file_target(
    paths: &PathsConfig,
    repo_path: &Path,
    file_path: &str,
    server_id: Option<&str>,
) -> Result<PathBuf> {
    if !read_valid_directory(repo_path, server_id, paths) {
        return Err(invalid_directory(repo_path));
    }
    validate_file_path(file_path)?;
    let target = repo_path.join(file_path);
    if !is_confined(&target, repo_path) {
        return Err(AppError::Validation(format!(
            "File '{file_path}' is outside the repository"
        )));
    }
    Ok(target)
}

async fn read_stored_file<E>(executor: &E, target: &Path, server_id: Option<&str>) -> Result<String>
where
    E: CommandExecutor + ?Sized,
{
    let output = executor
        .execute(&format!("cat -- {}", quote(target)?), server_id)
        .await?;
    Ok(output.stdout)
}

/// Builds a sorted tree from `find -printf '%y\t%P\n'` output. Directories
/// sort before files at each level.
fn build_tree(listing: &str) -> Vec<RepoNode> {
    let mut entries: Vec<(NodeKind, &str)> = listing
        .lines()
        .filter_map(|line| {
            let (kind, path) = line.split_once('\t')?;
            if path.is_empty() {
                return None;
            }
            let kind = if kind == "d" {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            Some((kind, path))
        })
        .collect();
    entries.sort_by(|a, b| a.1.cmp(b.1));

    let mut roots = Vec::new();
    for (kind, path) in entries {
        insert(&mut roots, path, path, kind);
    }
    sort_nodes(&mut roots);
    roots
}

fn insert(nodes: &mut Vec<RepoNode>, rest: &str, full_path: &str, kind: NodeKind) {
    match rest.split_once('/') {
        None => {
            if !nodes.iter().any(|n| n.name == rest) {
                nodes.push(RepoNode {
                    name: rest.to_string(),
                    path: full_path.to_string(),
                    kind,
                    children: Vec::new(),
                });
            }
        }
        Some((head, tail)) => {
            let index = match nodes.iter().position(|n| n.name == head) {
                Some(index) => index,
                None => {
                    let prefix_len = full_path.len() - rest.len() + head.len();
                    nodes.push(RepoNode {
                        name: head.to_string(),
                        path: full_path[..prefix_len].to_string(),
                        kind: NodeKind::Directory,
                        children: Vec::new(),
                    });
                    nodes.len() - 1
                }
            };
            insert(&mut nodes[index].children, tail, full_path, kind);
        }
    }
}

fn sort_nodes(nodes: &mut [RepoNode]) {
    nodes.sort_by(|a, b| {
        (a.kind != NodeKind::Directory, &a.name).cmp(&(b.kind != NodeKind::Directory, &b.name))
    });
    for node in nodes {
        sort_nodes(&mut node.children);
    }
}
