use std::path::PathBuf;

use common::PathsConfig;
use sea_orm::ConnectionTrait;
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::executor::{CommandExecutor, CommandOutput};
use crate::lookup::{EntityLookup, EntityRecord};
use crate::models::patch::PatchOwner;
use crate::patch::render_apply_command;
use crate::services::patch::PatchService;

/// A rendered patch script and where it has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyCommand {
    pub code_root: PathBuf,
    pub server_id: Option<String>,
    /// Empty when the owner has no enabled patch.
    pub script: String,
}

/// `<APPLICATIONS_PATH|COMPOSE_PATH>/<appName>/code` in the entity's
/// execution context.
pub fn code_root(paths: &PathsConfig, owner: &PatchOwner, record: &EntityRecord) -> Result<PathBuf> {
    let app_name = record
        .app_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AppError::Configuration(format!("{owner} has no app name, code root is unknown"))
        })?;
    if app_name.contains(['/', '\\', '\0']) || app_name == "." || app_name == ".." {
        return Err(AppError::Configuration(format!(
            "{owner} has an invalid app name: {app_name:?}"
        )));
    }

    let layout = paths.resolve(record.server_id.is_some());
    let root = match owner {
        PatchOwner::Application(_) => layout.applications_path,
        PatchOwner::Compose(_) => layout.compose_path,
    };
    Ok(root.join(app_name).join("code"))
}

#[instrument(skip(db, lookup, paths))]
pub async fn generate_apply_patches_command<C, L>(
    db: &C,
    lookup: &L,
    paths: &PathsConfig,
    owner: &PatchOwner,
) -> Result<ApplyCommand>
where
    C: ConnectionTrait,
    L: EntityLookup + ?Sized,
{
    let record = lookup.get(owner).await?;
    let code_root = code_root(paths, owner, &record)?;
    let patches = PatchService::new(db).find_by_owner(owner).await?;
    let script = render_apply_command(&code_root, &patches)?;

    Ok(ApplyCommand {
        code_root,
        server_id: record.server_id,
        script,
    })
}

/// Renders and runs the owner's patches. Returns `None` without running
/// anything when no patch is enabled.
#[instrument(skip(db, lookup, paths, executor))]
pub async fn apply_patches<C, L, E>(
    db: &C,
    lookup: &L,
    paths: &PathsConfig,
    executor: &E,
    owner: &PatchOwner,
) -> Result<Option<CommandOutput>>
where
    C: ConnectionTrait,
    L: EntityLookup + ?Sized,
    E: CommandExecutor + ?Sized,
{
    let command = generate_apply_patches_command(db, lookup, paths, owner).await?;
    if command.script.is_empty() {
        info!("No enabled patches, skipping");
        return Ok(None);
    }

    let output = executor
        .execute(&command.script, command.server_id.as_deref())
        .await?;
    info!(code_root = %command.code_root.display(), "Patches applied");
    Ok(Some(output))
}
