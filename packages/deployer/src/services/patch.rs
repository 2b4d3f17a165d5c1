use chrono::Utc;
use common::PatchKind;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::entity::patch;
use crate::error::{AppError, Result};
use crate::models::patch::{
    NewPatch, PatchChanges, PatchOwner, SavePatchOutcome, normalize_content, validate_file_path,
};

fn owner_condition(owner: &PatchOwner) -> Condition {
    match owner {
        PatchOwner::Application(id) => {
            Condition::all().add(patch::Column::ApplicationId.eq(id.as_str()))
        }
        PatchOwner::Compose(id) => Condition::all().add(patch::Column::ComposeId.eq(id.as_str())),
    }
}

/// Storage operations on patches. Every write validates its input first;
/// one-patch-per-file-per-owner is enforced by the database.
pub struct PatchService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PatchService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, input), fields(file_path = %input.file_path))]
    pub async fn create(&self, input: NewPatch) -> Result<patch::Model> {
        let owner = PatchOwner::from_refs(input.application_id, input.compose_id)?;
        validate_file_path(&input.file_path)?;

        let kind = input.kind.unwrap_or_default();
        let now = Utc::now();
        let model = patch::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            kind: Set(kind),
            file_path: Set(input.file_path),
            enabled: Set(input.enabled.unwrap_or(true)),
            content: Set(normalize_content(kind, input.content)),
            application_id: Set(owner.application_id()),
            compose_id: Set(owner.compose_id()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(self.conn).await?;
        info!(patch_id = %created.id, owner = %owner, "Patch created");
        Ok(created)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<patch::Model> {
        patch::Entity::find_by_id(id.to_string())
            .one(self.conn)
            .await?
            .ok_or_else(|| AppError::PatchNotFound(id.to_string()))
    }

    /// Patches of one owner, ordered by file path then creation time.
    pub async fn find_by_owner(&self, owner: &PatchOwner) -> Result<Vec<patch::Model>> {
        let patches = patch::Entity::find()
            .filter(owner_condition(owner))
            .order_by_asc(patch::Column::FilePath)
            .order_by_asc(patch::Column::CreatedAt)
            .all(self.conn)
            .await?;
        Ok(patches)
    }

    pub async fn find_by_file_path(
        &self,
        file_path: &str,
        owner: &PatchOwner,
    ) -> Result<Option<patch::Model>> {
        let found = patch::Entity::find()
            .filter(owner_condition(owner))
            .filter(patch::Column::FilePath.eq(file_path))
            .one(self.conn)
            .await?;
        Ok(found)
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: &str, changes: PatchChanges) -> Result<patch::Model> {
        let existing = self.find_by_id(id).await?;
        let kind = changes.kind.unwrap_or(existing.kind);
        let content_changed = changes.content.is_some() || kind != existing.kind;
        let content = changes
            .content
            .unwrap_or_else(|| existing.content.clone());

        let mut active = existing.into_active_model();
        if let Some(file_path) = changes.file_path {
            validate_file_path(&file_path)?;
            active.file_path = Set(file_path);
        }
        if content_changed {
            active.content = Set(normalize_content(kind, content));
        }
        active.kind = Set(kind);
        if let Some(enabled) = changes.enabled {
            active.enabled = Set(enabled);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(self.conn).await?;
        debug!(patch_id = %updated.id, "Patch updated");
        Ok(updated)
    }

    pub async fn toggle_enabled(&self, id: &str, enabled: bool) -> Result<patch::Model> {
        self.update(
            id,
            PatchChanges {
                enabled: Some(enabled),
                ..PatchChanges::default()
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<patch::Model> {
        let existing = self.find_by_id(id).await?;
        let result = patch::Entity::delete_by_id(id.to_string())
            .exec(self.conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::PatchNotFound(id.to_string()));
        }
        info!(patch_id = %id, "Patch deleted");
        Ok(existing)
    }

    /// Stores an edit made in the file editor.
    ///
    /// Content identical to the repository removes any existing patch.
    /// Otherwise the patch for `file_path` is updated, or created as an
    /// `update` patch. Losing an insert race to a concurrent save falls back
    /// to updating the winner's row.
    #[instrument(skip(self, repo_content, new_content))]
    pub async fn save_file_as_patch(
        &self,
        owner: &PatchOwner,
        file_path: &str,
        repo_content: &str,
        new_content: String,
    ) -> Result<SavePatchOutcome> {
        validate_file_path(file_path)?;

        let unchanged = normalize_content(PatchKind::Update, repo_content.to_string())
            == normalize_content(PatchKind::Update, new_content.clone());
        if unchanged {
            if let Some(existing) = self.find_by_file_path(file_path, owner).await? {
                self.delete(&existing.id).await?;
            }
            return Ok(SavePatchOutcome {
                deleted: true,
                patch_id: None,
            });
        }

        if let Some(existing) = self.find_by_file_path(file_path, owner).await? {
            let updated = self.overwrite_content(&existing, new_content).await?;
            return Ok(SavePatchOutcome {
                deleted: false,
                patch_id: Some(updated.id),
            });
        }

        let input = NewPatch {
            file_path: file_path.to_string(),
            content: new_content.clone(),
            kind: Some(PatchKind::Update),
            enabled: Some(true),
            application_id: owner.application_id(),
            compose_id: owner.compose_id(),
        };
        let saved = match self.create(input).await {
            Ok(created) => created,
            Err(AppError::Conflict(detail)) => {
                debug!(%detail, "Concurrent save won the insert, retrying as update");
                let existing = self
                    .find_by_file_path(file_path, owner)
                    .await?
                    .ok_or_else(|| AppError::Conflict(detail))?;
                self.overwrite_content(&existing, new_content).await?
            }
            Err(e) => return Err(e),
        };

        Ok(SavePatchOutcome {
            deleted: false,
            patch_id: Some(saved.id),
        })
    }

    /// A `delete` patch turns into an `update` once the file gets content.
    async fn overwrite_content(
        &self,
        existing: &patch::Model,
        content: String,
    ) -> Result<patch::Model> {
        let kind = (existing.kind == PatchKind::Delete).then_some(PatchKind::Update);
        self.update(
            &existing.id,
            PatchChanges {
                content: Some(content),
                kind,
                ..PatchChanges::default()
            },
        )
        .await
    }
}
