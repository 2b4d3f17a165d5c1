use common::PatchKind;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stored file mutation applied to an application's or compose stack's
/// checked-out code before deploy.
///
/// Exactly one of `application_id` / `compose_id` is set; see
/// [`crate::models::patch::PatchOwner`].
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patch")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub kind: PatchKind,
    /// Relative to the code root, never absolute, never containing `..`.
    pub file_path: String,
    pub enabled: bool,
    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub application_id: Option<String>,
    pub compose_id: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
