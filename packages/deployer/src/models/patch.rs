use std::fmt;

use common::PatchKind;
use serde::{Deserialize, Serialize};

use crate::entity::patch;
use crate::error::AppError;

/// The entity a patch belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum PatchOwner {
    Application(String),
    Compose(String),
}

impl PatchOwner {
    /// Builds an owner from the two optional references a caller may send.
    /// Empty strings count as absent.
    pub fn from_refs(
        application_id: Option<String>,
        compose_id: Option<String>,
    ) -> Result<Self, AppError> {
        let application_id = application_id.filter(|id| !id.is_empty());
        let compose_id = compose_id.filter(|id| !id.is_empty());
        match (application_id, compose_id) {
            (Some(id), None) => Ok(Self::Application(id)),
            (None, Some(id)) => Ok(Self::Compose(id)),
            _ => Err(AppError::InvalidPatchOwner),
        }
    }

    pub fn from_model(model: &patch::Model) -> Result<Self, AppError> {
        Self::from_refs(model.application_id.clone(), model.compose_id.clone())
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Application(id) | Self::Compose(id) => id,
        }
    }

    pub fn application_id(&self) -> Option<String> {
        match self {
            Self::Application(id) => Some(id.clone()),
            Self::Compose(_) => None,
        }
    }

    pub fn compose_id(&self) -> Option<String> {
        match self {
            Self::Compose(id) => Some(id.clone()),
            Self::Application(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Application(_) => "application",
            Self::Compose(_) => "compose",
        }
    }
}

impl fmt::Display for PatchOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Input for creating a patch.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatch {
    pub file_path: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<PatchKind>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub compose_id: Option<String>,
}

/// Partial update of a patch. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchChanges {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<PatchKind>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Result of saving live-edited file content as a patch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePatchOutcome {
    /// True when the content matched the repository and no patch remains.
    pub deleted: bool,
    pub patch_id: Option<String>,
}

/// Rejects file paths that could leave the code root once joined onto it.
pub fn validate_file_path(path: &str) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::Validation("File path cannot be empty".into()));
    }
    if path.contains('\0') {
        return Err(AppError::Validation(
            "File path must not contain null bytes".into(),
        ));
    }
    if path.chars().any(|c| c.is_ascii_control()) {
        return Err(AppError::Validation(
            "File path must not contain control characters".into(),
        ));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(AppError::Validation("File path must be relative".into()));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(AppError::Validation(
            "File path must not contain '..' segments".into(),
        ));
    }
    if path
        .split(['/', '\\'])
        .all(|segment| segment.is_empty() || segment == ".")
    {
        return Err(AppError::Validation(
            "File path must name a file below the code root".into(),
        ));
    }
    Ok(())
}

/// Content written by `create`/`update` always ends with a newline.
pub fn normalize_content(kind: PatchKind, content: String) -> String {
    if kind.writes_content() && !content.ends_with('\n') {
        let mut content = content;
        content.push('\n');
        content
    } else {
        content
    }
}
