#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of mutation a stored patch performs on its target file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    /// Write a file that does not exist in the repository.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "create"))]
    Create,
    /// Replace the content of an existing file.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "update"))]
    Update,
    /// Remove the file.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "delete"))]
    Delete,
}

impl PatchKind {
    pub const ALL: &'static [PatchKind] = &[Self::Create, Self::Update, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the patch carries file content that gets written out.
    pub fn writes_content(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for PatchKind {
    fn default() -> Self {
        Self::Update
    }
}

/// Error when parsing an invalid patch kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePatchKindError {
    invalid: String,
}

impl fmt::Display for ParsePatchKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid patch kind '{}'. Valid values: {}",
            self.invalid,
            PatchKind::ALL
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ParsePatchKindError {}

impl FromStr for PatchKind {
    type Err = ParsePatchKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(ParsePatchKindError {
                invalid: s.to_string(),
            }),
        }
    }
}
