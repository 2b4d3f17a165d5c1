use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::patch::PatchOwner;

/// What the deployer needs to know about an application or compose stack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub organization_id: String,
    /// Directory name under the applications or compose root.
    #[serde(default)]
    pub app_name: Option<String>,
    /// `None` means the entity runs on the local host.
    #[serde(default)]
    pub server_id: Option<String>,
    /// Source provider the code was pulled from, e.g. `git` or `drop`.
    #[serde(default)]
    pub source_type: Option<String>,
}

/// Resolves applications and compose stacks owned by another system.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn find(&self, owner: &PatchOwner) -> Result<Option<EntityRecord>>;

    async fn get(&self, owner: &PatchOwner) -> Result<EntityRecord> {
        self.find(owner)
            .await?
            .ok_or_else(|| AppError::EntityNotFound(owner.to_string()))
    }
}

/// Lookup backed by a fixed map, used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLookup {
    records: HashMap<PatchOwner, EntityRecord>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, owner: PatchOwner, record: EntityRecord) -> &mut Self {
        self.records.insert(owner, record);
        self
    }
}

#[async_trait]
impl EntityLookup for InMemoryLookup {
    async fn find(&self, owner: &PatchOwner) -> Result<Option<EntityRecord>> {
        Ok(self.records.get(owner).cloned())
    }
}
