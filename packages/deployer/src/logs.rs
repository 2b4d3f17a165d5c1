//! Container log commands built from caller-supplied options.
//!
//! Every option is checked against the allowlists in [`common::shell`]
//! before it reaches the command text.

use common::shell::{
    is_valid_container_id, is_valid_search, is_valid_since, is_valid_tail, quote_arg,
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::executor::{CommandExecutor, CommandOutput};
use crate::patch::RenderError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub container_id: String,
    /// Number of trailing lines. Default: "100".
    #[serde(default = "default_tail")]
    pub tail: String,
    /// `all` or a duration such as `10m`. Default: "all".
    #[serde(default = "default_since")]
    pub since: String,
    /// Case-insensitive fixed-string filter. Empty keeps every line.
    #[serde(default)]
    pub search: String,
}

fn default_tail() -> String {
    "100".into()
}
fn default_since() -> String {
    "all".into()
}

impl LogQuery {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            tail: default_tail(),
            since: default_since(),
            search: String::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_container_id(&self.container_id) {
            return Err(AppError::Validation(format!(
                "Invalid container id: {:?}",
                self.container_id
            )));
        }
        if !is_valid_tail(&self.tail) {
            return Err(AppError::Validation(format!("Invalid tail: {:?}", self.tail)));
        }
        if !is_valid_since(&self.since) {
            return Err(AppError::Validation(format!(
                "Invalid since: {:?}",
                self.since
            )));
        }
        if !is_valid_search(&self.search) {
            return Err(AppError::Validation("Invalid search filter".into()));
        }
        Ok(())
    }

    /// `docker container logs` for the query, piped through `grep -iF` when a
    /// search filter is set. A filter matching nothing is not an error.
    pub fn to_command(&self) -> Result<String> {
        self.validate()?;

        let mut command = format!("docker container logs --timestamps --tail {}", self.tail);
        if self.since != "all" {
            command.push_str(&format!(" --since {}", self.since));
        }
        command.push_str(&format!(" {} 2>&1", self.container_id));

        if !self.search.is_empty() {
            let pattern = quote_arg(&self.search).map_err(RenderError::from)?;
            command.push_str(&format!(" | grep -iF -- {pattern} || true"));
        }
        Ok(command)
    }
}

/// Fetches container logs locally or on `server_id`.
#[instrument(skip(executor))]
pub async fn fetch_logs<E>(
    executor: &E,
    query: &LogQuery,
    server_id: Option<&str>,
) -> Result<CommandOutput>
where
    E: CommandExecutor + ?Sized,
{
    let command = query.to_command()?;
    Ok(executor.execute(&command, server_id).await?)
}
