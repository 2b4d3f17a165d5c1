//! Turning stored patches into a shell script.
//!
//! Rendering happens in two stages: [`ApplyPlan::build`] produces an ordered
//! list of [`ApplyStep`]s, and [`ApplyPlan::to_posix_script`] flattens them
//! into `sh` text. Nothing here executes anything.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::path::{is_confined, normalize_lexical};
use common::shell::{QuoteError, quote_path};
use thiserror::Error;

use crate::entity::patch;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Code root could not be determined")]
    MissingCodeRoot,

    #[error("Patch target '{file_path}' escapes the code root")]
    PathEscapesCodeRoot { file_path: String },

    #[error("Cannot quote patch target: {0}")]
    Quote(#[from] QuoteError),
}

/// One filesystem operation of the generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStep {
    /// Remove the file if present; absence is not an error.
    Remove { path: PathBuf },
    /// Create the directory and its parents if missing.
    CreateParent { path: PathBuf },
    /// Decode `content_base64` into the file, truncating it.
    Write { path: PathBuf, content_base64: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    patch_count: usize,
    steps: Vec<ApplyStep>,
}

impl ApplyPlan {
    /// Builds the plan for the enabled patches, in the order given.
    pub fn build(code_root: &Path, patches: &[patch::Model]) -> Result<Self, RenderError> {
        if code_root.as_os_str().is_empty() {
            return Err(RenderError::MissingCodeRoot);
        }
        let root = normalize_lexical(code_root);

        let mut plan = Self::default();
        for p in patches.iter().filter(|p| p.enabled) {
            let target = normalize_lexical(root.join(&p.file_path));
            if target == root || !is_confined(&target, &root) {
                return Err(RenderError::PathEscapesCodeRoot {
                    file_path: p.file_path.clone(),
                });
            }

            plan.steps.push(ApplyStep::Remove {
                path: target.clone(),
            });
            if p.kind.writes_content() {
                if let Some(parent) = target.parent() {
                    plan.steps.push(ApplyStep::CreateParent {
                        path: parent.to_path_buf(),
                    });
                }
                plan.steps.push(ApplyStep::Write {
                    path: target,
                    content_base64: STANDARD.encode(p.content.as_bytes()),
                });
            }
            plan.patch_count += 1;
        }

        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.patch_count == 0
    }

    pub fn patch_count(&self) -> usize {
        self.patch_count
    }

    pub fn steps(&self) -> &[ApplyStep] {
        &self.steps
    }

    /// Flattens the plan into `sh` text. An empty plan renders as "".
    ///
    /// File content only ever appears base64-encoded, and every path is
    /// shell-quoted.
    pub fn to_posix_script(&self) -> Result<String, RenderError> {
        if self.is_empty() {
            return Ok(String::new());
        }

        let mut script = format!("echo \"Applying {} patch(es)...\";\n", self.patch_count);
        for step in &self.steps {
            match step {
                ApplyStep::Remove { path } => {
                    script.push('\n');
                    script.push_str(&format!("rm -f {};\n", quote_path(path)?));
                }
                ApplyStep::CreateParent { path } => {
                    script.push_str(&format!("mkdir -p {};\n", quote_path(path)?));
                }
                ApplyStep::Write {
                    path,
                    content_base64,
                } => {
                    script.push_str(&format!(
                        "printf '%s' '{content_base64}' | base64 -d > {};\n",
                        quote_path(path)?
                    ));
                }
            }
        }
        Ok(script)
    }
}

/// Renders the script applying the enabled `patches` under `code_root`.
///
/// Returns an empty string when no patch is enabled.
pub fn render_apply_command(
    code_root: &Path,
    patches: &[patch::Model],
) -> Result<String, RenderError> {
    ApplyPlan::build(code_root, patches)?.to_posix_script()
}
