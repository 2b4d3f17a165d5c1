//! Running generated shell scripts locally or on a configured server.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use common::shell::is_valid_shell;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::SshServerConfig;

pub const DEFAULT_SHELL: &str = "bash";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Feeding the script or collecting the output failed after spawning.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with code {code:?}: {stderr}")]
    NonZeroExit {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Shell not allowed: {0:?}")]
    ShellNotAllowed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a script either on the local host (`server_id == None`) or on the
/// named remote server.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        script: &str,
        server_id: Option<&str>,
    ) -> Result<CommandOutput, ExecError>;
}

/// Feeds the script to `bash -s` on the local host, or to `ssh ... bash -s`
/// for a remote server. The script never appears on a command line.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    servers: HashMap<String, SshServerConfig>,
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ShellExecutor {
    pub fn new(servers: HashMap<String, SshServerConfig>) -> Self {
        Self {
            servers,
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Runs scripts with `shell -s` instead of bash. Only the shells accepted
    /// by [`is_valid_shell`] can be used.
    pub fn with_shell(mut self, shell: &str) -> Result<Self, ExecError> {
        if !is_valid_shell(shell) {
            return Err(ExecError::ShellNotAllowed(shell.to_string()));
        }
        self.shell = shell.to_string();
        Ok(self)
    }

    fn command_for(&self, server_id: Option<&str>) -> Result<Command, ExecError> {
        let Some(server_id) = server_id else {
            let mut command = Command::new(&self.shell);
            command.arg("-s");
            return Ok(command);
        };

        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| ExecError::UnknownServer(server_id.to_string()))?;

        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(server.port.to_string());
        if let Some(identity) = &server.identity_file {
            command.arg("-i").arg(identity);
        }
        command
            .arg(format!("{}@{}", server.user, server.host))
            .arg(format!("{} -s", self.shell));
        Ok(command)
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    #[instrument(skip(self, script), fields(script_len = script.len()))]
    async fn execute(
        &self,
        script: &str,
        server_id: Option<&str>,
    ) -> Result<CommandOutput, ExecError> {
        let mut command = self.command_for(server_id)?;
        let program = command.as_std().get_program().to_string_lossy().into_owned();

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(|source| ExecError::Io {
                    program: program.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ExecError::Io { program, source })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(code = ?output.status.code(), "Script failed");
            return Err(ExecError::NonZeroExit {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        debug!(stdout_len = stdout.len(), "Script finished");
        Ok(CommandOutput { stdout, stderr })
    }
}
