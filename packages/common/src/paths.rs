use std::path::PathBuf;

use serde::Deserialize;

/// Filesystem roots for the local host and for remote servers.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    /// Base directory when commands run on this host. Default: "/etc/deployer".
    #[serde(default = "default_base")]
    pub local_base: PathBuf,
    /// Base directory on remote servers reached over SSH. Default: "/etc/deployer".
    #[serde(default = "default_base")]
    pub remote_base: PathBuf,
}

fn default_base() -> PathBuf {
    PathBuf::from("/etc/deployer")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            local_base: default_base(),
            remote_base: default_base(),
        }
    }
}

impl PathsConfig {
    /// Derive the well-known directories for the local or remote context.
    pub fn resolve(&self, remote: bool) -> Paths {
        let base = if remote {
            &self.remote_base
        } else {
            &self.local_base
        };
        Paths::under(base.clone())
    }
}

/// Concrete directory layout beneath one base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub base_path: PathBuf,
    pub applications_path: PathBuf,
    pub compose_path: PathBuf,
    pub logs_path: PathBuf,
    pub ssh_path: PathBuf,
}

impl Paths {
    pub fn under(base_path: PathBuf) -> Self {
        Self {
            applications_path: base_path.join("applications"),
            compose_path: base_path.join("compose"),
            logs_path: base_path.join("logs"),
            ssh_path: base_path.join("ssh"),
            base_path,
        }
    }
}
