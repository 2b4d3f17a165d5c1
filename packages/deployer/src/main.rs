use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use common::path::{is_confined, normalize_lexical, read_valid_directory};
use tracing::{Level, info};

use deployer::config::AppConfig;
use deployer::database::init_db;
use deployer::drop::{extract_or_discard, unzip_drop};
use deployer::executor::ShellExecutor;
use deployer::logs::{LogQuery, fetch_logs};
use deployer::lookup::{EntityRecord, InMemoryLookup};
use deployer::models::patch::PatchOwner;
use deployer::services::{PatchService, apply_patches, generate_apply_patches_command};

#[derive(Parser)]
#[command(name = "deployer")]
#[command(about = "Confined archive extraction and patch application")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a ZIP archive into a directory
    Extract {
        archive: PathBuf,
        output: PathBuf,
        /// Strip the top-level folder when the archive has exactly one
        #[arg(long)]
        strip_root: bool,
    },
    /// Replace an application's code with an uploaded archive
    Drop {
        archive: PathBuf,
        #[arg(long)]
        app_name: String,
    },
    /// Check that a path stays inside a base directory
    CheckPath {
        path: PathBuf,
        /// Defaults to the configured base path
        #[arg(long)]
        base: Option<PathBuf>,
        /// Check against the remote base path
        #[arg(long)]
        remote: bool,
    },
    /// Print the logs of a container
    Logs {
        container_id: String,
        #[arg(long, default_value = "100")]
        tail: String,
        /// `all` or a duration such as `10m`
        #[arg(long, default_value = "all")]
        since: String,
        /// Keep only lines containing this text (case-insensitive)
        #[arg(long, default_value = "")]
        search: String,
        /// Run on this configured server instead of the local host
        #[arg(long)]
        server_id: Option<String>,
    },
    /// Inspect and apply stored patches
    Patches {
        #[command(subcommand)]
        command: PatchCommand,
    },
}

#[derive(Subcommand)]
enum PatchCommand {
    /// List the patches of an application or compose stack
    List {
        #[command(flatten)]
        owner: OwnerArgs,
    },
    /// Print the script applying the enabled patches
    Render {
        #[command(flatten)]
        owner: OwnerArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Render and run the script
    Apply {
        #[command(flatten)]
        owner: OwnerArgs,
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct OwnerArgs {
    #[arg(long)]
    application: Option<String>,
    #[arg(long)]
    compose: Option<String>,
}

impl OwnerArgs {
    fn into_owner(self) -> anyhow::Result<PatchOwner> {
        Ok(PatchOwner::from_refs(self.application, self.compose)?)
    }
}

#[derive(Args)]
struct TargetArgs {
    /// Directory name of the entity under the applications or compose root
    #[arg(long)]
    app_name: String,
    /// Run on this configured server instead of the local host
    #[arg(long)]
    server_id: Option<String>,
}

impl TargetArgs {
    fn lookup(self, owner: &PatchOwner) -> InMemoryLookup {
        let mut lookup = InMemoryLookup::new();
        lookup.insert(
            owner.clone(),
            EntityRecord {
                organization_id: String::new(),
                app_name: Some(self.app_name),
                server_id: self.server_id,
                source_type: None,
            },
        );
        lookup
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load config")?;

    match cli.command {
        Command::Extract {
            archive: archive_path,
            output,
            strip_root,
        } => {
            let bytes = std::fs::read(&archive_path)
                .with_context(|| format!("Failed to read {}", archive_path.display()))?;
            let summary = extract_or_discard(&bytes, &output, &config.extract, strip_root)?;
            println!(
                "{}",
                serde_json::json!({
                    "files": summary.files,
                    "directories": summary.directories,
                    "bytesWritten": summary.bytes_written,
                })
            );
        }
        Command::Drop {
            archive: archive_path,
            app_name,
        } => {
            let bytes = std::fs::read(&archive_path)
                .with_context(|| format!("Failed to read {}", archive_path.display()))?;
            let summary = unzip_drop(&bytes, &app_name, &config.paths, &config.extract)?;
            info!(files = summary.files, "Drop deployed");
        }
        Command::CheckPath { path, base, remote } => {
            let confined = match &base {
                Some(base) => is_confined(&path, base),
                None => read_valid_directory(&path, remote.then_some("remote"), &config.paths),
            };
            let base = base.unwrap_or_else(|| config.paths.resolve(remote).base_path);
            println!(
                "{}",
                serde_json::json!({
                    "path": normalize_lexical(&path),
                    "base": normalize_lexical(&base),
                    "confined": confined,
                })
            );
            if !confined {
                bail!("{} escapes {}", path.display(), base.display());
            }
        }
        Command::Logs {
            container_id,
            tail,
            since,
            search,
            server_id,
        } => {
            let query = LogQuery {
                container_id,
                tail,
                since,
                search,
            };
            let executor = ShellExecutor::new(config.servers.clone()).with_shell(&config.shell)?;
            let output = fetch_logs(&executor, &query, server_id.as_deref()).await?;
            print!("{}", output.stdout);
        }
        Command::Patches { command } => {
            let db = init_db(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            match command {
                PatchCommand::List { owner } => {
                    let owner = owner.into_owner()?;
                    let patches = PatchService::new(&db).find_by_owner(&owner).await?;
                    println!("{}", serde_json::to_string_pretty(&patches)?);
                }
                PatchCommand::Render { owner, target } => {
                    let owner = owner.into_owner()?;
                    let lookup = target.lookup(&owner);
                    let command =
                        generate_apply_patches_command(&db, &lookup, &config.paths, &owner)
                            .await?;
                    print!("{}", command.script);
                }
                PatchCommand::Apply { owner, target } => {
                    let owner = owner.into_owner()?;
                    let lookup = target.lookup(&owner);
                    let executor =
                        ShellExecutor::new(config.servers.clone()).with_shell(&config.shell)?;
                    match apply_patches(&db, &lookup, &config.paths, &executor, &owner).await? {
                        Some(output) => print!("{}", output.stdout),
                        None => info!("Nothing to apply"),
                    }
                }
            }
        }
    }

    Ok(())
}
