use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listing_importer::{
    archive::MERGED_FILE_NAME,
    media::MediaDownloader,
    models::ImportStats,
    service::StatusResponse,
    stores::{FsArchiveStore, StateStore},
    trigger::HttpImportTrigger,
    ArchiveManager, Config, ImportService,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "listing-importer")]
#[command(about = "Merge, preview and import real-estate feed listings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a feed ZIP in a new archive and extract it
    ImportZip {
        /// Path to the downloaded feed ZIP
        zip: PathBuf,
    },

    /// Merge every listing file of an archive into properties.xml
    Merge {
        /// Archive directory or archive name
        archive: PathBuf,
    },

    /// Preview the listings of an archive
    Preview {
        archive: PathBuf,
    },

    /// Save the selected record positions, e.g. "1,3,4"
    Select {
        positions: String,
    },

    /// Re-extract an archive's ZIP and rebuild properties.xml
    Regenerate {
        archive: PathBuf,
    },

    /// Show the last merge, the selection and the last import counts
    Status,

    /// List archives, newest first
    Archives,

    /// Delete an archive
    Delete {
        archive: PathBuf,
    },

    /// Record the current selection as imported
    Confirm {
        #[arg(long, default_value = "0")]
        count: u64,
        #[arg(long, default_value = "0")]
        imported: u64,
        #[arg(long, default_value = "0")]
        created: u64,
        #[arg(long, default_value = "0")]
        updated: u64,
        #[arg(long, default_value = "0")]
        skipped: u64,
        #[arg(long, default_value = "0")]
        deleted: u64,
    },

    /// Start the external import
    Trigger,

    /// Download attachment images for the listings of an archive
    Media {
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr, responses to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let service = build_service(&config).await?;

    match cli.command {
        Commands::ImportZip { zip } => {
            let bytes = tokio::fs::read(&zip)
                .await
                .with_context(|| format!("Failed to read {}", zip.display()))?;
            let response = service.import_zip(&bytes).await;
            print(&response, response.success)
        }
        Commands::Merge { archive } => {
            let archive = resolve_archive(&config, &archive);
            match service.archive_sources(&archive).await {
                Ok((archive, files)) => {
                    let output = archive.path.join(MERGED_FILE_NAME);
                    let response = service.extract_and_merge(&files, &output).await;
                    print(&response, response.success)
                }
                Err(err) => print(&StatusResponse::failed(err), false),
            }
        }
        Commands::Preview { archive } => {
            let response = service
                .preview_archive(&resolve_archive(&config, &archive))
                .await;
            print(&response, response.success)
        }
        Commands::Select { positions } => {
            let response = service.save_selection(&positions).await;
            print(&response, response.success)
        }
        Commands::Regenerate { archive } => {
            let response = service.regenerate(&resolve_archive(&config, &archive)).await;
            print(&response, response.success)
        }
        Commands::Status => {
            let response = service.status().await;
            print(&response, response.success)
        }
        Commands::Archives => {
            let response = service.list_archives().await;
            print(&response, response.success)
        }
        Commands::Delete { archive } => {
            let response = service
                .delete_archive(&resolve_archive(&config, &archive))
                .await;
            print(&response, response.success)
        }
        Commands::Confirm {
            count,
            imported,
            created,
            updated,
            skipped,
            deleted,
        } => {
            let stats = ImportStats {
                count,
                imported,
                created,
                updated,
                skipped,
                deleted,
            };
            let response = service.confirm_import(stats).await;
            print(&response, response.success)
        }
        Commands::Trigger => {
            let response = service.trigger_import().await;
            print(&response, response.success)
        }
        Commands::Media { archive } => {
            let archive = resolve_archive(&config, &archive);
            match service.archive_sources(&archive).await {
                Ok((_, files)) => {
                    let response = service.download_media(&files).await;
                    print(&response, response.success)
                }
                Err(err) => print(&StatusResponse::failed(err), false),
            }
        }
    }
}

async fn build_service(config: &Config) -> Result<ImportService> {
    info!("Archive root: {}", config.archive_dir.display());

    let archives = ArchiveManager::new(Arc::new(FsArchiveStore), &config.archive_dir);
    let state = Arc::new(
        StateStore::open(&config.state_file)
            .await
            .context("Failed to open state file")?,
    );

    let mut service = ImportService::new(archives, state.clone(), state)
        .with_media(MediaDownloader::new(&config.media_dir, config.http_timeout)?);
    if let Some(trigger) = HttpImportTrigger::from_config(config)? {
        service = service.with_trigger(Arc::new(trigger));
    }
    Ok(service)
}

/// Bare archive names are looked up under the archive root
fn resolve_archive(config: &Config, archive: &Path) -> PathBuf {
    if archive.components().count() == 1 && archive.is_relative() {
        config.archive_dir.join(archive)
    } else {
        archive.to_path_buf()
    }
}

fn print<T: Serialize>(response: &T, success: bool) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
