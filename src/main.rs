use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docstore_files::{
    default_area_from_env_value, storage_areas_from_env_value, Charset, DocId, FileVersion,
    FsStorer, MigrationCoordinator, ResourceName, StorageId, StoreConfig, Storer,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docstore")]
#[command(about = "Document resource storage administration")]
struct Cli {
    /// JSON configuration file; overrides DOCSTORE_AREAS and DOCSTORE_DEFAULT_AREA
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Identifies one resource of a document
#[derive(Args)]
struct ResourceArgs {
    /// Document id
    doc_id: DocId,
    /// File version, e.g. 1.0
    #[arg(long)]
    version: Option<FileVersion>,
    /// Artifact suffix, e.g. conversion.pdf
    #[arg(long)]
    suffix: Option<String>,
    /// Storage area (defaults to the configured default area)
    #[arg(long)]
    area: Option<StorageId>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured storage areas
    Areas,
    /// Store a local file as a resource
    Store {
        #[command(flatten)]
        resource: ResourceArgs,
        /// File to store
        #[arg(long)]
        file: PathBuf,
    },
    /// Print a resource, or copy it to a file
    Get {
        #[command(flatten)]
        resource: ResourceArgs,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Decode as text with this charset (utf-8, iso-8859-1)
        #[arg(long)]
        charset: Option<Charset>,
    },
    /// Print the size of a resource (0 if absent)
    Size {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Print size and modification time of a resource as JSON
    Info {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Print the SHA-256 of a resource
    Digest {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// List the resources of a document
    List {
        /// Document id
        doc_id: DocId,
        /// Only resources of this version
        #[arg(long)]
        version: Option<FileVersion>,
        #[arg(long)]
        area: Option<StorageId>,
    },
    /// Delete one resource
    Delete {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Delete every resource of a document
    Purge {
        /// Document id
        doc_id: DocId,
        #[arg(long)]
        area: Option<StorageId>,
    },
    /// Move documents' resources to another storage area
    Move {
        /// Document ids
        #[arg(required = true, num_args = 1..)]
        doc_ids: Vec<DocId>,
        /// Area the documents currently live on
        #[arg(long)]
        from: StorageId,
        /// Area to move them to
        #[arg(long)]
        to: StorageId,
    },
}

/// Resolve the storage configuration once, at startup.
///
/// # Environment Variables
/// - `DOCSTORE_AREAS`: storage areas as `id=path[,id=path...]`
/// - `DOCSTORE_DEFAULT_AREA`: area used when a command names none (default: lowest id)
fn load_config(config_file: Option<&Path>) -> anyhow::Result<StoreConfig> {
    if let Some(path) = config_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        return Ok(StoreConfig::from_json(&text)?);
    }

    let areas = storage_areas_from_env_value(std::env::var("DOCSTORE_AREAS").ok())?;
    let default_area =
        default_area_from_env_value(std::env::var("DOCSTORE_DEFAULT_AREA").ok(), &areas)?;
    Ok(StoreConfig::new(areas, default_area)?)
}

fn resolve(
    storer: &FsStorer,
    args: &ResourceArgs,
) -> anyhow::Result<(StorageId, DocId, ResourceName)> {
    let area = args.area.unwrap_or(storer.config().default_area());
    let resource = storer.resource_name(args.version.as_ref(), args.suffix.as_deref())?;
    Ok((area, args.doc_id, resource))
}

fn run(storer: &FsStorer, command: Commands) -> anyhow::Result<()> {
    let default_area = storer.config().default_area();
    let mut stdout = std::io::stdout().lock();

    match command {
        Commands::Areas => {
            for area in storer.areas().iter() {
                let status = match area.check_root() {
                    Ok(()) => "ok".to_string(),
                    Err(e) => e.to_string(),
                };
                let marker = if area.id() == default_area { "*" } else { " " };
                writeln!(
                    stdout,
                    "{}{}\t{}\t{}",
                    marker,
                    area.id(),
                    area.root().display(),
                    status
                )?;
            }
        }
        Commands::Store { resource, file } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            let bytes = storer.store_file(area, &file, doc_id, &name)?;
            tracing::info!(
                "stored {} as {} of document {} on area {} ({} bytes)",
                file.display(),
                name,
                doc_id,
                area,
                bytes
            );
        }
        Commands::Get {
            resource,
            output,
            charset,
        } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            match (output, charset) {
                (Some(path), _) => {
                    storer.write_to_file(area, doc_id, &name, &path)?;
                }
                (None, Some(charset)) => {
                    let text = storer.get_string(area, doc_id, &name, charset)?;
                    stdout.write_all(text.as_bytes())?;
                }
                (None, None) => {
                    let mut stream = storer.get_stream(area, doc_id, &name)?;
                    std::io::copy(&mut stream, &mut stdout)?;
                }
            }
        }
        Commands::Size { resource } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            writeln!(stdout, "{}", storer.size(area, doc_id, &name)?)?;
        }
        Commands::Info { resource } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            let info = storer.info(area, doc_id, &name)?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&info)?)?;
        }
        Commands::Digest { resource } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            writeln!(stdout, "{}", storer.digest(area, doc_id, &name)?)?;
        }
        Commands::List {
            doc_id,
            version,
            area,
        } => {
            let area = area.unwrap_or(default_area);
            for resource in storer.list_resources(area, doc_id, version.as_ref())? {
                writeln!(stdout, "{}", resource?)?;
            }
        }
        Commands::Delete { resource } => {
            let (area, doc_id, name) = resolve(storer, &resource)?;
            storer.delete(area, doc_id, &name)?;
        }
        Commands::Purge { doc_id, area } => {
            let area = area.unwrap_or(default_area);
            let removed = storer.delete_all(area, doc_id)?;
            tracing::info!(
                "removed {} resources of document {} from area {}",
                removed,
                doc_id,
                area
            );
        }
        Commands::Move { doc_ids, from, to } => {
            let report = MigrationCoordinator::new(storer.areas()).move_documents(doc_ids, from, to)?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&report)?)?;
            if !report.is_complete() {
                anyhow::bail!(
                    "{} of {} resources could not be moved",
                    report.failed_count(),
                    report.failed_count() + report.moved_count()
                );
            }
        }
    }

    Ok(())
}

/// Entry point for the docstore administration tool
///
/// Configuration is read once from the environment (a `.env` file is honoured) or from
/// the file given with `--config`, and then handed to the storer.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docstore=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'docstore --help' for commands");
        return Ok(());
    };

    let storer = FsStorer::new(load_config(cli.config.as_deref())?);
    run(&storer, command)
}
