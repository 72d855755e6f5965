//! Folio main entry point
//!
//! This is the command-line interface for the Folio virtual-folder service.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use folio::config::load_config_with_hash;
use folio::{CrawlOutcome, ResourceKind, ResourceService, TenantRoot};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Folio: per-tenant virtual folders for static assets
///
/// Folio stores folders and files per tenant, unpacks zip archives into
/// them and ingests web pages together with the resources they embed.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "Per-tenant virtual folders for static assets", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Tenant root to operate on (default namespace when omitted)
    #[arg(short, long, default_value = "")]
    tenant: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a folder
    Ls {
        #[arg(default_value = "/")]
        path: String,

        /// List the whole subtree
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show one resource
    Stat { path: String },

    /// Create a folder under an existing parent
    Mkdir { parent: String, name: String },

    /// Remove a resource (folders recursively)
    Rm { path: String },

    /// Copy a resource; folders merge into an existing destination
    Cp { source: String, destination: String },

    /// Print a file to stdout
    Cat { path: String },

    /// Upload a local file
    Put { local: PathBuf, destination: String },

    /// Extract a zip archive stored in the tree
    Extract {
        zip: String,

        /// Extract into a new folder named after the archive
        #[arg(long)]
        create_folder: bool,

        /// Remove the archive after a complete extraction
        #[arg(long)]
        remove_zip: bool,
    },

    /// Pack a folder into a local zip file
    Export { folder: String, output: PathBuf },

    /// Ingest a web page into a folder
    Crawl {
        parent: String,
        url: String,

        /// Also ingest linked same-site pages
        #[arg(long)]
        follow_links: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    let root = TenantRoot::new(cli.tenant.clone()).context("invalid --tenant")?;
    let service = ResourceService::from_config(config)?;

    if let Err(e) = run(&service, &root, cli.command).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("folio=info,warn"),
            1 => EnvFilter::new("folio=debug,info"),
            2 => EnvFilter::new("folio=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(service: &ResourceService, root: &TenantRoot, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ls { path, recursive } => handle_ls(service, root, &path, recursive),
        Command::Stat { path } => handle_stat(service, root, &path),
        Command::Mkdir { parent, name } => {
            let folder = service.add_folder(root, &parent, &name)?;
            println!("{}", folder.path);
            Ok(())
        }
        Command::Rm { path } => {
            service.remove_resource(root, &path)?;
            Ok(())
        }
        Command::Cp {
            source,
            destination,
        } => {
            let copied = service.copy_resource(root, &source, &destination)?;
            println!("{}", copied.path);
            Ok(())
        }
        Command::Cat { path } => {
            let mut reader = service.open_input_stream(root, &path)?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            std::io::stdout().write_all(&data)?;
            Ok(())
        }
        Command::Put { local, destination } => handle_put(service, root, &local, &destination),
        Command::Extract {
            zip,
            create_folder,
            remove_zip,
        } => {
            let report = service.extract_zip(root, &zip, create_folder, remove_zip)?;
            println!(
                "Extracted {} files and {} folders into {}{}",
                report.files_written.len(),
                report.folders_created,
                report.target,
                if report.archive_removed { " (archive removed)" } else { "" }
            );
            Ok(())
        }
        Command::Export { folder, output } => {
            let bytes = service.export_zip(root, &folder)?;
            std::fs::write(&output, bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {}", output.display());
            Ok(())
        }
        Command::Crawl {
            parent,
            url,
            follow_links,
        } => handle_crawl(service, root, &parent, &url, follow_links).await,
    }
}

fn handle_ls(
    service: &ResourceService,
    root: &TenantRoot,
    path: &str,
    recursive: bool,
) -> anyhow::Result<()> {
    let resources = if recursive {
        let folder = service.resolve(root, path)?;
        service.tree().list_subtree(root, &folder)?
    } else {
        service.get_resources(root, path)?
    };

    for resource in resources {
        match resource.kind {
            ResourceKind::Folder => println!("{:>10}  {}/", "-", resource.path),
            ResourceKind::File => println!("{:>10}  {}", resource.size, resource.path),
        }
    }
    Ok(())
}

fn handle_stat(service: &ResourceService, root: &TenantRoot, path: &str) -> anyhow::Result<()> {
    let Some(resource) = service.get_resource(root, path)? else {
        bail!("nothing at {}", path);
    };

    println!("Path:     {}", resource.path);
    println!("Kind:     {}", resource.kind);
    println!("Size:     {}", resource.size);
    match resource.last_modified {
        Some(ts) => println!("Modified: {}", ts.to_rfc3339()),
        None => println!("Modified: -"),
    }
    Ok(())
}

fn handle_put(
    service: &ResourceService,
    root: &TenantRoot,
    local: &Path,
    destination: &str,
) -> anyhow::Result<()> {
    let data = std::fs::read(local).with_context(|| format!("reading {}", local.display()))?;

    let mut writer = service.open_output_stream(root, destination)?;
    writer.write_all(&data)?;
    let stored = writer.finish()?;
    println!("{} ({} bytes)", stored.path, stored.size);
    Ok(())
}

async fn handle_crawl(
    service: &ResourceService,
    root: &TenantRoot,
    parent: &str,
    url: &str,
    follow_links: bool,
) -> anyhow::Result<()> {
    let handle = service.crawl_web_page(root, parent, url, follow_links)?;

    match handle.wait().await {
        CrawlOutcome::Done(report) => {
            println!("=== Crawl of {} ===", report.seed);
            println!("Pages written: {}", report.pages_written.len());
            for page in &report.pages_written {
                println!("  {}", page);
            }
            println!("Resources written: {}", report.resources_written.len());
            if !report.failures.is_empty() {
                println!("Failures: {}", report.failures.len());
                for failure in &report.failures {
                    println!("  {}: {}", failure.url, failure.error);
                }
            }
            Ok(())
        }
        CrawlOutcome::Failed { seed, error } => bail!("crawl of {} failed: {}", seed, error),
    }
}
