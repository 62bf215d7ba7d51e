//! PhotonDB Index command-line tool
//!
//! Inspect and maintain an on-disk cross-reference index.
//!
//! # Examples
//!
//! ```bash
//! # Start an empty index for the configuration in plugins.toml
//! photon-index --manifest plugins.toml --data-dir .index init
//!
//! # Verify it
//! photon-index --manifest plugins.toml --data-dir .index check
//!
//! # Who references a key?
//! photon-index --manifest plugins.toml --data-dir .index sources refs 'lib/A.java[run'
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use photon_index::config::{Configuration, ConfigurationBuilder};
use photon_index::progress::CancellationMonitor;
use photon_index::registry::{parse_manifest, FactoryCatalog, RegistryAdapter};
use photon_index::session::IndexSession;
use photon_index::telemetry::{init_logging, LogFormat, LoggingOptions};
use photon_index::{IndexSettings, SessionRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// PhotonDB Index - embedded cross-reference index store
#[derive(Parser, Debug)]
#[command(name = "photon-index")]
#[command(version = photon_index::VERSION)]
#[command(about = "Inspect and maintain a PhotonDB cross-reference index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Plugin registry manifest describing layers and processors
    #[arg(long, global = true, env = "PHOTON_INDEX_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Index directory
    #[arg(long, global = true, default_value = ".photon-index", env = "PHOTON_INDEX_DATA")]
    data_dir: PathBuf,

    /// Settings file (TOML); PHOTON_INDEX_* variables override it
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write daily rolling log files here
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty index (destroys existing data)
    Init,

    /// Run a consistency check
    Check,

    /// Print index statistics as JSON
    Stats,

    /// Rewrite the logs without superseded records
    Compact,

    /// List indexed files
    Files,

    /// Show the facts recorded for one file
    File { path: String },

    /// Keys reachable from SOURCE in LAYER
    Targets { layer: String, source: String },

    /// Keys referring to TARGET in LAYER
    Sources { layer: String, target: String },

    /// Delete the index
    Destroy {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingOptions {
        level: cli.log_level.clone(),
        format: cli.log_format,
        log_dir: cli.log_dir.clone(),
        ansi: !cli.no_color,
    })?;

    let configuration = Arc::new(load_configuration(cli.manifest.as_deref())?);
    let settings = IndexSettings::load(cli.settings.as_deref()).context("Failed to load settings")?;
    let mut session = IndexSession::open_with(
        &SessionRegistry::process(),
        &cli.data_dir,
        configuration,
        &photon_index::storage::IntegratedStorageFactory,
        settings,
    )?;

    let outcome = run(&session, cli.command).await;
    if let Err(e) = session.dispose() {
        warn!(error = %e, "Failed to dispose session");
    }
    outcome
}

async fn run(session: &IndexSession, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            session.create_new_index()?;
            println!("Created index at {}", session.root().display());
        }
        Commands::Check => check_command(session).await?,
        Commands::Stats => {
            open(session)?;
            let stats = session.gather_statistics()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Compact => {
            open(session)?;
            session.compact()?;
            println!("Compacted {}", session.root().display());
        }
        Commands::Files => {
            for path in open(session)?.indexed_files()? {
                println!("{}", path);
            }
        }
        Commands::File { path } => match open(session)?.file_info(&path)? {
            Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
            None => anyhow::bail!("{} is not indexed", path),
        },
        Commands::Targets { layer, source } => {
            for key in open(session)?.targets(&layer, &source)? {
                println!("{}", key);
            }
        }
        Commands::Sources { layer, target } => {
            for key in open(session)?.sources(&layer, &target)? {
                println!("{}", key);
            }
        }
        Commands::Destroy { yes } => {
            if !yes {
                anyhow::bail!("Refusing to destroy {} without --yes", session.root().display());
            }
            session.destroy_index()?;
            println!("Destroyed {}", session.root().display());
        }
    }
    Ok(())
}

fn open(session: &IndexSession) -> anyhow::Result<photon_index::Index> {
    session.open_existing_index().map_err(|e| {
        if e.requires_rebuild() {
            error!(root = ?session.root(), error = %e, "Index must be rebuilt");
            anyhow::anyhow!("{} (run `photon-index init` and re-index)", e)
        } else {
            e.into()
        }
    })
}

async fn check_command(session: &IndexSession) -> anyhow::Result<()> {
    open(session)?;
    let monitor = CancellationMonitor::new();
    let report = session.spawn_consistency_check(monitor.clone())?.await?;
    info!(
        units = report.units_checked,
        problems = report.problems.len(),
        "Consistency check finished"
    );

    for problem in &report.problems {
        println!("[{}] {}", problem.area, problem.message);
    }
    if report.cancelled {
        anyhow::bail!("Consistency check was cancelled");
    }
    if !report.is_consistent() {
        anyhow::bail!("{} consistency problem(s) found", report.problems.len());
    }
    println!("Index is consistent ({} units checked)", report.units_checked);
    Ok(())
}

/// Build the configuration from a registry manifest
///
/// Contributors are inert: this tool never extracts facts from sources.
fn load_configuration(manifest: Option<&Path>) -> anyhow::Result<Configuration> {
    let mut builder = ConfigurationBuilder::new();
    if let Some(path) = manifest {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let records = parse_manifest(&text)?;
        let catalog = FactoryCatalog::inert();
        RegistryAdapter::new(&catalog).apply(&records, &mut builder)?;
    } else {
        warn!("No manifest given, using an empty configuration");
    }
    Ok(builder.build()?)
}
