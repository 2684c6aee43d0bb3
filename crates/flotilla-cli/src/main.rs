//! Flotilla CLI - fleet navigation for one step.
//!
//! Single binary that provides:
//! - `flotilla resolve` - plan one step from a snapshot and print the commands
//! - `flotilla check` - validate a snapshot without planning

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use flotilla_nav::{NavConfig, NavRequest, Navigator, World};

/// Config picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG: &str = "flotilla.yaml";

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(about = "Simultaneous fleet navigation", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan one step for every request in a snapshot
    Resolve {
        /// Snapshot file (JSON with `world` and `requests`)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Navigation config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print turn-protocol moves instead of JSON
        #[arg(long)]
        wire: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a snapshot without planning
    Check {
        /// Snapshot file (JSON with `world` and `requests`)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Navigation config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// One step's input.
#[derive(Debug, Deserialize)]
struct Snapshot {
    world: World,
    #[serde(default)]
    requests: Vec<NavRequest>,
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot from {}", path.display()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout carries the commands
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            snapshot,
            config,
            wire,
            pretty,
        } => resolve(&snapshot, config.as_deref(), wire, pretty),
        Commands::Check { snapshot, config } => check(&snapshot, config.as_deref()),
    }
}

fn load_config(config_path: Option<&Path>) -> Result<NavConfig> {
    match config_path {
        Some(path) => NavConfig::load(path),
        None => NavConfig::load_or_default(Path::new(DEFAULT_CONFIG)),
    }
}

fn resolve(snapshot_path: &Path, config_path: Option<&Path>, wire: bool, pretty: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = Snapshot::load(snapshot_path)?;

    let mut navigator = Navigator::new(config);
    let resolution = navigator
        .resolve(&snapshot.world, &snapshot.requests)
        .with_context(|| format!("Rejected snapshot {}", snapshot_path.display()))?;

    tracing::info!(
        commands = resolution.commands.len(),
        frozen = resolution.frozen.len(),
        degraded = resolution.degraded,
        "Resolved step"
    );

    if wire {
        println!("{}", resolution.to_wire());
    } else if pretty {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        println!("{}", serde_json::to_string(&resolution)?);
    }
    Ok(())
}

fn check(snapshot_path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = Snapshot::load(snapshot_path)?;
    let world = &snapshot.world;
    world
        .validate(&config.grid)
        .and_then(|()| world.validate_requests(&snapshot.requests))
        .with_context(|| format!("Rejected snapshot {}", snapshot_path.display()))?;

    let friendly = world.agents.iter().filter(|a| world.is_friendly(a)).count();
    println!("Snapshot {}", snapshot_path.display());
    println!("  field: {} x {}", world.width, world.height);
    println!(
        "  agents: {} ({} friendly, {} enemy)",
        world.agents.len(),
        friendly,
        world.agents.len() - friendly
    );
    println!("  obstacles: {}", world.obstacles.len());
    println!("  requests: {}", snapshot.requests.len());
    Ok(())
}
