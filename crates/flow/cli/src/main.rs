//! flowctl - Command-line tooling for approval flow graphs
//!
//! - Convert definition graphs between JSON and the binary graph format
//! - Validate graphs before publishing
//! - Replay a scripted run of an instance against an in-memory engine
//! - Show the effective engine configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flow_engine::EngineConfig;
use flow_types::DefinitionGraph;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod simulate;

/// flowctl application
#[derive(Parser)]
#[command(name = "flowctl")]
#[command(about = "Approval Flow - definition graph tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "FLOW_CONFIG", default_value = "flow.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON graph into the binary graph format
    Encode {
        /// JSON graph file
        input: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decode a binary graph and print it as JSON
    Decode {
        /// Binary graph file
        input: PathBuf,
    },

    /// Validate a graph (JSON or binary)
    Validate {
        /// Graph file
        input: PathBuf,
    },

    /// Run a scripted instance against a graph and print its trail
    Simulate {
        /// Graph file (JSON or binary)
        graph: PathBuf,
        /// Script file (JSON)
        script: PathBuf,
    },

    /// Show the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let config = EngineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Encode { input, output } => {
            let graph = read_graph(&input)?;
            graph.validate()?;
            let bytes = flow_codec::encode(&graph)?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(
                graph_id = %graph.id,
                bytes = bytes.len(),
                output = %output.display(),
                "Graph encoded"
            );
        }
        Commands::Decode { input } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let graph = flow_codec::decode(&bytes)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Validate { input } => {
            let graph = read_graph(&input)?;
            graph.validate()?;
            println!(
                "✓ {} (version {}): {} nodes, {} relations",
                graph.title,
                graph.version,
                graph.node_count(),
                graph.relation_count()
            );
        }
        Commands::Simulate { graph, script } => {
            let graph = read_graph(&graph)?;
            let script = simulate::Script::load(&script)?;
            let trail = simulate::run(config, graph, script).await?;
            println!("{}", serde_json::to_string_pretty(&trail)?);
        }
        Commands::Config => {
            println!("Config file: {}", cli.config.display());
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Read a graph from JSON, or from the binary format when the file starts with its magic
fn read_graph(path: &Path) -> Result<DefinitionGraph> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.starts_with(&flow_codec::GRAPH_MAGIC) {
        return Ok(flow_codec::decode(&bytes)?);
    }
    match serde_json::from_slice(&bytes) {
        Ok(graph) => Ok(graph),
        Err(e) => bail!("{} is neither a binary graph nor graph JSON: {}", path.display(), e),
    }
}
