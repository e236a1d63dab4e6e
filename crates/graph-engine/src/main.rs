use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fraudgraph_core::config::BuildConfig;
use fraudgraph_core::graph::GraphBuilder;
use fraudgraph_core::persistence::{load_summary, ArtifactWriter, SUMMARY_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "fraudgraph")]
#[command(author, version, about = "Build a transaction/address graph from Elliptic++ CSV exports")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph and write artifact, summary and id mappings.
    Build(BuildArgs),
    /// Print the summary of an already built graph.
    Summary {
        /// Directory a previous build wrote to
        output_dir: PathBuf,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// JSON file with build options; flags below take precedence
    #[arg(long)]
    config: Option<PathBuf>,
    /// Raw CSV directory [fallback: $FRAUDGRAPH_DATA_ROOT]
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// Output directory [fallback: $FRAUDGRAPH_OUTPUT_DIR]
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Keep only the K most active addresses
    #[arg(long)]
    top_k_addresses: Option<usize>,
    /// Load every address, ignoring the cap
    #[arg(long)]
    all_addresses: bool,
    #[arg(long)]
    train_frac: Option<f64>,
    #[arg(long)]
    val_frac: Option<f64>,
}

impl BuildArgs {
    /// Flags over config file over environment over built-in defaults.
    fn into_config<F>(self, env: F) -> Result<BuildConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BuildConfig::resolve(self.config.as_deref(), env).with_context(|| {
            match &self.config {
                Some(path) => format!("failed to load config {}", path.display()),
                None => "failed to resolve build options".to_string(),
            }
        })?;
        if let Some(data_root) = self.data_root {
            config.data_root = data_root;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(k) = self.top_k_addresses {
            config.top_k_addresses = Some(k);
        }
        if self.all_addresses {
            config.use_all_addresses = true;
        }
        if let Some(f) = self.train_frac {
            config.train_frac = f;
        }
        if let Some(f) = self.val_frac {
            config.val_frac = f;
        }
        Ok(config)
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    let config = args.into_config(|key| std::env::var(key).ok())?;
    let graph = GraphBuilder::new(&config)
        .build()
        .context("graph build failed")?;
    let paths = ArtifactWriter::new(&config.output_dir)
        .persist(&graph)
        .with_context(|| format!("failed to write outputs to {}", config.output_dir.display()))?;

    for relation in graph.metadata.relations.iter().filter(|r| r.absent_reason.is_some()) {
        info!(relation = %relation.relation.name(), "built without optional relation");
    }
    println!("Graph written to {}", paths.graph.display());
    println!("Summary:  {}", paths.summary.display());
    println!("Mappings: {}", paths.mappings.display());
    Ok(())
}

fn run_summary(output_dir: PathBuf) -> Result<()> {
    let summary = load_summary(&output_dir.join(SUMMARY_FILE))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Summary { output_dir } => run_summary(output_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
