//! Squirrly CLI
//!
//! Discovers a Flink deployment, profiles one of its task managers, relays the
//! flamegraph to the job manager and asks an LLM to explain it.

mod commands;
mod config;
mod output;

use clap::{Args, Parser, Subcommand};
use squirrly_lib::models::ProfilerMode;
use squirrly_lib::sink::Delivery;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Squirrly: flamegraph profiling and analysis for Flink jobs
#[derive(Parser)]
#[command(name = "squirrly")]
#[command(author, version, about = "Profile a Flink job and have an LLM explain the flamegraph", long_about = None)]
pub struct Cli {
    /// Write results to this file once the run finishes
    #[arg(long, short = 'o', global = true)]
    pub output_file: Option<PathBuf>,

    /// Write results to a generated file name in this directory
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Stream results to stdout as they are produced (default)
    #[arg(long, global = true, conflicts_with_all = ["output_file", "output_dir"])]
    pub inline: bool,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Format of the final run report
    #[arg(long, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Overrides for the layered configuration
#[derive(Args, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Kubernetes namespace of the deployment
    #[arg(long, short, global = true)]
    pub namespace: Option<String>,

    /// FlinkDeployment name
    #[arg(long, short, global = true)]
    pub deployment: Option<String>,

    /// Profiler mode (CPU, ITIMER, ALLOC)
    #[arg(long, short, global = true)]
    pub mode: Option<ProfilerMode>,

    /// Profiling duration in seconds
    #[arg(long, global = true)]
    pub duration: Option<u64>,

    /// Directory to search for the artifact on task managers (repeatable)
    #[arg(long = "search-path", global = true)]
    pub search_paths: Vec<String>,

    /// Analysis provider
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Analysis provider API key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// File holding the analysis prompt
    #[arg(long, global = true)]
    pub prompt_file: Option<PathBuf>,

    /// Container to exec into on Flink pods
    #[arg(long, global = true)]
    pub container: Option<String>,

    /// Flink REST URL as seen from inside the job manager
    #[arg(long, global = true)]
    pub control_api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Profile the deployment and analyse the result (default)
    Run,

    /// Deliver the log of a pod running squirrly
    Follow {
        /// Pod name
        pod: String,
    },
}

impl Cli {
    fn delivery(&self) -> Delivery {
        Delivery::resolve(self.output_file.clone(), self.output_dir.clone())
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result = match &cli.command {
        None | Some(Commands::Run) => commands::run::execute(&cli).await,
        Some(Commands::Follow { pod }) => commands::follow::execute(&cli, pod).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(1)
        }
    }
}
