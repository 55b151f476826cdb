//! CLI entry point.

use clap::{Args, Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::EnvFilter;

/// Rivulet - decentralized publish/subscribe stream network
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct RivuletCli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub logs: LogArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log filter directives (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    pub log: String,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a local in-memory network: one tracker, N nodes, a publisher.
    Simulate(simulate_args::SimulateArgs),
}

pub mod simulate_args {
    use clap::Args;

    /// Arguments for the 'simulate' command.
    #[derive(Debug, Args)]
    pub struct SimulateArgs {
        /// Number of nodes in the network.
        #[arg(long, default_value_t = 8)]
        pub nodes: usize,

        /// Number of partitions of the simulated stream.
        #[arg(long, default_value_t = 1)]
        pub partitions: u32,

        /// Maximum neighbors assigned per node per partition.
        #[arg(long, default_value_t = 4)]
        pub max_neighbors_per_node: usize,

        /// Topology stabilization debounce in milliseconds.
        #[arg(long, default_value_t = 100)]
        pub debounce_wait_ms: u64,

        /// Topology stabilization staleness bound in milliseconds.
        #[arg(long, default_value_t = 2_000)]
        pub max_wait_ms: u64,

        /// Messages to publish per partition.
        #[arg(long, default_value_t = 10)]
        pub messages: u64,

        /// Delay between published messages in milliseconds.
        #[arg(long, default_value_t = 250)]
        pub publish_interval_ms: u64,
    }
}

fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Parse arguments, install error/log handlers and dispatch.
pub async fn run() -> Result<()> {
    color_eyre::install()?;
    let cli = RivuletCli::parse();
    init_logging(&cli.logs)?;

    match cli.command {
        Commands::Simulate(args) => crate::simulate::run(args).await,
    }
}
