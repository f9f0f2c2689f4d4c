//! CLI for the poolrace load generator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use poolrace_core::config;

use commands::{run_check, run_config, run_load, RunOverrides};

/// Top-level CLI for poolrace.
#[derive(Debug, Parser)]
#[command(name = "poolrace")]
#[command(about = "poolrace: concurrent query load against a replicated SQL store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send the workload query with bounded concurrency and retries.
    Run {
        /// Keep at most N store calls in flight (overrides config).
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
        /// Number of tasks to run (default: concurrency * 10000).
        #[arg(long, value_name = "N", conflicts_with = "forever")]
        tasks: Option<u64>,
        /// Run until interrupted with Ctrl-C.
        #[arg(long)]
        forever: bool,
        /// Query text to send (default depends on the dialect).
        #[arg(long, value_name = "SQL")]
        query: Option<String>,
        /// Send the query to the write primary instead of the read replicas.
        #[arg(long)]
        write: bool,
    },

    /// Connect to every configured target once and report.
    Check,

    /// Print the effective configuration (file plus environment).
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                concurrency,
                tasks,
                forever,
                query,
                write,
            } => {
                let overrides = RunOverrides {
                    concurrency,
                    tasks,
                    forever,
                    query,
                    write,
                };
                run_load(cfg, overrides).await?;
            }
            CliCommand::Check => run_check(&cfg).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
