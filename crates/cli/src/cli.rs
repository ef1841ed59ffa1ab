use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Job scheduling engine for asynchronous transfer and recall requests.
///
/// Lists the available strategies, validates settings files and runs
/// synthetic workloads through the reference scheduler.
#[derive(Parser, Debug)]
#[command(name = "srm-sched", about = "Fair-share job scheduler for transfer and recall requests")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered scheduling strategies, transfer strategies and discriminators
    Strategies,

    /// Load and validate a settings file and build both strategies from it
    Check {
        /// Path to the TOML settings file
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Run a synthetic workload and print dispatch statistics as JSON
    Simulate {
        /// Path to the TOML settings file (defaults plus SRM_SCHED_* overrides if omitted)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Number of distinct job owners
        #[arg(long, default_value = "4")]
        users: usize,

        /// Number of jobs to submit
        #[arg(long, default_value = "200")]
        jobs: usize,

        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        seconds: u64,

        /// Simulated execution time per job in milliseconds
        #[arg(long, default_value = "5")]
        execute_ms: u64,

        /// Number of tapes the synthetic files are spread over
        #[arg(long, default_value = "3")]
        tapes: usize,
    },
}
