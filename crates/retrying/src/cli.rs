//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Retrying - re-run a command until it succeeds
#[derive(Parser, Debug)]
#[command(name = "retrying")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a retrying.yaml policy file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command, retrying it on non-zero exit
    Run(RunArgs),

    /// Validate the policy file
    Check(CheckArgs),
}

// Run command
//
// Numeric flags are signed so that invalid values reach validation and are
// reported together with every other configuration error.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Named policy from the policy file (falls back to `default`)
    #[arg(short, long)]
    pub policy: Option<String>,

    /// Maximum number of attempts
    #[arg(short = 'n', long, value_name = "N", allow_negative_numbers = true)]
    pub attempts: Option<i64>,

    /// Give up once this many milliseconds have passed
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub max_delay_ms: Option<i64>,

    /// Fixed wait between attempts, in milliseconds
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub wait_fixed_ms: Option<i64>,

    /// Random wait between attempts, drawn from [MIN, MAX) milliseconds
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        allow_negative_numbers = true
    )]
    pub wait_random_ms: Option<Vec<i64>>,

    /// Bytes of panic trace to keep
    #[arg(long, value_name = "BYTES", allow_negative_numbers = true)]
    pub stack_size: Option<i64>,

    /// Report every thread running an attempt when one panics
    #[arg(long)]
    pub all_threads: bool,

    /// Command to run, after `--`
    #[arg(required = true, last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

// Check command
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check this named policy
    #[arg(short, long)]
    pub policy: Option<String>,
}
