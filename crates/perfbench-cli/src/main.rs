use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod http;

#[derive(Parser, Debug)]
#[command(name = "perfbench")]
#[command(about = "Micro-benchmark harness for document database servers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the selected test cases and print the report
    Run(RunArgs),
    /// Compare a report against a baseline
    Check(CheckArgs),
    /// Pull the JSON report out of captured console output
    Extract(ExtractArgs),
}

/// Flags of `perfbench run`. Unset flags keep the configured value.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Settings file (defaults to PERFBENCH_CONFIG and ./config/perfbench)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Test declaration files
    #[arg(short = 'f', long = "testfiles", num_args = 1.., required = true)]
    pub testfiles: Vec<PathBuf>,

    /// Thread counts to run
    #[arg(short = 't', long = "threads", num_args = 1..)]
    pub threads: Vec<u32>,

    /// Number of databases to fan out to
    #[arg(short = 'm', long)]
    pub multidb: Option<u32>,

    /// Number of collections per database
    #[arg(short = 'c', long)]
    pub multicoll: Option<u32>,

    /// Seconds per trial
    #[arg(long)]
    pub trial_time: Option<u64>,

    /// Trials per thread count
    #[arg(long)]
    pub trial_count: Option<u32>,

    /// 0 - no shard, 1 - shard with {_id: hashed}, 2 - shard with {_id: 1}
    #[arg(long)]
    pub shard: Option<i64>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, env = "PERFBENCH_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "PERFBENCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Acknowledge every operation (true/false)
    #[arg(long)]
    pub safe: Option<String>,

    /// Write concern w: a node count or a tag such as "majority"
    #[arg(short = 'w')]
    pub w: Option<String>,

    /// Journal write concern (true/false)
    #[arg(short = 'j')]
    pub j: Option<String>,

    /// Use write commands (true/false)
    #[arg(long)]
    pub write_cmd: Option<String>,

    /// Use read commands (true/false)
    #[arg(long)]
    pub read_cmd: Option<String>,

    /// Include filter: "%", a name or tag, or a JSON list / list of lists
    #[arg(long)]
    pub include: Option<String>,

    /// Exclude filter, same forms as --include
    #[arg(long)]
    pub exclude: Option<String>,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Run against the in-memory admin and simulated generator
    #[arg(long)]
    pub dry_run: bool,

    /// Print harness metrics after the report
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Baseline report (plain JSON or captured output)
    #[arg(long)]
    pub baseline: PathBuf,

    /// Report to check (plain JSON or captured output)
    #[arg(long)]
    pub report: PathBuf,

    /// Allowed fractional drop of the best throughput
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Captured console output
    #[arg(long)]
    pub input: PathBuf,

    /// Write the report here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Check(args) => commands::check::execute(args),
        Command::Extract(args) => commands::extract::execute(args),
    }
}

/// Initialize logging. Logs go to stderr; stdout carries the report.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
