use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod chunk;
mod cli;
mod config;
mod embed;
mod error;
mod graph;
mod parser;
mod source;
mod sync;

#[derive(Parser)]
#[command(name = "repograph")]
#[command(version = "0.1.0")]
#[command(about = "Code knowledge graph: parse, sync, and query symbol-level structure", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync job and wait for it to finish
    Sync {
        /// Sync mode: full, delta, incremental
        #[arg(default_value = "full")]
        mode: String,

        /// Explicit target ref (defaults to the current tree)
        #[arg(short = 'r', long = "ref")]
        target_ref: Option<String>,
    },

    /// Run a typed graph query
    Query {
        /// Query kind: calls, called-by, imports, imported-by, defines,
        /// inherits, path, usage
        kind: String,

        /// Target symbol or file path
        target: String,

        /// Path target symbol (path queries only)
        #[arg(long)]
        to: Option<String>,

        /// Maximum path depth in hops
        #[arg(long, default_value_t = 10)]
        max_depth: u32,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a raw read-only SQL query (screened for mutating keywords)
    Raw {
        sql: String,

        /// Output format: text, json
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Search symbols by name substring
    Search {
        pattern: String,

        /// Restrict to one symbol kind
        #[arg(short, long)]
        kind: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Graph analysis reports
    Analyze {
        #[command(subcommand)]
        report: AnalyzeCommands,
    },

    /// Inspect and manage sync jobs
    Jobs {
        #[command(subcommand)]
        action: JobCommands,
    },

    /// Show graph statistics
    Stats {
        /// Include per-kind breakdowns
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
enum AnalyzeCommands {
    /// Non-exported symbols with no callers
    DeadCode,

    /// Symbols at or above a complexity threshold
    Hotspots {
        #[arg(short, long)]
        threshold: Option<u32>,
    },

    /// Call paths between two symbols
    Paths {
        from: String,
        to: String,

        #[arg(long)]
        max_depth: Option<u32>,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Recent jobs for this repository
    List {
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Details for one job
    Status { job_id: i64 },

    /// Request cancellation of an active job
    Cancel { job_id: i64 },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let project = cli.project;

    match cli.command {
        Commands::Sync { mode, target_ref } => {
            cli::sync::run_sync(project, mode, target_ref).await?;
        }

        Commands::Query {
            kind,
            target,
            to,
            max_depth,
            format,
        } => {
            cli::query::run_query(project, kind, target, to, max_depth, format).await?;
        }

        Commands::Raw { sql, format } => {
            cli::query::run_raw_query(project, sql, format).await?;
        }

        Commands::Search { pattern, kind, limit } => {
            cli::query::run_search(project, pattern, kind, limit).await?;
        }

        Commands::Analyze { report } => match report {
            AnalyzeCommands::DeadCode => cli::analyze::run_dead_code(project).await?,
            AnalyzeCommands::Hotspots { threshold } => {
                cli::analyze::run_hotspots(project, threshold).await?
            }
            AnalyzeCommands::Paths { from, to, max_depth } => {
                cli::analyze::run_paths(project, from, to, max_depth).await?
            }
        },

        Commands::Jobs { action } => match action {
            JobCommands::List { limit } => cli::jobs::run_list(project, limit).await?,
            JobCommands::Status { job_id } => cli::jobs::run_status(project, job_id).await?,
            JobCommands::Cancel { job_id } => cli::jobs::run_cancel(project, job_id).await?,
        },

        Commands::Stats { verbose } => {
            cli::stats::show_stats(project, verbose).await?;
        }
    }

    Ok(())
}
