//! StanCSV CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sc_csv::{Filter, MatchPolicy, ReadOptions, RunResult};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "stancsv")]
#[command(about = "StanCSV - read CmdStan CSV output as JSON")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the reconciled run metadata
    Metadata {
        /// CSV files of one run (one per chain for sampling)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Soft-mismatch policy (JSON, `{"soft_fields": [...]}`)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode draws and print the full result
    Read {
        /// CSV files of one run (one per chain for sampling)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Comma-separated variables (exact or base names). Pass an empty
        /// value (`--variables=`) to decode none.
        #[arg(long, value_delimiter = ',')]
        variables: Option<Vec<String>>,

        /// Comma-separated sampler diagnostics. Pass an empty value to decode none.
        #[arg(long, value_delimiter = ',')]
        diagnostics: Option<Vec<String>>,

        /// Soft-mismatch policy (JSON, `{"soft_fields": [...]}`)
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Scan files in parallel.
        #[arg(long)]
        parallel: bool,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Metadata { files, policy, output } => {
            cmd_metadata(&files, policy.as_deref(), output.as_ref())
        }
        Commands::Read { files, variables, diagnostics, policy, parallel, output } => {
            let opts = ReadOptions::default()
                .with_variables(Filter::from_option(variables))
                .with_sampler_diagnostics(Filter::from_option(diagnostics))
                .with_policy(load_policy(policy.as_deref())?)
                .with_parallel(parallel);
            cmd_read(&files, &opts, output.as_ref())
        }
        Commands::Version => {
            println!("stancsv {}", sc_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_metadata(files: &[PathBuf], policy: Option<&Path>, output: Option<&PathBuf>) -> Result<()> {
    let opts = ReadOptions::default().with_policy(load_policy(policy)?);
    let meta = sc_csv::read_metadata(files, &opts)?;
    tracing::info!(method = %meta.method, chains = meta.ids.len(), "metadata read");
    write_json(output, serde_json::to_value(&meta)?)
}

fn cmd_read(files: &[PathBuf], opts: &ReadOptions, output: Option<&PathBuf>) -> Result<()> {
    tracing::info!(files = files.len(), parallel = opts.parallel, "reading run");
    let run = sc_csv::read(files, opts)?;
    match &run {
        RunResult::Sample(s) => tracing::info!(
            chains = s.post_warmup_draws.n_chains(),
            draws = s.post_warmup_draws.n_iterations(),
            "sampling run decoded"
        ),
        RunResult::Optimize(o) => {
            tracing::info!(rows = o.point_estimates.n_draws(), "optimization run decoded")
        }
        RunResult::Variational(v) => {
            tracing::info!(draws = v.draws.n_draws(), "variational run decoded")
        }
        RunResult::GenerateQuantities(g) => tracing::info!(
            chains = g.generated_quantities.n_chains(),
            "generated quantities decoded"
        ),
    }
    write_json(output, serde_json::to_value(&run)?)
}

fn load_policy(path: Option<&Path>) -> Result<MatchPolicy> {
    let Some(path) = path else {
        return Ok(MatchPolicy::default());
    };
    tracing::info!(path = %path.display(), "loading match policy");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file {}", path.display()))?;
    MatchPolicy::from_json(&text)
        .with_context(|| format!("invalid policy file {}", path.display()))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
