//! # sluice-cli
//!
//! Command-line interface for running pipelines and inspecting mappings.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sluice_pipeline::{ErrorPolicy, InputConfig, OutputConfig, Pipeline, PipelineConfig};
use sluice_query::{Mapping, MappingDsl};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Declarative stream processing with mapping expressions")]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline described by a configuration file
    Run {
        /// Pipeline configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the input fields each statement of a mapping reads
    Lint {
        /// Mapping file path
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = LintFormat::Text)]
        format: LintFormat,
    },

    /// Apply a mapping to newline-delimited JSON
    Exec {
        /// Mapping file path
        #[arg(short, long)]
        mapping: PathBuf,

        /// Input file (standard input when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// What to do with messages that fail
        #[arg(long, value_enum, default_value_t = PolicyArg::Drop)]
        on_error: PolicyArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LintFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Drop,
    Fail,
}

impl From<PolicyArg> for ErrorPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Drop => ErrorPolicy::Drop,
            PolicyArg::Fail => ErrorPolicy::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Lint { mapping, format } => lint(&mapping, format),
        Commands::Exec {
            mapping,
            input,
            on_error,
        } => exec(&mapping, input, on_error.into()).await,
    }
}

fn load_mapping(path: &Path) -> anyhow::Result<Mapping> {
    MappingDsl::parse_file(path).with_context(|| format!("loading mapping {}", path.display()))
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = PipelineConfig::from_file(config_path)
        .with_context(|| format!("loading pipeline config {}", config_path.display()))?;
    let pipeline = Pipeline::from_config(&config)?;
    let report = pipeline.run(&config).await?;
    if report.stats.failed > 0 {
        tracing::warn!(failed = report.stats.failed, "Some messages failed");
    }
    Ok(())
}

fn lint(mapping_path: &Path, format: LintFormat) -> anyhow::Result<()> {
    let mapping = load_mapping(mapping_path)?;
    let statements = mapping
        .query_targets()
        .with_context(|| format!("analysing mapping {}", mapping.name))?;

    match format {
        LintFormat::Text => {
            for statement in &statements {
                let reads: Vec<String> = statement.reads.iter().map(ToString::to_string).collect();
                println!("{} <- {}", statement.target, reads.join(", "));
            }
        }
        LintFormat::Json => {
            let report: Vec<serde_json::Value> = statements
                .iter()
                .map(|statement| {
                    serde_json::json!({
                        "target": statement.target.to_string(),
                        "reads": statement
                            .reads
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn exec(
    mapping_path: &Path,
    input: Option<PathBuf>,
    error_policy: ErrorPolicy,
) -> anyhow::Result<()> {
    let mapping = load_mapping(mapping_path)?;
    let config = PipelineConfig {
        input: match input {
            Some(path) => InputConfig::JsonLines { path },
            None => InputConfig::Stdin,
        },
        output: OutputConfig::Stdout,
        error_policy,
        ..PipelineConfig::default()
    };

    let pipeline = Pipeline::new(vec![mapping])
        .with_max_in_flight(config.pipeline.max_in_flight)
        .with_error_policy(error_policy);
    pipeline.run(&config).await?;
    Ok(())
}
