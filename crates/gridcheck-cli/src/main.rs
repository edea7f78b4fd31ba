//! gridcheck - configuration-matrix build verification
//!
//! The `gridcheck` command expands a declarative platform x feature-set
//! matrix into concrete jobs and runs them against the local project.
//!
//! ## Commands
//!
//! - `run`: execute the matrix and print the aggregated report
//! - `plan`: expand the matrix and list the jobs without running them

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gridcheck_core::{
    CancelFlag, EnvToolchain, ProcessAction, VerifyConfig, VerifyRun,
};

#[derive(Parser)]
#[command(name = "gridcheck")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build verification across a configuration matrix", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the verification matrix and print the report
    Run {
        /// Path to a JSON configuration (builtin Rust-library matrix if omitted)
        #[arg(short, long, env = "GRIDCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Project tree to verify
        #[arg(short = 'C', long, default_value = ".")]
        project_dir: PathBuf,

        /// Maximum concurrent jobs (default: platform count)
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Print the report as JSON instead of the console summary
        #[arg(long)]
        report_json: bool,
    },

    /// Expand the matrix and list the jobs without running them
    Plan {
        /// Path to a JSON configuration (builtin Rust-library matrix if omitted)
        #[arg(short, long, env = "GRIDCHECK_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<VerifyConfig> {
    match path {
        Some(path) => VerifyConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(VerifyConfig::rust_library()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    match cli.command {
        Commands::Run {
            config,
            project_dir,
            max_concurrency,
            report_json,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(limit) = max_concurrency {
                config.max_concurrency = Some(limit);
            }

            let cancel = CancelFlag::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("cancellation requested, in-flight steps may finish");
                    cancel_on_signal.cancel();
                }
            });

            let report = VerifyRun::execute(
                &config,
                Arc::new(EnvToolchain),
                Arc::new(ProcessAction::new(project_dir)),
                &cancel,
            )
            .await
            .context("verification run failed")?;

            if report_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }

            if !report.passed {
                std::process::exit(1);
            }
        }

        Commands::Plan { config } => {
            let config = load_config(config.as_ref())?;
            let jobs = config.expand_jobs().context("expanding the matrix")?;

            println!("{} jobs (config {})", jobs.len(), &config.digest()[..12]);
            for job in &jobs {
                println!("{}", job.id);
                for step in &job.steps {
                    println!("    {}: {}", step.name, step.command.join(" "));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_declaration_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_config_defaults_to_rust_library() {
        let config = load_config(None).expect("load");
        assert_eq!(config, VerifyConfig::rust_library());
    }

    #[test]
    fn test_load_config_from_file() {
        let config = VerifyConfig::rust_library();
        let json = serde_json::to_string(&config).expect("serialize");

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(json.as_bytes()).expect("write");

        let path = file.path().to_path_buf();
        let loaded = load_config(Some(&path)).expect("load");
        assert_eq!(loaded.digest(), config.digest());
    }

    #[test]
    fn test_load_config_missing_file_has_context() {
        let path = PathBuf::from("/nonexistent/gridcheck.json");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("gridcheck.json"));
    }
}
