//! # leadcheck CLI
//!
//! ```bash
//! leadcheck diagnose                 # run all stages, print the report
//! leadcheck diagnose --json          # same, as JSON
//! leadcheck config                   # effective settings, URI masked
//! leadcheck completions zsh          # shell completions
//! ```
//!
//! Settings are read from `--config` (TOML, optional), `--env-file`
//! (default `.env`, optional), and the environment. See [`leadcheck::config`].

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use leadcheck::{config, diagnose};

const DEFAULT_CONFIG: &str = "./config/leadcheck.toml";
const DEFAULT_ENV_FILE: &str = ".env";

/// leadcheck: connection and schema diagnostics for a lead collection.
#[derive(Parser)]
#[command(
    name = "leadcheck",
    about = "Connection and schema diagnostics for a MongoDB lead collection",
    version,
    long_about = "Runs a fixed sequence of read-only checks against the configured MongoDB \
    collection (connect, list databases, list collections, count, inspect a sample, count \
    analysed documents) and reports what is wrong, stopping early when later checks would be \
    meaningless."
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Optional. When omitted, `./config/leadcheck.toml` is used if it exists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a `.env` file. Variables already set in the environment win.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Verbose logging on stderr (stage timings, store calls).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the diagnostic pipeline and print the report.
    ///
    /// Exits 0 when the collection is healthy, 1 for any other verdict,
    /// and 130 when interrupted.
    Diagnose {
        /// Print the findings as JSON instead of a text report.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration with the URI masked.
    Config,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "leadcheck=debug,leadcheck_core=debug,warn"
    } else {
        "leadcheck=warn,leadcheck_core=warn,error"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(true)
        .init();
}

/// An explicit path must exist; the default one is used only if present.
fn optional_path(explicit: Option<PathBuf>, default: &str) -> Option<PathBuf> {
    explicit.or_else(|| Some(PathBuf::from(default)).filter(|p| p.exists()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "leadcheck", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = optional_path(cli.config, DEFAULT_CONFIG);
    let env_file = optional_path(cli.env_file, DEFAULT_ENV_FILE);
    let cfg = config::load_config(config_path.as_deref(), env_file.as_deref())?;

    match cli.command {
        Commands::Diagnose { json } => {
            let outcome = diagnose::run_diagnose(&cfg, json).await?;
            let code = outcome.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Config => {
            diagnose::show_config(&cfg)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
