//! # Diagnostic Harness CLI (`dx`)
//!
//! ## Usage
//!
//! ```bash
//! dx --config ./config/dx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dx init` | Create the SQLite database and schema |
//! | `dx analyze` | Run the configured analyzer and ingest its output |
//! | `dx ingest <report>` | Ingest a captured report (`-` for stdin) |
//! | `dx query "<text>"` | Ask a question about the stored issues |
//! | `dx issues` | List every stored issue |
//! | `dx stats` | Counts by severity and rule |
//! | `dx clear` | Drop the issue collection |
//! | `dx serve` | Start the HTTP API |
//! | `dx completions <shell>` | Print shell completions |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use diag_harness::progress::ProgressMode;
use diag_harness::{config, ingest, issues, migrate, query, server, stats};

/// Diagnostic Harness CLI: ingest analyzer diagnostics and ask questions
/// about them.
///
/// All commands except `completions` read a TOML configuration file given
/// by `--config`. See `config/dx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dx",
    about = "Diagnostic Harness: ingest static-analysis diagnostics and query them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `collections` and `issues`
    /// tables. Safe to run more than once.
    Init,

    /// Run the configured analyzer over the repository and ingest its output.
    Analyze {
        /// Drop the collection before ingesting.
        #[arg(long)]
        clear: bool,

        /// Progress on stderr.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Ingest a captured analyzer report.
    Ingest {
        /// Report file, or `-` to read stdin.
        report: PathBuf,

        /// Root that relative paths in the report are resolved against.
        /// Defaults to `[ingest] repo_root`.
        #[arg(long)]
        repo_root: Option<PathBuf>,

        /// Drop the collection before ingesting.
        #[arg(long)]
        clear: bool,

        /// Report format: `auto`, `text`, `sectioned`, or `json`.
        #[arg(long, default_value = "auto")]
        format: String,

        /// Progress on stderr.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Ask a question about the stored issues.
    ///
    /// Aggregate questions ("how many issues", "which file", "categories",
    /// "errors", "file with most issues", "all") are answered directly;
    /// anything else is a similarity search.
    Query {
        text: String,

        /// Maximum number of semantic hits or top files.
        /// Defaults to `[retrieval] top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List every stored issue.
    Issues {
        /// Print the issues as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics.
    Stats,

    /// Drop the issue collection.
    Clear,

    /// Start the HTTP API on `[server] bind`.
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

fn progress_mode(arg: Option<ProgressArg>) -> ProgressMode {
    match arg {
        Some(ProgressArg::Off) => ProgressMode::Off,
        Some(ProgressArg::Human) => ProgressMode::Human,
        Some(ProgressArg::Json) => ProgressMode::Json,
        None => ProgressMode::default_for_tty(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "dx", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Analyze { clear, progress } => {
            ingest::run_analyze(&cfg, clear, progress_mode(progress)).await?;
        }
        Commands::Ingest {
            report,
            repo_root,
            clear,
            format,
            progress,
        } => {
            ingest::run_ingest(&cfg, &report, repo_root, clear, &format, progress_mode(progress))
                .await?;
        }
        Commands::Query { text, top_k, json } => {
            query::run_query(&cfg, &text, top_k, json).await?;
        }
        Commands::Issues { json } => {
            issues::run_issues(&cfg, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Clear => {
            issues::run_clear(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
