//! Skillsmith - tax-guide PDF to Skill knowledge package
//!
//! Skillsmith ingests a CRA tax-guide PDF and produces a structured
//! Skill directory: an AI-enhanced index document, per-chapter
//! reference files, and the raw extracted text. The six-stage pipeline
//! is cached stage by stage and resumable mid-enhancement.

use clap::{Parser, Subcommand};
use skillsmith_cli::{execute_command, init_logging};

#[derive(Parser)]
#[command(name = "skillsmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn tax-guide PDFs into curated Skill knowledge packages")]
#[command(long_about = r#"
Skillsmith runs a six-stage refinement pipeline over a tax-guide PDF:

  extract -> classify -> chunk -> enhance -> assemble -> enhance-index

Every stage is cached by content fingerprint, so re-running over the
same PDF is free. Chunk enhancement fans out over worker processes and
can be resumed after an interrupt with --resume, or retried after
provider failures with --retry-failed.

Credentials come from the environment: GLM_API_KEY, GEMINI_API_KEY and
ANTHROPIC_API_KEY for the API backends; the claude, gemini and codex
CLI backends only need their binary on PATH.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log in JSON format
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF and build its Skill directory
    Ingest(skillsmith_cli::IngestArgs),

    /// Show provider backend availability
    Providers(skillsmith_cli::ProvidersArgs),

    /// Inspect or clear the artifact cache
    Cache(skillsmith_cli::CacheArgs),

    /// Internal Stage 4 worker process entry point
    #[command(hide = true, name = "enhance-worker")]
    EnhanceWorker(skillsmith_cli::WorkerArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_json) {
        eprintln!("warning: {}", e);
    }

    let exit_code = match cli.command {
        Commands::Ingest(args) => execute_command(args).await,
        Commands::Providers(args) => execute_command(args).await,
        Commands::Cache(args) => execute_command(args).await,
        Commands::EnhanceWorker(args) => execute_command(args).await,
    };

    std::process::exit(exit_code);
}
