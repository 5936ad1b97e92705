mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "judgebox")]
#[command(about = "Judgebox - run untrusted code against test cases in isolated containers", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value = "false")]
    json_logs: bool,

    /// Language table to use instead of the built-in one
    #[arg(long, global = true)]
    languages: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file against a JSON array of test cases
    Run {
        /// Language name or alias (e.g., python, cpp, js)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        source: PathBuf,

        /// Path to a JSON file: [{"input": "...", "expected_output": "..."}]
        #[arg(short, long)]
        tests: PathBuf,

        /// Time limit per test case in seconds (capped by the language default)
        #[arg(long)]
        time_limit: Option<u64>,

        /// Memory limit in MB
        #[arg(long)]
        memory_limit: Option<u64>,

        /// Exit with status 1 unless every test case passed
        #[arg(long, default_value = "false")]
        strict: bool,
    },

    /// List configured languages
    Languages,

    /// Pull the sandbox image if it is not cached
    Pull,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let registry = commands::load_registry(cli.languages.as_deref())?;

    match cli.command {
        Commands::Run {
            language,
            source,
            tests,
            time_limit,
            memory_limit,
            strict,
        } => {
            let passed = commands::run(
                registry,
                &language,
                &source,
                &tests,
                time_limit,
                memory_limit,
            )
            .await?;
            if strict && !passed {
                std::process::exit(1);
            }
        }
        Commands::Languages => {
            commands::list_languages(&registry);
        }
        Commands::Pull => {
            commands::pull_image().await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so stdout stays a clean JSON report
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
