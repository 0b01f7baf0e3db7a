//! Braid CLI - run and validate workflow documents

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use braid::config::BraidConfig;
use braid::error::{BraidError, FixSuggestion};
use braid::runtime::Runner;

#[derive(Parser)]
#[command(name = "braid")]
#[command(about = "Braid - declarative workflow interpreter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file on the local substrate
    Run {
        /// Path to the workflow YAML file
        file: PathBuf,

        /// Workflow input as inline JSON
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the workflow input from a JSON file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Continue as new once the history grows past this length
        #[arg(long)]
        max_history_length: Option<usize>,

        /// Pre-deliver a signal: NAME or NAME=JSON (repeatable)
        #[arg(short, long = "signal")]
        signals: Vec<String>,

        /// Write the final run history as JSON
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Validate a workflow file (parse and compile only)
    Validate {
        /// Path to the workflow YAML file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            input,
            input_file,
            max_history_length,
            signals,
            history,
        } => {
            run_workflow(RunArgs {
                file,
                input,
                input_file,
                max_history_length,
                signals,
                history,
            })
            .await
        }
        Commands::Validate { file } => validate_workflow(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

struct RunArgs {
    file: PathBuf,
    input: Option<String>,
    input_file: Option<PathBuf>,
    max_history_length: Option<usize>,
    signals: Vec<String>,
    history: Option<PathBuf>,
}

async fn run_workflow(args: RunArgs) -> Result<(), BraidError> {
    let mut config = BraidConfig::load()?.with_env();
    if let Some(max) = args.max_history_length {
        config.runtime.max_history_length = max;
    }

    let input = match (&args.input, &args.input_file) {
        (Some(raw), _) => serde_json::from_str(raw)?,
        (None, Some(path)) => serde_json::from_str(&tokio::fs::read_to_string(path).await?)?,
        (None, None) => Value::Object(Default::default()),
    };

    let runner = Runner::from_file(&args.file, config)?;
    let substrate = runner.substrate().build()?;
    for raw in &args.signals {
        let (name, payload) = parse_signal(raw)?;
        substrate.signal(&name, payload);
    }

    let cancel = substrate.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} cancelling run...", "!".yellow());
            cancel.cancel();
        }
    });

    let outcome = runner.run_on(&substrate, input).await?;

    if let Some(path) = &args.history {
        let json = serde_json::to_string_pretty(&outcome.history.to_json())?;
        tokio::fs::write(path, json).await?;
    }

    if !outcome.output.is_null() {
        println!("{}", "Output:".cyan().bold());
        println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    }
    Ok(())
}

/// `NAME` (null payload) or `NAME=JSON`; a payload that is not JSON is taken as a string
fn parse_signal(raw: &str) -> Result<(String, Value), BraidError> {
    let (name, payload) = match raw.split_once('=') {
        Some((name, payload)) => (
            name,
            serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string())),
        ),
        None => (raw, Value::Null),
    };
    if name.trim().is_empty() {
        return Err(BraidError::ConfigError {
            reason: format!("invalid --signal '{raw}': missing name"),
        });
    }
    Ok((name.trim().to_string(), payload))
}

fn validate_workflow(file: &Path) -> Result<(), BraidError> {
    let runner = Runner::from_file(file, BraidConfig::load()?.with_env())?;
    let program = runner.program();

    println!(
        "{} Workflow '{}' is valid",
        "✓".green(),
        runner.workflow().name()
    );
    println!("  Tasks: {}", runner.workflow().tasks.len());
    println!("  Sub-graphs: {}", program.graphs().len());
    for name in program.graphs().names() {
        let marker = if name == program.root_name() {
            " (entry point)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("    - {}{}", name, marker);
    }
    Ok(())
}
