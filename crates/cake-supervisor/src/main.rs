//! `cake` — CAKE supervisor CLI
//!
//! # Usage
//!
//! ```bash
//! # Supervise a task with command-backed stages
//! cake run "Fix the failing import in utils.py" --config cake.toml
//!
//! # Ask the escalation engine about one failure
//! cake decide --context failure.json --config escalation.yaml
//!
//! # Check operator text against the reference corpus (exit 1 if rejected)
//! cake validate "Operator (CAKE): Stop. Run pytest. See test results."
//!
//! # Inspect or grow a corpus file
//! cake corpus show -n 5 --corpus corpus.yaml
//! cake corpus add "Operator (CAKE): Stop. Check the lockfile." --corpus corpus.yaml
//! ```
//!
//! JSON results go to stdout; logs go to stderr (`RUST_LOG` overrides the filter).

use anyhow::{Context, Result};
use cake_supervisor::{Supervisor, SupervisorConfig};
use clap::{Parser, Subcommand};
use coordination::{
    EscalationConfig, EscalationEngine, FailureContext, MessageComplianceGate, NgramCosineScorer,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "cake", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Supervise a task through the seven-stage workflow
    Run {
        /// Task description passed to every stage
        task: String,
        /// Supervisor config (TOML)
        #[arg(long, default_value = "cake.toml")]
        config: PathBuf,
        /// Override the number of workflow attempts
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Decide the escalation for a failure context (JSON file)
    Decide {
        #[arg(long)]
        context: PathBuf,
        /// Escalation config (.yaml, .json or .toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate an operator message
    Validate {
        message: String,
        /// Reference corpus file (built-in corpus when omitted)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Inspect or extend a reference corpus
    Corpus {
        #[command(subcommand)]
        action: CorpusCommand,
    },
}

#[derive(Subcommand, Debug)]
enum CorpusCommand {
    /// Print the first N reference messages
    Show {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Validate a message and append it to a corpus file
    Add {
        message: String,
        /// Corpus file; created from the built-in corpus if missing
        #[arg(long)]
        corpus: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cake_supervisor=info,coordination=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            task,
            config,
            max_attempts,
        } => run(&task, &config, max_attempts).await,
        Command::Decide { context, config } => decide(&context, config.as_deref()),
        Command::Validate { message, corpus } => validate(&message, corpus.as_deref()),
        Command::Corpus { action } => match action {
            CorpusCommand::Show { count, corpus } => show_corpus(count, corpus.as_deref()),
            CorpusCommand::Add { message, corpus } => add_to_corpus(&message, &corpus),
        },
    }
}

async fn run(task: &str, config_path: &Path, max_attempts: Option<u32>) -> Result<ExitCode> {
    let config = SupervisorConfig::load(config_path)?;
    let mut supervisor = Supervisor::from_config(&config)?;
    if let Some(attempts) = max_attempts {
        supervisor = supervisor.with_max_attempts(attempts);
    }

    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling workflow");
            cancel.cancel();
        }
    });

    let report = supervisor
        .supervise(task)
        .await
        .context("Supervision failed")?;
    print_json(&report)?;
    Ok(exit_code(report.outcome.is_success()))
}

fn decide(context_path: &Path, config_path: Option<&Path>) -> Result<ExitCode> {
    let config = match config_path {
        Some(path) => EscalationConfig::from_path(path)
            .with_context(|| format!("Failed to load escalation config {}", path.display()))?,
        None => EscalationConfig::default(),
    };
    let content = std::fs::read_to_string(context_path)
        .with_context(|| format!("Failed to read {}", context_path.display()))?;
    let context: FailureContext =
        serde_json::from_str(&content).context("Failed to parse failure context")?;

    let engine = EscalationEngine::new(config)?;
    print_json(&engine.decide(&context))?;
    Ok(ExitCode::SUCCESS)
}

fn validate(message: &str, corpus: Option<&Path>) -> Result<ExitCode> {
    let gate = load_gate(corpus)?;
    let verdict = gate.validate(message);
    print_json(&verdict)?;
    Ok(exit_code(verdict.passed))
}

fn show_corpus(count: usize, corpus: Option<&Path>) -> Result<ExitCode> {
    let gate = load_gate(corpus)?;
    for message in gate.get_reference_examples(count) {
        println!("{message}");
    }
    Ok(ExitCode::SUCCESS)
}

fn add_to_corpus(message: &str, corpus: &Path) -> Result<ExitCode> {
    let gate = MessageComplianceGate::new(NgramCosineScorer::default());
    if corpus.exists() {
        gate.load_reference_corpus_from_path(corpus)
            .with_context(|| format!("Failed to load corpus {}", corpus.display()))?;
    }

    let verdict = gate.add_reference_message(message)?;
    gate.save_reference_corpus(corpus)
        .with_context(|| format!("Failed to write corpus {}", corpus.display()))?;
    info!(entries = gate.corpus_len(), path = %corpus.display(), "Corpus updated");
    print_json(&verdict)?;
    Ok(ExitCode::SUCCESS)
}

fn load_gate(corpus: Option<&Path>) -> Result<MessageComplianceGate> {
    let gate = MessageComplianceGate::new(NgramCosineScorer::default());
    if let Some(path) = corpus {
        gate.load_reference_corpus_from_path(path)
            .with_context(|| format!("Failed to load corpus {}", path.display()))?;
    }
    Ok(gate)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
