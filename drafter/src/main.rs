//! `drafter`: turn a codebase into a reviewed blog post.
//!
//! Runs are checkpointed under `<workdir>/.drafter/runs/<run_id>/`, so the
//! non-interactive `start`/`resume` pair can span several invocations.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drafter::core::document::render_document;
use drafter::core::types::{RunState, precondition};
use drafter::driver::drive;
use drafter::exit_codes;
use drafter::graph::{Orchestrator, OrchestratorSettings, RunInput, RunOutcome};
use drafter::io::chat::ChatCompletionsGenerator;
use drafter::io::checkpoint::{CheckpointStore, FileCheckpointStore};
use drafter::io::command::CommandGenerator;
use drafter::io::config::{DrafterConfig, ModelConfig, load_config};
use drafter::io::llm::TextGenerator;
use drafter::io::loader::{CodeSource, load_code};
use drafter::logging;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "drafter",
    version,
    about = "Draft a blog post from source code, one approved section at a time"
)]
struct Cli {
    /// Config file; relative paths resolve against `--workdir`.
    #[arg(long, global = true, default_value = "drafter.toml")]
    config: PathBuf,

    /// Directory holding `.drafter/`.
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: review the outline and each section in the terminal.
    Run {
        /// A source file, a directory, or several files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Start a persisted run and stop at the first review point.
    Start {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Run id to use instead of a fresh UUID. Restarts that run if it exists.
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Answer the pending review of a persisted run (`approved` or feedback).
    Resume { run_id: String, feedback: String },
    /// Print a run's checkpoint as JSON.
    Show { run_id: String },
    /// Write a completed run's document as Markdown.
    Export {
        run_id: String,
        /// Output file (stdout if omitted).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.workdir.join(&cli.config))?;
    let store = FileCheckpointStore::new(&cli.workdir);

    match cli.command {
        Command::Run { paths } => cmd_run(&config, store, &paths),
        Command::Start { paths, run_id } => cmd_start(&config, store, &paths, run_id),
        Command::Resume { run_id, feedback } => cmd_resume(&config, store, &run_id, feedback),
        Command::Show { run_id } => cmd_show(&store, &run_id),
        Command::Export { run_id, out } => cmd_export(&store, &run_id, out.as_deref()),
    }
}

fn cmd_run(config: &DrafterConfig, store: FileCheckpointStore, paths: &[PathBuf]) -> Result<i32> {
    let state = initial_state(config, paths)?;
    let run_id = uuid::Uuid::new_v4().to_string();
    eprintln!("run id: {run_id}");
    let orchestrator = orchestrator(config, store)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    drive(&orchestrator, &run_id, state, stdin.lock(), &mut stdout)?;
    Ok(exit_codes::OK)
}

fn cmd_start(
    config: &DrafterConfig,
    store: FileCheckpointStore,
    paths: &[PathBuf],
    run_id: Option<String>,
) -> Result<i32> {
    let state = initial_state(config, paths)?;
    let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    eprintln!("run id: {run_id}");
    let orchestrator = orchestrator(config, store)?;
    let outcome = orchestrator.run(RunInput::Start(state), &run_id, |_| {})?;
    report(outcome)
}

fn cmd_resume(
    config: &DrafterConfig,
    store: FileCheckpointStore,
    run_id: &str,
    feedback: String,
) -> Result<i32> {
    let orchestrator = orchestrator(config, store)?;
    let outcome = orchestrator.run(RunInput::Resume(feedback), run_id, |_| {})?;
    report(outcome)
}

fn cmd_show(store: &FileCheckpointStore, run_id: &str) -> Result<i32> {
    let Some(checkpoint) = store.load(run_id)? else {
        return precondition(format!("no run '{run_id}'"));
    };
    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    Ok(exit_codes::OK)
}

fn cmd_export(store: &FileCheckpointStore, run_id: &str, out: Option<&Path>) -> Result<i32> {
    let Some(checkpoint) = store.load(run_id)? else {
        return precondition(format!("no run '{run_id}'"));
    };
    if !checkpoint.is_complete() {
        return precondition(format!(
            "run '{run_id}' is {}; only completed runs can be exported",
            checkpoint.status.as_str()
        ));
    }
    let document = render_document(&checkpoint.state);
    match out {
        Some(path) => {
            fs::write(path, &document).with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "document exported");
        }
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(document.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(exit_codes::OK)
}

fn initial_state(config: &DrafterConfig, paths: &[PathBuf]) -> Result<RunState> {
    let source = CodeSource::resolve(paths, &config.loader.extensions)?;
    let code = load_code(&source, &config.loader.extensions)?;
    Ok(RunState::new(code))
}

fn build_generator(config: &DrafterConfig) -> Result<Box<dyn TextGenerator>> {
    let generator: Box<dyn TextGenerator> = match &config.model {
        ModelConfig::Http(http) => Box::new(ChatCompletionsGenerator::from_config(http)?),
        ModelConfig::Command(cmd) => Box::new(CommandGenerator::new(cmd)?),
    };
    Ok(generator)
}

fn orchestrator(
    config: &DrafterConfig,
    store: FileCheckpointStore,
) -> Result<Orchestrator<Box<dyn TextGenerator>, FileCheckpointStore>> {
    Ok(Orchestrator::new(
        build_generator(config)?,
        store,
        OrchestratorSettings::from_config(config),
    ))
}

/// Print where the run stopped and pick the exit code.
fn report(outcome: RunOutcome) -> Result<i32> {
    match outcome {
        RunOutcome::Interrupted { payload, .. } => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(exit_codes::AWAITING_FEEDBACK)
        }
        RunOutcome::Completed { state } => {
            print!("{}", render_document(&state));
            Ok(exit_codes::OK)
        }
    }
}
