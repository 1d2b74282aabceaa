use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod settings;

use settings::Settings;
use stagehand_core::api::TurnOutcome;

/// Run a scenario document over one side of a conversational turn.
///
/// Processes the given user input and/or model response through the
/// scenario's variables, classifiers, generators, and content rules,
/// prints the rewritten message, and persists variable state between
/// invocations through the state file.
#[derive(Debug, Parser)]
#[command(name = "stagehand", version, about)]
struct Args {
    /// Scenario document (JSON).
    scenario: PathBuf,

    /// Settings file (TOML); defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Variable state file, read if present and rewritten after the run.
    #[arg(long, default_value = "stagehand-state.json")]
    state: PathBuf,

    /// User message to process through the input phase.
    #[arg(long)]
    input: Option<String>,

    /// Model message to process through the response phase.
    #[arg(long)]
    response: Option<String>,

    /// Emit the outcome as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    init_tracing(&settings);

    let saved = app::read_state(&args.state)?;
    let fresh_session = saved.is_none();
    let mut engine = app::build_engine(&settings, &args.scenario, saved.as_ref())?;

    if fresh_session {
        engine.initialize().await?;
    }

    if let Some(message) = &args.input {
        let outcome = engine.process_input(message).await?;
        print_outcome("input", &outcome, args.json)?;
    }
    if let Some(message) = &args.response {
        let outcome = engine.process_response(message).await?;
        print_outcome("response", &outcome, args.json)?;
    }

    app::write_state(&args.state, &engine.saved_state())?;
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.filter.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_outcome(phase: &str, outcome: &TurnOutcome, as_json: bool) -> Result<()> {
    if as_json {
        let value = serde_json::json!({
            "phase": phase,
            "message": outcome.modified_message,
            "systemMessage": outcome.system_message,
            "stageDirections": outcome.stage_directions,
            "state": outcome.state,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", outcome.modified_message);
    if let Some(system) = &outcome.system_message {
        println!("--- {system}");
    }
    for direction in &outcome.stage_directions {
        println!("[{direction}]");
    }
    Ok(())
}
