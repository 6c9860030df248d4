#![allow(missing_docs)]

//! Intake CLI.
//!
//! `intake chat` runs an interactive dialogue against a configured gate
//! strategy, handing off to the bounded plan engine once the user
//! confirms. `intake check-config` validates the runtime config and
//! every gate strategy without talking to anything.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use intake::config::strategy::{StrategyProvider, TomlStrategyProvider};
use intake::config::IntakeConfig;
use intake::gates::GateEngine;
use intake::plan::{BoundedPlanEngine, HttpProfileClient, ProfileClient, StaticProfileClient};
use intake::providers::http::HttpCompletionClient;
use intake::store::sqlite::SqliteStateStore;
use intake::types::{DialoguePhase, PlanReadiness, TurnInput};

#[derive(Parser)]
#[command(name = "intake", about = "Gate-driven conversational intake engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an interactive intake dialogue on stdin/stdout.
    Chat {
        /// Strategy key to load from the strategies file.
        #[arg(long)]
        strategy: String,
        /// Session id; a fresh one is generated when omitted.
        #[arg(long)]
        session: Option<String>,
    },
    /// Validate the runtime config and all gate strategies.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = IntakeConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Chat { strategy, session } => {
            let _guard = intake::logging::init_production(Path::new(&config.paths.logs_dir))?;
            chat(&config, &strategy, session).await
        }
        Command::CheckConfig => {
            intake::logging::init_cli(&config.runtime.log_level);
            check_config(&config)
        }
    }
}

async fn chat(config: &IntakeConfig, strategy_key: &str, session: Option<String>) -> Result<()> {
    let provider = TomlStrategyProvider::from_path(Path::new(&config.paths.strategies_file))
        .context("failed to load strategies file")?;
    let gate_config = provider
        .load_gate_config(strategy_key)
        .with_context(|| format!("strategy '{strategy_key}' not available"))?;

    let store = Arc::new(
        SqliteStateStore::open(Path::new(&config.paths.state_db))
            .await
            .context("failed to open state database")?,
    );
    let model = Arc::new(HttpCompletionClient::new(
        config.model.base_url.clone(),
        config.model.model.clone(),
        config.model.api_key.clone(),
        Duration::from_secs(config.model.timeout_seconds),
    ));

    let gate_engine = GateEngine::new(
        gate_config,
        store.clone(),
        model.clone(),
        config.dialogue.edit_resume_policy,
    );
    // Without a configured lookup service, enrichment resolves nothing
    // and the planner works from answers alone.
    let profiles: Arc<dyn ProfileClient> = match &config.profile.base_url {
        Some(base_url) => Arc::new(HttpProfileClient::new(
            base_url.clone(),
            Duration::from_secs(config.profile.timeout_seconds),
        )),
        None => Arc::new(StaticProfileClient::new()),
    };
    let plan_engine = BoundedPlanEngine::new(store, model, profiles);

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(session_id = %session_id, strategy = strategy_key, "chat session started");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    if let Some(question) = gate_engine.opening_question() {
        writeln!(stdout, "{question}")?;
    }

    let mut handed_off = false;
    for line in stdin.lock().lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        let reply = if handed_off {
            let outcome = plan_engine.advance(&session_id, text).await?;
            if outcome.readiness == PlanReadiness::ReadyForCompilation {
                writeln!(stdout, "{}", outcome.reply)?;
                break;
            }
            outcome.reply
        } else {
            let outcome = gate_engine
                .process_turn(&session_id, TurnInput::text(text))
                .await?;
            match outcome.phase {
                DialoguePhase::HandedOff => {
                    handed_off = true;
                    outcome.reply
                }
                DialoguePhase::Terminated => {
                    writeln!(stdout, "{}", outcome.reply)?;
                    break;
                }
                _ => outcome.reply,
            }
        };
        writeln!(stdout, "{reply}")?;
    }

    Ok(())
}

fn check_config(config: &IntakeConfig) -> Result<()> {
    println!("config: ok");
    println!("  state_db:        {}", config.paths.state_db);
    println!("  strategies_file: {}", config.paths.strategies_file);
    println!("  model:           {} @ {}", config.model.model, config.model.base_url);

    let provider = TomlStrategyProvider::from_path(Path::new(&config.paths.strategies_file))
        .context("strategies file failed validation")?;
    for key in provider.strategy_keys() {
        let gate_config = provider
            .load_gate_config(&key)
            .with_context(|| format!("strategy '{key}' failed validation"))?;
        println!(
            "strategy '{key}': {} gate(s), starts with '{}'",
            gate_config.ordered_gates().count(),
            gate_config
                .first_gate()
                .map(|(k, _)| k)
                .unwrap_or("<none>")
        );
    }
    Ok(())
}
