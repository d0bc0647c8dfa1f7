//! Planforge - marketing plan generation service
//!
//! CLI entry point for serving the HTTP API and for one-shot generations.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use planstore::{Contact, Plan, PlanStatus};
use serde_json::Value;
use tracing::{debug, info};

use planforge::cli::{Cli, Command};
use planforge::config::Config;
use planforge::llm::create_clients;
use planforge::notify::{EmailNotifier, Notifier};
use planforge::pipeline::{ModelTiers, run_pipeline};
use planforge::progress::{progress_channel, status_message};
use planforge::prompts::PromptLoader;
use planforge::server::{self, AppState};
use planforge::state::StateManager;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level from the config file matters before the full config load
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref());

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "Planforge loaded config: json={}, longform={}",
        config.llm.openai.model, config.llm.anthropic.model
    );

    debug!(command = ?cli.command, "Dispatching command");
    match cli.command {
        Some(Command::Run {
            questionnaire,
            email,
            name,
        }) => cmd_run(&config, &questionnaire, email, name).await,
        Some(Command::Show { plan_id }) => cmd_show(&config, &plan_id).await,
        Some(Command::Plans { status }) => cmd_plans(&config, status).await,
        Some(Command::Serve) | None => cmd_serve(&config).await,
    }
}

/// Wire the shared application state from configuration
async fn build_app(config: &Config) -> Result<AppState> {
    let (json_client, text_client) = create_clients(&config.llm)?;
    let state = StateManager::spawn(&config.storage.db_path)?;
    let prompts = Arc::new(PromptLoader::new(config.storage.prompts_dir.clone()));
    let tiers = ModelTiers::from_config(&config.llm);
    let notifier =
        EmailNotifier::from_config(&config.notify).map(|n| Arc::new(n) as Arc<dyn Notifier>);

    Ok(AppState {
        state,
        json_client,
        text_client,
        prompts,
        tiers,
        notifier,
        stream: config.stream.clone(),
    })
}

/// Run the HTTP server
async fn cmd_serve(config: &Config) -> Result<()> {
    config.validate()?;
    let app = build_app(config).await?;
    server::serve(&config.server.bind, app).await
}

/// Generate one plan from a questionnaire file, reporting progress on stdout
async fn cmd_run(
    config: &Config,
    questionnaire_path: &Path,
    email: Option<String>,
    name: Option<String>,
) -> Result<()> {
    config.validate()?;

    let raw = std::fs::read_to_string(questionnaire_path)
        .with_context(|| format!("Failed to read {}", questionnaire_path.display()))?;
    let questionnaire: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in {}", questionnaire_path.display()))?;
    if !questionnaire
        .as_object()
        .is_some_and(|answers| !answers.is_empty())
    {
        eyre::bail!("The questionnaire must be a non-empty JSON object");
    }

    let app = build_app(config).await?;

    let mut plan = Plan::new(questionnaire);
    if let Some(email) = email.filter(|email| !email.is_empty()) {
        plan = plan.with_contact(Contact::new(email, name));
    }
    let plan_id = app.state.create_plan(plan).await?;
    println!("Plan {}", plan_id);

    let (progress, mut progress_rx) = progress_channel();
    let ctx = app.pipeline_context(progress);
    let printer = tokio::spawn(async move {
        while let Some(status) = progress_rx.recv().await {
            let message = status_message(status);
            println!("  [{}] {}", message.etapa, message.mensagem);
        }
    });

    let outcome = run_pipeline(&ctx, &plan_id).await;
    // Dropping the context closes the progress channel and ends the printer
    drop(ctx);
    let _ = printer.await;

    if outcome.is_ok() {
        let plan = app.state.get_plan_required(&plan_id).await?;
        if let Some(document) = &plan.final_document {
            println!("\n{}", document);
        }
        if let Some(cost) = plan.total_cost {
            println!("\nCusto total: {:.4} EUR", cost);
        }
    }

    app.state.shutdown().await?;
    outcome
}

/// Print a stored plan with its usage log
async fn cmd_show(config: &Config, plan_id: &str) -> Result<()> {
    let state = StateManager::spawn(&config.storage.db_path)?;
    let plan = state.get_plan_required(plan_id).await?;

    println!("Plan:    {}", plan.id);
    println!("Status:  {}", plan.status);
    println!("Created: {}", plan.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed_at) = plan.completed_at {
        println!("Ended:   {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(cost) = plan.total_cost {
        println!("Cost:    {:.4} EUR", cost);
    }
    if let Some(message) = &plan.error_message {
        println!("Error:   {}", message);
    }

    let usage = state.list_usage(plan_id).await?;
    if !usage.is_empty() {
        println!("\nUsage:");
        for entry in &usage {
            let marker = if entry.fallback { " (fallback)" } else { "" };
            println!(
                "  stage {}  {:<30} {:>7} in / {:>7} out  {:.4} EUR  {} ms{}",
                entry.stage,
                entry.model,
                entry.input_tokens,
                entry.output_tokens,
                entry.cost,
                entry.duration_ms,
                marker
            );
        }
    }

    if let Some(document) = &plan.final_document {
        println!("\n{}", document);
    }

    state.shutdown().await?;
    Ok(())
}

/// List stored plans, newest first
async fn cmd_plans(config: &Config, status: Option<PlanStatus>) -> Result<()> {
    let state = StateManager::spawn(&config.storage.db_path)?;
    let plans = state.list_plans(status).await?;

    if plans.is_empty() {
        println!("No plans found");
    } else {
        println!(
            "{:<38} {:<12} {:<20} {:>10}",
            "ID", "STATUS", "CREATED", "COST"
        );
        for plan in &plans {
            let cost = plan
                .total_cost
                .map(|c| format!("{:.4}", c))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<38} {:<12} {:<20} {:>10}",
                plan.id,
                plan.status.as_str(),
                plan.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                cost
            );
        }
    }

    state.shutdown().await?;
    Ok(())
}
