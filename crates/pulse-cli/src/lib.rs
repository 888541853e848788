//! Terminal front end: `generate`, `refine` and `conversations`.

pub mod cli;
pub mod metrics;
pub mod render;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::Stylize;
use pulse_client::{ConversationsClient, HttpTransport};
use pulse_core::{Config, GenerateRequest, SessionController, SessionOutcome, ToolDisplayTable};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConversationsAction, GenerateOptions};
use render::{summary, TerminalRenderer};

/// Exit status after Ctrl-C, following the shell convention for SIGINT.
const EXIT_CANCELLED: u8 = 130;

/// Logs go to stderr; stdout carries only generated content.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }
    if let Some(secs) = cli.timeout {
        config.session.inactivity_timeout_secs = secs;
    }
    debug!("Backend: {}", config.backend.base_url);

    match cli.command {
        Command::Generate { topic, options } => {
            let request = options.apply(config.defaults.request(topic));
            stream(&config, request, &options).await
        }
        Command::Refine {
            thread_id,
            feedback,
            options,
        } => {
            let request = options
                .apply(config.defaults.request(feedback))
                .with_thread_id(thread_id);
            stream(&config, request, &options).await
        }
        Command::Conversations { action } => conversations(&config, action).await,
    }
}

async fn stream(
    config: &Config,
    request: GenerateRequest,
    options: &GenerateOptions,
) -> Result<ExitCode> {
    let transport = HttpTransport::new(&config.backend).context("Failed to set up HTTP transport")?;
    let mut controller = SessionController::new(transport, config.session.clone());
    let renderer = Arc::new(TerminalRenderer::new(ToolDisplayTable::default(), !options.json));
    controller.subscribe(renderer.clone());

    let started = Instant::now();
    let handle = controller.submit(request)?;
    let view = tokio::select! {
        view = handle.finished() => view,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling request {}", handle.id());
            handle.cancel();
            handle.view()
        }
    };
    let elapsed = started.elapsed();

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialize session")?
        );
    } else {
        if renderer.needs_newline() {
            println!();
        }
        if options.show_reasoning && !view.reasoning.is_empty() {
            eprintln!("{}", "Reasoning".bold());
            eprintln!("{}", view.reasoning.as_str().dark_grey());
        }
        eprint!("{}", summary(&view, renderer.table(), elapsed));
    }

    Ok(match view.outcome {
        SessionOutcome::Completed => ExitCode::SUCCESS,
        SessionOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::FAILURE,
    })
}

async fn conversations(config: &Config, action: ConversationsAction) -> Result<ExitCode> {
    let client = ConversationsClient::new(&config.backend).context("Failed to set up HTTP client")?;

    match action {
        ConversationsAction::List { json } => {
            let list = client.list().await.context("Failed to list conversations")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                eprintln!("No conversations yet.");
            } else {
                for conversation in &list {
                    let updated = conversation
                        .updated()
                        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{}  {}  {}",
                        conversation.id,
                        updated.dark_grey(),
                        conversation.title
                    );
                }
            }
        }
        ConversationsAction::Delete { id } => {
            client
                .delete(&id)
                .await
                .with_context(|| format!("Failed to delete conversation {}", id))?;
            eprintln!("Deleted {}", id);
        }
    }
    Ok(ExitCode::SUCCESS)
}
