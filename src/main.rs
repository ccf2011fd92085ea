use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use library_assistant::agent_core::{AgentError, ChatSession, Orchestrator};
use library_assistant::commands::{
    format_models, format_transcript, ChatCommand, Input, RunRenderer, HELP_TEXT,
};
use library_assistant::config::{find_config_path, load_config};
use library_assistant::events::{AppEvent, EventBus};
use library_assistant::inference::GenerativeClient;
use library_assistant::tools::{FrontToolDispatcher, ManifestSource, RestExecutor};

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_path = library_assistant::init_tracing().context("failed to initialise logging")?;

    let cwd = std::env::current_dir()?;
    let config_path = find_config_path(&cwd)?;
    let config = load_config(&config_path)?;
    tracing::info!(config = %config_path.display(), "configuration loaded");

    let events = EventBus::new();
    spawn_event_printer(&events);

    let model = GenerativeClient::from_config(&config.generative)?;
    let backend = RestExecutor::from_config(&config.backend, events.clone())?;
    let orchestrator = Orchestrator::new(
        model,
        backend,
        FrontToolDispatcher::new(events.clone()),
        &config.agent,
    );

    // Relative manifest paths are relative to the config file.
    let manifest = match ManifestSource::parse(&config.tools.manifest) {
        ManifestSource::File(path) if path.is_relative() => {
            let base = config_path.parent().unwrap_or(cwd.as_path());
            ManifestSource::File(base.join(path))
        }
        other => other,
    };
    let http = reqwest::Client::builder().timeout(MANIFEST_TIMEOUT).build()?;

    let mut session = ChatSession::new(
        orchestrator,
        manifest,
        http,
        config.agent.default_mode,
        config.default_model()?.clone(),
    );

    println!(
        "Library Assistant {} · model {} · mode {} · logs: {}",
        env!("CARGO_PKG_VERSION"),
        session.variant().display_name,
        session.mode(),
        log_path.display()
    );
    open_tools(&mut session).await;
    println!("Type /help for commands.");

    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !cancel.cancel() {
                println!("\n(nothing to cancel; /quit to exit)");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Input::parse(&line) {
            Input::Empty => {}
            Input::Invalid(reason) => println!("{reason}"),
            Input::Command(ChatCommand::Quit) => break,
            Input::Command(ChatCommand::Help) => println!("{HELP_TEXT}"),
            Input::Command(ChatCommand::Mode(None)) => println!("mode: {}", session.mode()),
            Input::Command(ChatCommand::Mode(Some(mode))) => {
                session.set_mode(mode);
                println!("mode: {mode}");
            }
            Input::Command(ChatCommand::Models) => {
                println!("{}", format_models(&config, &session.variant().key));
            }
            Input::Command(ChatCommand::Model(key)) => match config.model(&key) {
                Ok(variant) => {
                    session.set_variant(variant.clone());
                    println!("model: {}", variant.display_name);
                }
                Err(e) => println!("{e}"),
            },
            Input::Command(ChatCommand::Reset) => {
                session.reset();
                println!("conversation cleared");
                open_tools(&mut session).await;
            }
            Input::Command(ChatCommand::History) => {
                println!("{}", format_transcript(&session.transcript()));
            }
            Input::Message(text) => {
                let mut renderer = RunRenderer::new();
                let result = session
                    .send_message(&text, |event| {
                        if let Some(out) = renderer.on_event(event) {
                            print!("{out}");
                            let _ = std::io::stdout().flush();
                        }
                    })
                    .await;
                match result {
                    Ok(outcome) => print!("{}", renderer.finish(&outcome)),
                    Err(AgentError::Busy) => println!("{}", AgentError::Busy),
                    Err(e) => println!("Ошибка: {e}"),
                }
            }
        }
    }

    tracing::info!("library assistant exiting");
    Ok(())
}

async fn open_tools<M, B>(session: &mut ChatSession<M, B>)
where
    M: library_assistant::inference::GenerativeModel,
    B: library_assistant::tools::RestBackend,
{
    match session.open().await {
        Ok(registry) => println!("{} tools loaded", registry.len()),
        Err(e) => println!("{e}"),
    }
}

/// Print navigation and refresh events as they are published.
fn spawn_event_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AppEvent::Navigate { path, new_tab }) => {
                    let target = if new_tab { "new tab" } else { "current tab" };
                    println!("  → {path} ({target})");
                }
                Ok(AppEvent::AgentStopped) => println!("  ■ agent stopped"),
                Ok(AppEvent::ActionCancelled) => println!("  ■ action cancelled"),
                Ok(AppEvent::BookInstancesUpdated { endpoint })
                | Ok(AppEvent::InstanceStatusUpdate { endpoint }) => {
                    println!("  ↻ {endpoint} changed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
