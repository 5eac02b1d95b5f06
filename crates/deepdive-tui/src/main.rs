use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use deepdive_core::{ai, Config, OllamaClient, Provider};
use tracing::info;

mod app;
mod handler;
mod transcript;
mod tui;
mod ui;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "deepdive")]
#[command(version)]
#[command(about = "Ask about complex topics; click highlighted terms or select text to get definitions")]
struct Cli {
    /// Knowledge source to use (gemini or ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model name, overriding the configured default
    #[arg(short, long)]
    model: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::new()
    });

    let provider = match cli.provider.as_deref() {
        Some(name) => Provider::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("unknown provider '{}' (expected gemini or ollama)", name))?,
        None => config.provider(),
    };
    let model = cli.model.unwrap_or_else(|| config.model_for(provider));

    info!(provider = provider.as_str(), model = %model, "starting deepdive");

    if provider == Provider::Ollama {
        check_ollama_model(config.ollama_url(), &model).await;
    }

    let source = ai::connect(&config, provider, &model);
    let (mut app, mut completions) = App::new(source, &model);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            tokio::select! {
                event = events.next() => match event {
                    Some(event) => handler::handle_event(&mut app, event)?,
                    None => break,
                },
                Some(completion) = completions.recv() => app.apply(completion),
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("exiting deepdive");
    result
}

/// Log a warning when the local Ollama server is missing `model`. Never fatal.
async fn check_ollama_model(base_url: &str, model: &str) {
    let client = OllamaClient::new(base_url, model);
    match client.has_model(model).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(model, "model not installed; run `ollama pull {}`", model),
        Err(e) => tracing::warn!(error = %e, "could not reach Ollama"),
    }
}

/// Log to a file so output never lands on the terminal the UI owns.
///
/// Logs go to `DEEPDIVE_LOG_DIR` when set, otherwise the user cache dir.
/// `RUST_LOG` overrides the default filter.
fn setup_tracing(verbose: bool) {
    use std::fs::OpenOptions;

    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::var("DEEPDIVE_LOG_DIR")
        .ok()
        .map(PathBuf::from)
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("deepdive")));

    let Some(log_dir) = log_dir else {
        return;
    };
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }

    let log_path = log_dir.join("deepdive.log");
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("deepdive=debug,deepdive_core=debug,warn")
        } else {
            EnvFilter::new("deepdive=info,deepdive_core=info,warn")
        }
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(path = ?log_path, "tracing initialized");
}
