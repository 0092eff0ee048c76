// src/main.rs
mod app;
mod capture;
mod config;
mod error;
mod frame;
mod history;
mod model;
mod parser;
mod prompts;
mod signal;
mod storage;
mod web;


use anyhow::{Context, Result};
use app::SignalApp;
use clap::{Parser, Subcommand};
use crate::config::{AppConfig, ModelBackend};
use frame::{BrowserFrameSlot, FileFrameSource, FrameSource};
use history::HistoryStore;
use signal::Outcome;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "prisma-signal", about = "AI chart screenshot signal reader")]
struct Cli {
    /// extra TOML config file layered over config/default.toml
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    log_level: Option<String>,

    /// use simulated model replies instead of calling the AI service
    #[arg(long, default_value_t = false)]
    sim: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// serve the web UI and JSON API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    /// analyse a single chart screenshot
    Analyze { image: PathBuf },
    /// live mode on an image file an external screen grabber keeps overwriting
    Live {
        #[arg(long)]
        frame: PathBuf,

        /// stop after this many analyses
        #[arg(long)]
        scans: Option<u32>,
    },
    /// show or edit the signal history
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Stats,
    Win { id: i64 },
    Loss { id: i64 },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.sim {
        cfg.model.backend = ModelBackend::Sim;
    }
    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });
    if let Command::Serve { host, port } = &command {
        if let Some(host) = host {
            cfg.server.host = host.clone();
        }
        if let Some(port) = port {
            cfg.server.port = *port;
        }
    }

    let level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from_str(level).unwrap_or(tracing::Level::INFO))
        .with_target(false)
        .init();

    info!("{} v{} ({})", cfg.name, cfg.version, cfg.environment);
    let cfg = Arc::new(cfg);

    let kv = storage::open_store(&cfg.history)?;
    let history =
        Arc::new(HistoryStore::load(kv, &cfg.history.key, cfg.history.capacity).await?);

    match command {
        Command::History { action } => {
            run_history(&history, action.unwrap_or(HistoryAction::List)).await?;
        }
        Command::Serve { .. } => {
            let model = model::build_model(&cfg.model)?;
            let frames = Arc::new(BrowserFrameSlot::new(cfg.live.frame_max_age_secs));
            let app = SignalApp::new(cfg.clone(), model, frames, history);
            println!("Service running. Open http://{}/", cfg.get_server_address());
            web::start_web(app).await?;
        }
        Command::Analyze { image } => {
            let mime = frame::mime_for_path(&image)
                .with_context(|| format!("{} is not a supported image", image.display()))?;
            let data = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let model = model::build_model(&cfg.model)?;

            let frames = Arc::new(BrowserFrameSlot::new(cfg.live.frame_max_age_secs));
            let app = SignalApp::new(cfg.clone(), model, frames, history);
            app.set_mode(capture::CaptureMode::Upload).await?;
            app.upload(data, mime).await?;
            if let Some(result) = app.analyze_upload().await? {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        Command::Live { frame, scans } => {
            let source: Arc<dyn FrameSource> = Arc::new(FileFrameSource::new(frame)?);
            let model = model::build_model(&cfg.model)?;
            let app = SignalApp::new(cfg.clone(), model, source, history);
            run_live(&app, scans).await?;
        }
    }

    Ok(())
}

/// Headless live mode: one analysis per candle at the trigger mark.
async fn run_live(app: &Arc<SignalApp>, scans: Option<u32>) -> Result<()> {
    app.connect().await?;
    app.sync_timer().await?;

    let mut seen = None;
    let mut last_error: Option<String> = None;
    let mut done = 0u32;
    loop {
        sleep(Duration::from_millis(500)).await;
        let status = app.status().await;
        if let Some(err) = fresh_error(&mut last_error, &status.error) {
            warn!("{}", err);
        }
        let Some(result) = status.result else {
            continue;
        };
        if seen.as_ref() == Some(&result.timestamp) {
            continue;
        }
        seen = Some(result.timestamp);
        println!("{}", serde_json::to_string(&result)?);

        done += 1;
        if scans.is_some_and(|limit| done >= limit) {
            app.disconnect().await;
            return Ok(());
        }
    }
}

/// The current error, only when it differs from the last one seen.
fn fresh_error(last: &mut Option<String>, current: &Option<String>) -> Option<String> {
    if current == last {
        return None;
    }
    *last = current.clone();
    current.clone()
}

async fn run_history(history: &HistoryStore, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            for entry in history.entries().await {
                println!(
                    "{}  {}  {:<10} {:<4} {}",
                    entry.id,
                    entry.timestamp.format("%H:%M:%S"),
                    entry.asset,
                    entry.direction,
                    entry.outcome
                );
            }
        }
        HistoryAction::Stats => {
            println!("{}", serde_json::to_string_pretty(&history.stats().await)?);
        }
        HistoryAction::Win { id } => {
            history.mark(id, Outcome::Win).await?;
        }
        HistoryAction::Loss { id } => {
            history.mark(id, Outcome::Loss).await?;
        }
        HistoryAction::Clear => history.clear().await?,
    }
    Ok(())
}
