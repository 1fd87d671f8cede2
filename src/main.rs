use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use tabscribe::{AppState, Config, DeviceTabs, TabRegistry, TabSession, UpdateKind};

#[derive(Parser)]
#[command(name = "tabscribe", about = "Stream tab audio to a transcription server")]
struct Cli {
    /// Path to a config file (defaults apply without one)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control surface
    Serve,
    /// Capture immediately and print updates to the console
    Capture {
        /// Transcription server endpoint (ws://...); defaults to the
        /// configured one
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// List capture targets
    Tabs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Capture { endpoint } => capture(cfg, endpoint).await,
        Command::Tabs => list_tabs().await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let registry = Arc::new(DeviceTabs::new());
    let session = Arc::new(TabSession::new(registry, cfg.session()));
    let state = AppState::new(session, PathBuf::from(&cfg.transcriber.settings_path));
    let router = tabscribe::create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("{} listening on {}", cfg.service.name, addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn capture(cfg: Config, endpoint: Option<String>) -> Result<()> {
    let endpoint = endpoint.unwrap_or_else(|| cfg.transcriber.endpoint_url.clone());
    let registry = Arc::new(DeviceTabs::new());
    let session = Arc::new(TabSession::new(registry, cfg.session()));

    let mut updates = session.subscribe();
    session.start(&endpoint).await?;
    info!("capturing; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = updates.recv() => {
                // A lagged receiver just skips ahead
                let Ok(event) = event else { continue };
                match event.kind {
                    UpdateKind::Transcription => println!("{}", event.text),
                    UpdateKind::ContextPartial => println!("  [context] {}", event.text),
                }
            }
        }
    }

    session.terminate().await;
    Ok(())
}

async fn list_tabs() -> Result<()> {
    let registry = DeviceTabs::new();
    let tabs = registry.tabs().await;

    if tabs.is_empty() {
        println!("no capture targets found");
        return Ok(());
    }
    for tab in tabs {
        println!(
            "{}  active={} audible={}",
            tab.title, tab.active, tab.audible
        );
    }
    Ok(())
}
