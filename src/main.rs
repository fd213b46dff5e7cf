use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod app;
mod config;
mod events;
mod handler;
mod poll;
mod stream;
mod theme;
mod tui;
mod ui;

use api::BackendClient;
use app::App;
use config::Config;
use poll::Poller;

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "Terminal frontend for a self-hosted personal AI backend")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "COMPANION_BACKEND", default_value = "http://127.0.0.1:8080")]
    backend: String,

    /// Start with streaming replies disabled
    #[arg(long)]
    no_stream: bool,
}

/// Logs go to a file; stderr belongs to the TUI.
fn init_logging() -> Result<()> {
    let Some(data_dir) = dirs::data_dir() else {
        return Ok(());
    };
    let log_dir = data_dir.join("companion");
    std::fs::create_dir_all(&log_dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("companion.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    info!(backend = %cli.backend, "starting companion");

    let client = BackendClient::new(&cli.backend)?;
    let config = Config::load().unwrap_or_default();

    let (events_tx, mut backend_rx) = mpsc::unbounded_channel();
    let mut app = App::new(client.clone(), config, events_tx.clone());
    if cli.no_stream {
        app.streaming_enabled = false;
    }

    // The poller's first tick fires immediately and doubles as the
    // startup health check and profile fetch.
    let poller = Poller::start(client, events_tx);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new(Duration::from_millis(300));

    let run_result = run(&mut app, &mut terminal, &mut events, &mut backend_rx).await;

    app.shutdown();
    poller.stop();
    tui::restore()?;

    run_result
}

async fn run(
    app: &mut App,
    terminal: &mut tui::Tui,
    events: &mut tui::EventHandler,
    backend_rx: &mut mpsc::UnboundedReceiver<events::BackendEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(event) => handler::handle_event(app, event)?,
                    None => break,
                }
            }
            maybe_backend = backend_rx.recv() => {
                if let Some(event) = maybe_backend {
                    app.handle_backend_event(event);
                }
            }
        }
    }
    Ok(())
}
