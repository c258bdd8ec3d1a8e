//! dev-refresh: reload web pages when watched files change.
//!
//! # Architecture Overview
//!
//! ```text
//!  filesystem events        browser requests
//!        │                        │
//!        ▼                        ▼
//!  ┌───────────┐           ┌──────────────┐
//!  │   watch   │           │     http     │
//!  │  signal   │           │   server     │
//!  └─────┬─────┘           └──┬───────┬───┘
//!        │ trigger             │       │
//!        ▼                     │       ▼
//!  ┌───────────┐      poll    │  ┌──────────────┐
//!  │  runner   │              │  │ static files │
//!  │supervisor │              │  │  or proxy    │
//!  └─────┬─────┘              │  │  + injector  │
//!        │ outcome            │  └──────────────┘
//!        ▼                    ▼
//!  ┌─────────────────────────────┐
//!  │      reload coordinator     │
//!  │  epoch + pending long-polls │
//!  └─────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dev_refresh::config::{self, Options};
use dev_refresh::http::HttpServer;
use dev_refresh::reload::Coordinator;
use dev_refresh::runner::Supervisor;
use dev_refresh::watch::ChangeSignal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dev_refresh=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = Options::parse();
    let settings = match config::validate(options) {
        Ok(settings) => settings,
        // Configuration conflicts are fatal before any server starts.
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Explicit wiring: one coordinator, shared by the HTTP layer and the
    // supervisor completion loop. No ambient singletons.
    let coordinator = Arc::new(Coordinator::new(settings.command.clone()));

    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

    let supervisor = Supervisor::new(settings.command.clone(), trigger_rx, completion_tx);
    tokio::spawn(supervisor.run());

    tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            while let Some(outcome) = completion_rx.recv().await {
                coordinator.publish(outcome);
            }
        }
    });

    // The watcher must stay alive for the watches to stay registered.
    let _watcher = if settings.watching() {
        Some(ChangeSignal::spawn(
            &settings.watch_paths,
            settings.quiet_window,
            trigger_tx.clone(),
        )?)
    } else {
        None
    };

    // Run the command once at startup so the first page load sees a
    // current build.
    let _ = trigger_tx.send(());

    match settings.mode.clone() {
        Some(mode) => {
            let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
            let addr = listener.local_addr()?;
            tracing::info!(address = %addr, "Listening");

            if settings.open_browser {
                let url = format!("http://{}:{}", settings.host, settings.port);
                if let Err(e) = open::that(&url) {
                    tracing::warn!(url = %url, error = %e, "Failed to open browser");
                }
            }

            let server = HttpServer::new(&settings, mode, coordinator);
            server.run(listener).await?;
        }
        None => {
            // Watch-and-run only; no server requested.
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
