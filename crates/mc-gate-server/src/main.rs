mod commands;
mod config;
mod connection;
mod diagnostics;
mod error;
mod listener;
mod policy;
mod pool;
mod state;
mod tunnel;

use std::sync::Arc;
use std::time::Duration;

use config::GateConfig;
use diagnostics::FileSink;
use policy::Policy;
use state::ProxyState;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info};

/// How long shutdown waits for kick packets to reach clients.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let config = match GateConfig::load("gate.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load gate.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "mc-gate v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        config.listen_addr()
    );
    info!("Wrapped server: {}", config.server_addr());
    info!("Max players: {}", config.proxy.max_players);
    info!(
        "Whitelist: {}, auto-ban: {}",
        config.permissions.whitelist_enabled, config.permissions.auto_ban
    );

    let policy = Policy::load(&config);
    let diagnostics = Arc::new(FileSink::new(config.data.path("diagnostics")));
    let state = Arc::new(ProxyState::new(config, policy, diagnostics));

    // Handle Ctrl+C
    let signal_state = state.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        signal_state.request_shutdown();
    });

    // Console: each stdin line is a command run with console rank
    let console_state = state.clone();
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if !line.is_empty() {
                console_state.commands.run_console(&console_state, line);
            }
        }
    });

    if let Err(e) = listener::run(state.clone()).await {
        error!("Failed to listen on {}: {e}", state.config.listen_addr());
        std::process::exit(1);
    }

    state.kick_all("Server closed");
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while state.pool.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        info!(
            "{} connections still open at exit",
            state.pool.active_count()
        );
    }
    info!("Proxy shut down.");
}
