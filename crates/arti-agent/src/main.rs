//! arti-ssh-agent: attaches a local shell to a remote WebSocket gateway and
//! keeps it attached across reconnects until SIGINT/SIGTERM.

mod cli;
mod signals;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use arti_bridge::{join_pump, output_buffer, spawn_output_pump, SessionBridge, WsChannel};
use arti_common::AgentError;
use arti_config::{AgentConfig, URL_ENV_VAR};
use arti_terminal::PtySession;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How long to wait for the output pump thread after the shell is closed.
const PUMP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

fn init_logging(level: Option<&str>) {
    let directive = level.unwrap_or("arti=info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                directive
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_logging(args.log_level.as_deref());

    tracing::info!("arti-ssh-agent v{} starting...", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: cli::Args) -> arti_common::Result<()> {
    let config = match &args.config {
        Some(path) => {
            tracing::info!("Using config file: {}", path.display());
            arti_config::load_from_path(path)?
        }
        None => AgentConfig::default(),
    };
    let env_url = std::env::var(URL_ENV_VAR).ok();
    let settings = args.settings(&config, env_url.as_deref());

    let terminal = Arc::new(match &settings.shell {
        Some(shell) => PtySession::with_shell(shell.as_str()),
        None => PtySession::new(),
    });
    let reader = terminal.start()?;
    if let Err(e) = terminal.set_default_size() {
        tracing::warn!(error = %e, "Failed to set default terminal size");
    }
    tracing::info!(
        shell = terminal.shell(),
        pid = ?terminal.pid(),
        size = %terminal.size(),
        "Terminal ready"
    );

    let shutdown = CancellationToken::new();
    signals::spawn_shutdown_listener(shutdown.clone());

    let (tx, rx) = output_buffer(settings.buffer_chunks);
    let pump = spawn_output_pump(reader, tx, shutdown.clone())?;

    let transport = Arc::new(
        WsChannel::new(settings.url.as_str()).with_handshake_timeout(settings.handshake_timeout),
    );
    tracing::info!(url = %transport.url(), "Bridging terminal");

    let bridge = SessionBridge::new(transport, Arc::clone(&terminal), settings.bridge);
    let outcome = bridge.run(rx, shutdown.clone()).await;
    shutdown.cancel();

    join_pump(pump, PUMP_JOIN_TIMEOUT).await;

    let stats = outcome.map_err(|e| AgentError::Other(e.to_string()))?;
    tracing::info!(
        attempts = stats.connect_attempts,
        failures = stats.connect_failures,
        epochs = stats.epochs,
        bytes = stats.bytes_forwarded,
        "Bridge stopped"
    );

    Ok(())
}
