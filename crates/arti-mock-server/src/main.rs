//! arti-mock-server: a local stand-in for the remote gateway.
//!
//! Serves `/ws`, greets every agent with `date\n`, prints whatever the agent
//! sends to stdout, and relays stdin lines to all connected agents
//! (`/resize ROWS COLS` sends a resize control message instead).

mod connection;
mod console;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::connection::handle_connection;
use crate::console::{parse_line, Outgoing};

/// Path agents must connect to.
const WS_PATH: &str = "/ws";

#[derive(Parser)]
#[command(name = "arti-mock-server", about = "Mock WebSocket gateway for arti-ssh-agent")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arti_mock_server=info".into()),
        )
        .init();

    let args = Args::parse();

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind {addr}");
            return std::process::ExitCode::FAILURE;
        }
    };
    tracing::info!("arti-mock-server listening on ws://{addr}{WS_PATH}");

    let (console_tx, _) = broadcast::channel::<Outgoing>(256);
    tokio::spawn(read_console(console_tx.clone()));

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let console = console_tx.subscribe();
                tokio::spawn(async move {
                    match accept_hdr_async(stream, check_path).await {
                        Ok(ws) => handle_connection(ws, peer, console).await,
                        Err(e) => {
                            tracing::warn!(peer = %peer, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Reject upgrades on any path other than [`WS_PATH`].
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == WS_PATH {
        return Ok(response);
    }
    let mut rejection = ErrorResponse::new(Some(format!("no endpoint at {}", request.uri().path())));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

/// Forward stdin lines to every connected agent until stdin closes.
async fn read_console(tx: broadcast::Sender<Outgoing>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(outgoing) => {
                    if tx.send(outgoing).is_err() {
                        tracing::info!("No agent connected; input discarded");
                    }
                }
                Err(e) => tracing::warn!("{e}"),
            },
            Ok(None) => {
                tracing::info!("stdin closed; console input disabled");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read error");
                return;
            }
        }
    }
}
