//! Per-connection handler: greet the agent, print its output, relay the
//! operator console.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::console::Outgoing;

/// Sent as soon as an agent connects.
pub const GREETING: &[u8] = b"date\n";

/// Handle a single agent connection until either side closes it.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    mut console: broadcast::Receiver<Outgoing>,
) {
    let (mut sink, mut stream) = ws.split();
    tracing::info!(peer = %addr, "Agent connected");

    if let Err(e) = sink.send(Message::Binary(GREETING.to_vec().into())).await {
        tracing::warn!(peer = %addr, error = %e, "Failed to send greeting");
        return;
    }

    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let payload = match incoming {
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(peer = %addr, frame = ?frame, "Agent closed connection");
                        break;
                    }
                    // tungstenite answers pings on the next write.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(peer = %addr, error = %e, "WS read error");
                        break;
                    }
                    None => break,
                };
                if stdout.write_all(&payload).await.is_err() || stdout.flush().await.is_err() {
                    tracing::warn!("stdout closed");
                }
            }
            outgoing = console.recv() => {
                let msg = match outgoing {
                    Ok(outgoing) => match outgoing.into_message() {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to encode console message");
                            continue;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(peer = %addr, skipped, "Console input dropped for slow agent");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!(peer = %addr, error = %e, "WS write error");
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
    tracing::info!(peer = %addr, "Agent disconnected");
}
