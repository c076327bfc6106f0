//! Per-connection tasks: the writer (output and heartbeat) and the inbound
//! decoder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arti_common::{DataFrameMode, TextFallback, TransportError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::TerminalPort;
use crate::protocol::{decode, DataFraming, Inbound};
use crate::transport::{Frame, Transport};

// =============================================================================
// OUTBOUND STATE
// =============================================================================

/// Everything the writer owns for the duration of one epoch and hands back
/// when it stops.
pub(super) struct Outbound {
    rx: mpsc::Receiver<Vec<u8>>,
    framing: DataFraming,
    /// Frame whose write failed; sent first on the next connection.
    unsent: Option<Frame>,
    output_closed: bool,
}

impl Outbound {
    pub(super) fn new(rx: mpsc::Receiver<Vec<u8>>, mode: DataFrameMode) -> Self {
        Self {
            rx,
            framing: DataFraming::new(mode),
            unsent: None,
            output_closed: false,
        }
    }
}

/// Why an epoch's decoder stopped.
#[derive(Debug)]
pub(super) enum EpochEnd {
    Cancelled,
    Transport(TransportError),
}

impl fmt::Display for EpochEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpochEnd::Cancelled => f.write_str("epoch cancelled"),
            EpochEnd::Transport(e) => write!(f, "{e}"),
        }
    }
}

// =============================================================================
// WRITER (PTY → WS)
// =============================================================================

/// What the writer hands back when it stops.
pub(super) struct WriterExit {
    pub(super) out: Outbound,
    pub(super) sent: u64,
    /// The failed send or ping that ended the epoch, if any.
    pub(super) error: Option<TransportError>,
}

enum Step {
    Send(Frame),
    Ping,
}

/// Sole writer for one epoch: drains the output buffer into the transport
/// and, when `heartbeat` is set, interleaves pings. Stops when the epoch is
/// cancelled or a write fails. A failed write closes the transport so the
/// decoder notices, and a failed data frame is kept for the next epoch.
pub(super) async fn forward_output<T: Transport>(
    transport: Arc<T>,
    mut out: Outbound,
    heartbeat: Option<Duration>,
    epoch: CancellationToken,
) -> WriterExit {
    let mut sent: u64 = 0;
    let mut error = None;
    let mut ticker = heartbeat.map(|every| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let step = match out.unsent.take() {
            Some(frame) => {
                tracing::debug!(bytes = frame.len(), "Resending frame from previous connection");
                Step::Send(frame)
            }
            None => {
                let next = tokio::select! {
                    biased;
                    _ = epoch.cancelled() => break,
                    _ = next_tick(&mut ticker) => None,
                    chunk = out.rx.recv(), if !out.output_closed => Some(chunk),
                };
                match next {
                    None => Step::Ping,
                    Some(Some(chunk)) => match out.framing.frame(chunk) {
                        Some(frame) => Step::Send(frame),
                        None => continue,
                    },
                    Some(None) => {
                        tracing::info!("Terminal output closed");
                        out.output_closed = true;
                        continue;
                    }
                }
            }
        };

        let result = match &step {
            Step::Send(frame) => transport.send(frame).await,
            Step::Ping => transport.ping().await,
        };
        match (result, step) {
            (Ok(()), Step::Send(frame)) => sent += frame.len() as u64,
            (Ok(()), Step::Ping) => tracing::trace!("Heartbeat sent"),
            (Err(e), step) => {
                match step {
                    Step::Send(frame) => {
                        tracing::warn!(error = %e, "WS write error");
                        out.unsent = Some(frame);
                    }
                    Step::Ping => tracing::warn!(error = %e, "Heartbeat failed"),
                }
                error = Some(e);
                epoch.cancel();
                transport.close().await;
                break;
            }
        }
    }

    tracing::debug!(bytes = sent, "Writer routine exited");
    WriterExit { out, sent, error }
}

/// Next heartbeat tick; never resolves when the heartbeat is off.
async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// =============================================================================
// DECODER (WS → PTY)
// =============================================================================

pub(super) async fn decode_loop<T, P>(
    transport: &T,
    terminal: &P,
    fallback: TextFallback,
    epoch: &CancellationToken,
) -> EpochEnd
where
    T: Transport + ?Sized,
    P: TerminalPort + ?Sized,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = epoch.cancelled() => return EpochEnd::Cancelled,
            frame = transport.receive() => frame,
        };

        match frame {
            Ok(frame) => dispatch(terminal, decode(frame, fallback)),
            Err(e) => return EpochEnd::Transport(e),
        }
    }
}

/// Apply one decoded frame. Terminal errors are logged, never propagated.
fn dispatch<P: TerminalPort + ?Sized>(terminal: &P, inbound: Inbound) {
    match inbound {
        Inbound::Data(data) => {
            if data.is_empty() {
                return;
            }
            tracing::trace!(bytes = data.len(), "Received data from peer");
            if let Err(e) = terminal.write_input(&data) {
                tracing::warn!(error = %e, "PTY write error");
            }
        }
        Inbound::Resize { rows, cols } => {
            tracing::info!(rows, cols, "Resizing terminal");
            if let Err(e) = terminal.resize(rows, cols) {
                tracing::warn!(error = %e, rows, cols, "PTY resize failed");
            }
        }
        Inbound::Ignored(reason) => {
            tracing::debug!(%reason, "Ignoring frame");
        }
    }
}
