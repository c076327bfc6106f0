//! Session bridge: keeps one terminal session attached to a remote peer
//! across any number of connections.
//!
//! The bridge loops `Disconnected → Connecting → Connected → Disconnected`
//! until the shutdown token fires. Each successful connect starts an
//! *epoch* with its own writer (buffer → socket, plus heartbeat pings) and
//! decoder (socket → terminal). The writer is the only task that writes to
//! the transport during an epoch. An epoch is fully torn down, and its writer
//! has handed the buffer back, before the next connect is attempted.

mod epoch;

use std::sync::Arc;
use std::time::Duration;

use arti_common::{DataFrameMode, TerminalError, TextFallback};
use arti_terminal::PtySession;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;
use epoch::{EpochEnd, Outbound};

// =============================================================================
// TERMINAL PORT
// =============================================================================

/// The terminal operations the bridge needs.
pub trait TerminalPort: Send + Sync + 'static {
    fn write_input(&self, data: &[u8]) -> Result<(), TerminalError>;

    fn resize(&self, rows: u16, cols: u16) -> Result<(), TerminalError>;

    /// Idempotent teardown.
    fn close(&self);
}

impl TerminalPort for PtySession {
    fn write_input(&self, data: &[u8]) -> Result<(), TerminalError> {
        self.write(data)
    }

    fn resize(&self, rows: u16, cols: u16) -> Result<(), TerminalError> {
        PtySession::resize(self, rows, cols)
    }

    fn close(&self) {
        PtySession::close(self)
    }
}

// =============================================================================
// CONFIG / STATE
// =============================================================================

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Wait after a failed connect attempt.
    pub connect_backoff: Duration,
    /// Wait after an established connection drops.
    pub reconnect_delay: Duration,
    /// Ping interval while connected; `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    pub data_frames: DataFrameMode,
    pub text_fallback: TextFallback,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_backoff: Duration::from_secs(3),
            reconnect_delay: Duration::from_secs(1),
            heartbeat_interval: Some(Duration::from_secs(30)),
            data_frames: DataFrameMode::Binary,
            text_fallback: TextFallback::Input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
    ShuttingDown,
}

/// Counters reported when [`SessionBridge::run`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    /// Completed backoff waits after failed connects.
    pub backoff_waits: u64,
    pub epochs: u64,
    pub bytes_forwarded: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("output writer task failed: {0}")]
    WriterLost(String),
}

// =============================================================================
// BRIDGE
// =============================================================================

pub struct SessionBridge<T: Transport, P: TerminalPort> {
    transport: Arc<T>,
    terminal: Arc<P>,
    config: BridgeConfig,
    state: watch::Sender<BridgeState>,
}

impl<T: Transport, P: TerminalPort> SessionBridge<T, P> {
    pub fn new(transport: Arc<T>, terminal: Arc<P>, config: BridgeConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Disconnected);
        Self {
            transport,
            terminal,
            config,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` is cancelled, then close the transport and the
    /// terminal.
    ///
    /// `output` is the consumer end of the terminal output buffer; it is
    /// lent to one epoch writer at a time.
    pub async fn run(
        self,
        output: mpsc::Receiver<Vec<u8>>,
        shutdown: CancellationToken,
    ) -> Result<BridgeStats, BridgeError> {
        let mut stats = BridgeStats::default();
        let mut outbound = Outbound::new(output, self.config.data_frames);

        let result = loop {
            if shutdown.is_cancelled() {
                break Ok(());
            }

            self.set_state(BridgeState::Connecting);
            stats.connect_attempts += 1;
            tracing::info!(attempt = stats.connect_attempts, "Connecting to server...");

            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                result = self.transport.connect() => Some(result),
            };
            let Some(connected) = connected else {
                break Ok(());
            };

            if let Err(e) = connected {
                stats.connect_failures += 1;
                self.set_state(BridgeState::Disconnected);
                tracing::warn!(
                    error = %e,
                    retry_in_ms = self.config.connect_backoff.as_millis() as u64,
                    "Connection failed"
                );
                if !backoff(self.config.connect_backoff, &shutdown).await {
                    break Ok(());
                }
                stats.backoff_waits += 1;
                continue;
            }

            stats.epochs += 1;
            self.set_state(BridgeState::Connected);
            tracing::info!(epoch = stats.epochs, "Connected to server");

            let (returned, end, sent) = match self.run_epoch(outbound, &shutdown).await {
                Ok(v) => v,
                Err(e) => break Err(e),
            };
            outbound = returned;
            stats.bytes_forwarded += sent;
            match &end {
                EpochEnd::Transport(e) if !e.is_disconnect() => {
                    tracing::warn!(epoch = stats.epochs, error = %e, bytes = sent, "Connection lost");
                }
                _ => tracing::info!(epoch = stats.epochs, reason = %end, bytes = sent, "Disconnected"),
            }

            if shutdown.is_cancelled() {
                break Ok(());
            }
            self.set_state(BridgeState::Disconnected);
            if !backoff(self.config.reconnect_delay, &shutdown).await {
                break Ok(());
            }
        };

        self.set_state(BridgeState::ShuttingDown);
        tracing::info!("Shutting down bridge");
        self.transport.close().await;
        self.terminal.close();

        result.map(|()| stats)
    }

    /// One connection's worth of pumping. Returns the buffer consumer, why
    /// the epoch ended, and how many bytes went out.
    async fn run_epoch(
        &self,
        outbound: Outbound,
        shutdown: &CancellationToken,
    ) -> Result<(Outbound, EpochEnd, u64), BridgeError> {
        let epoch = shutdown.child_token();
        let heartbeat = self
            .config
            .heartbeat_interval
            .filter(|every| !every.is_zero());

        let writer = tokio::spawn(epoch::forward_output(
            Arc::clone(&self.transport),
            outbound,
            heartbeat,
            epoch.clone(),
        ));

        let decoded = epoch::decode_loop(
            self.transport.as_ref(),
            self.terminal.as_ref(),
            self.config.text_fallback,
            &epoch,
        )
        .await;

        epoch.cancel();
        self.transport.close().await;

        let exit = writer
            .await
            .map_err(|e| BridgeError::WriterLost(e.to_string()))?;
        // A writer failure cancels the epoch, so the decoder only reports
        // the cancellation.
        let end = match (decoded, exit.error) {
            (EpochEnd::Cancelled, Some(e)) => EpochEnd::Transport(e),
            (decoded, _) => decoded,
        };

        Ok((exit.out, end, exit.sent))
    }

    fn set_state(&self, state: BridgeState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Bridge state");
        }
    }
}

/// Sleep for `delay` unless shutdown fires first. Returns `false` on
/// shutdown.
async fn backoff(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
