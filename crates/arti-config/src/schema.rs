//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

use std::time::Duration;

use arti_common::{DataFrameMode, TextFallback, DEFAULT_BUFFER_CHUNKS};
use serde::{Deserialize, Serialize};

// =============================================================================
// Root
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub shell: ShellConfig,
    pub bridge: BridgeSettings,
}

// =============================================================================
// Server
// =============================================================================

/// Remote peer settings. The URL here sits below the `--url` flag and the
/// `ARTI_SSH_URL` environment variable in precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: Option<String>,
}

// =============================================================================
// Shell
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell executable. Falls back to `$SHELL` when unset.
    pub program: Option<String>,
}

// =============================================================================
// Bridge
// =============================================================================

/// Reconnection timing, buffering and wire policy for the session bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Wait after a failed connect attempt.
    pub connect_backoff_ms: u64,
    /// Wait after an established connection drops.
    pub reconnect_delay_ms: u64,
    /// Upper bound for the WebSocket handshake.
    pub handshake_timeout_ms: u64,
    /// Ping interval; `0` disables the heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Capacity of the terminal output buffer, in read chunks.
    pub buffer_chunks: usize,
    pub data_frames: DataFrameMode,
    pub text_fallback: TextFallback,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            connect_backoff_ms: 3_000,
            reconnect_delay_ms: 1_000,
            handshake_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            buffer_chunks: DEFAULT_BUFFER_CHUNKS,
            data_frames: DataFrameMode::Binary,
            text_fallback: TextFallback::Input,
        }
    }
}

impl BridgeSettings {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}
