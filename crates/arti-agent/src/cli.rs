use std::path::PathBuf;
use std::time::Duration;

use arti_bridge::BridgeConfig;
use arti_common::{DataFrameMode, TextFallback};
use arti_config::validation::{HEARTBEAT_MAX_MS, HEARTBEAT_MIN_MS};
use arti_config::{resolve_server_url, AgentConfig};
use clap::Parser;

/// arti-ssh-agent: expose a local shell to a remote WebSocket peer.
#[derive(Parser, Debug)]
#[command(name = "arti-ssh-agent", version, about)]
pub struct Args {
    /// Server WebSocket URL (overrides ARTI_SSH_URL and the config file).
    #[arg(short, long)]
    pub url: Option<String>,

    /// Config file path (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Shell to launch instead of $SHELL.
    #[arg(long)]
    pub shell: Option<String>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Frame type used for terminal output (binary, text).
    #[arg(long)]
    pub data_frames: Option<DataFrameMode>,

    /// Handling of text frames that are not control messages (input, drop).
    #[arg(long)]
    pub text_fallback: Option<TextFallback>,

    /// Heartbeat interval in milliseconds (1000-3600000); 0 disables pings.
    #[arg(long, value_parser = parse_heartbeat_ms)]
    pub heartbeat_ms: Option<u64>,
}

pub fn parse() -> Args {
    Args::parse()
}

/// Everything the agent needs after flags, environment and file are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    /// Explicit shell, or `None` to detect it from the environment.
    pub shell: Option<String>,
    pub handshake_timeout: Duration,
    pub buffer_chunks: usize,
    pub bridge: BridgeConfig,
}

impl Args {
    /// Merge flags over `env_url` over `config`.
    pub fn settings(&self, config: &AgentConfig, env_url: Option<&str>) -> Settings {
        let file = &config.bridge;

        let url = resolve_server_url(self.url.as_deref(), env_url, config.server.url.as_deref());

        let shell = non_empty(self.shell.as_deref())
            .or_else(|| non_empty(config.shell.program.as_deref()))
            .map(str::to_string);

        let heartbeat_interval = match self.heartbeat_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => file.heartbeat_interval(),
        };

        Settings {
            url,
            shell,
            handshake_timeout: file.handshake_timeout(),
            buffer_chunks: file.buffer_chunks,
            bridge: BridgeConfig {
                connect_backoff: file.connect_backoff(),
                reconnect_delay: file.reconnect_delay(),
                heartbeat_interval,
                data_frames: self.data_frames.unwrap_or(file.data_frames),
                text_fallback: self.text_fallback.unwrap_or(file.text_fallback),
            },
        }
    }
}

/// Same bounds as `bridge.heartbeat_interval_ms` in the config file.
fn parse_heartbeat_ms(value: &str) -> Result<u64, String> {
    let ms: u64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of milliseconds"))?;
    if ms == 0 || (HEARTBEAT_MIN_MS..=HEARTBEAT_MAX_MS).contains(&ms) {
        Ok(ms)
    } else {
        Err(format!(
            "must be 0 or between {HEARTBEAT_MIN_MS} and {HEARTBEAT_MAX_MS}"
        ))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
