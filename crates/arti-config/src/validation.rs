//! Configuration validation.
//!
//! Validates numeric ranges for the bridge settings.

use crate::schema::AgentConfig;
use arti_common::ConfigError;

/// Smallest non-zero heartbeat interval, in milliseconds.
pub const HEARTBEAT_MIN_MS: u64 = 1_000;

/// Largest heartbeat interval, in milliseconds.
pub const HEARTBEAT_MAX_MS: u64 = 3_600_000;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &AgentConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let bridge = &config.bridge;

    validate_range(
        &mut errors,
        "bridge.connect_backoff_ms",
        bridge.connect_backoff_ms,
        10,
        600_000,
    );
    validate_range(
        &mut errors,
        "bridge.reconnect_delay_ms",
        bridge.reconnect_delay_ms,
        0,
        600_000,
    );
    validate_range(
        &mut errors,
        "bridge.handshake_timeout_ms",
        bridge.handshake_timeout_ms,
        100,
        120_000,
    );
    if bridge.heartbeat_interval_ms != 0 {
        validate_range(
            &mut errors,
            "bridge.heartbeat_interval_ms",
            bridge.heartbeat_interval_ms,
            HEARTBEAT_MIN_MS,
            HEARTBEAT_MAX_MS,
        );
    }
    validate_range(
        &mut errors,
        "bridge.buffer_chunks",
        bridge.buffer_chunks as u64,
        1,
        65_536,
    );

    if let Some(url) = &config.server.url {
        if url.trim().is_empty() {
            errors.push("server.url is empty".into());
        }
    }
    if let Some(program) = &config.shell.program {
        if program.trim().is_empty() {
            errors.push("shell.program is empty".into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&AgentConfig::default()).is_ok());
    }

    #[test]
    fn catches_zero_buffer() {
        let mut config = AgentConfig::default();
        config.bridge.buffer_chunks = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bridge.buffer_chunks"));
    }

    #[test]
    fn heartbeat_zero_is_allowed_but_tiny_is_not() {
        let mut config = AgentConfig::default();
        config.bridge.heartbeat_interval_ms = 0;
        assert!(validate(&config).is_ok());

        config.bridge.heartbeat_interval_ms = 5;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bridge.heartbeat_interval_ms"));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = AgentConfig::default();
        config.bridge.connect_backoff_ms = 1;
        config.bridge.handshake_timeout_ms = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("bridge.connect_backoff_ms"));
        assert!(err.contains("bridge.handshake_timeout_ms"));
    }

    #[test]
    fn catches_blank_strings() {
        let mut config = AgentConfig::default();
        config.server.url = Some("   ".into());
        config.shell.program = Some(String::new());
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("server.url"));
        assert!(err.contains("shell.program"));
    }
}
