//! TOML config file loading.

use crate::schema::AgentConfig;
use crate::validation;
use arti_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields.
/// After loading, the config is validated; if validation fails, a warning
/// is logged and the default config is returned.
pub fn load_from_path(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config = parse(&content)?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
        warn!("falling back to default config");
        return Ok(AgentConfig::default());
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Parse a TOML document into a config without validating it.
pub fn parse(content: &str) -> Result<AgentConfig, ConfigError> {
    toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arti_common::{DataFrameMode, TextFallback};

    #[test]
    fn load_from_nonexistent_returns_file_not_found() {
        let result = load_from_path(Path::new("/tmp/nonexistent_arti_config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_valid_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
[server]
url = "wss://gw.example.com/agent"

[bridge]
connect_backoff_ms = 500
text_fallback = "drop"
"#,
        )
        .unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(
            config.server.url.as_deref(),
            Some("wss://gw.example.com/agent")
        );
        assert_eq!(config.bridge.connect_backoff_ms, 500);
        assert_eq!(config.bridge.text_fallback, TextFallback::Drop);
        // Defaults preserved
        assert_eq!(config.bridge.reconnect_delay_ms, 1_000);
        assert_eq!(config.bridge.data_frames, DataFrameMode::Binary);
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        let result = load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn unknown_enum_value_is_parse_error() {
        let result = parse("[bridge]\ndata_frames = \"morse\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_config_with_invalid_values_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
[bridge]
buffer_chunks = 0
"#,
        )
        .unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config, AgentConfig::default());
    }
}
