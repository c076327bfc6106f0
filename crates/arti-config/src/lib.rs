//! Agent configuration.
//!
//! Settings come from (highest priority first) command-line flags, the
//! environment, an optional TOML file, and built-in defaults. Every section
//! uses `serde(default)` so a partial file only overrides what it names.

pub mod schema;
pub mod target;
pub mod toml_loader;
pub mod validation;

pub use schema::{AgentConfig, BridgeSettings, ServerConfig, ShellConfig};
pub use target::{normalize_scheme, resolve_server_url, DEFAULT_SERVER_URL, URL_ENV_VAR};
pub use toml_loader::load_from_path;
