//! Target address resolution and scheme normalization.

/// Environment variable holding the server URL.
pub const URL_ENV_VAR: &str = "ARTI_SSH_URL";

/// Used when no flag, environment variable or config value is set.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/ws";

/// Pick the server URL by precedence: flag, environment, config file, default.
///
/// Empty values count as unset. The result is passed through
/// [`normalize_scheme`].
pub fn resolve_server_url(
    flag: Option<&str>,
    env: Option<&str>,
    file: Option<&str>,
) -> String {
    let raw = [flag, env, file]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SERVER_URL);

    normalize_scheme(raw)
}

/// Add a WebSocket scheme to a bare address.
///
/// Loopback-looking addresses get `ws://`; anything else is assumed to be a
/// remote gateway behind TLS and gets `wss://`.
pub fn normalize_scheme(url: &str) -> String {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return url.to_string();
    }

    if url.contains("localhost") || url.contains("127.0.0.1") {
        format!("ws://{url}")
    } else {
        format!("wss://{url}")
    }
}
