//! Shell detection.

/// Interpreter used when the environment does not declare one.
#[cfg(not(windows))]
pub const FALLBACK_SHELL: &str = "/bin/bash";

#[cfg(windows)]
pub const FALLBACK_SHELL: &str = "cmd.exe";

/// Detect the user's shell.
///
/// - On Unix: reads `SHELL`, falling back to [`FALLBACK_SHELL`].
/// - On Windows: reads `COMSPEC`, falling back to `cmd.exe`.
pub fn detect_shell() -> String {
    #[cfg(windows)]
    let var = "COMSPEC";
    #[cfg(not(windows))]
    let var = "SHELL";

    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}
