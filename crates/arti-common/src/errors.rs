use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors originating from the PTY-backed shell session.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    #[error("terminal session already started")]
    AlreadyStarted,

    #[error("terminal session not started")]
    NotStarted,

    #[error("invalid terminal size {rows}x{cols}")]
    InvalidSize { rows: u16, cols: u16 },

    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors originating from the WebSocket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection not established")]
    NotConnected,

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    #[error("write failed: {0}")]
    Write(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("connection closed")]
    ConnectionClosed,
}

impl TransportError {
    /// Whether the error means the connection is gone (as opposed to a
    /// failed dial that never produced one).
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionClosed
                | TransportError::Read(_)
                | TransportError::Write(_)
                | TransportError::NotConnected
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("bridge.buffer_chunks".into());
        assert_eq!(
            err.to_string(),
            "config validation error: bridge.buffer_chunks"
        );
    }

    #[test]
    fn terminal_error_display() {
        assert_eq!(
            TerminalError::NotStarted.to_string(),
            "terminal session not started"
        );
        assert_eq!(
            TerminalError::InvalidSize { rows: 0, cols: 80 }.to_string(),
            "invalid terminal size 0x80"
        );
        assert_eq!(
            TerminalError::SpawnFailed("no such file".into()).to_string(),
            "failed to spawn shell: no such file"
        );
    }

    #[test]
    fn transport_error_display() {
        assert_eq!(
            TransportError::NotConnected.to_string(),
            "connection not established"
        );
        assert_eq!(
            TransportError::HandshakeTimeout(10_000).to_string(),
            "handshake timed out after 10000ms"
        );
        assert_eq!(
            TransportError::Dial("connection refused".into()).to_string(),
            "dial failed: connection refused"
        );
    }

    #[test]
    fn transport_error_disconnect_classification() {
        assert!(TransportError::ConnectionClosed.is_disconnect());
        assert!(TransportError::Read("reset".into()).is_disconnect());
        assert!(TransportError::Write("broken pipe".into()).is_disconnect());
        assert!(!TransportError::Dial("refused".into()).is_disconnect());
        assert!(!TransportError::HandshakeTimeout(1).is_disconnect());
    }

    #[test]
    fn agent_error_from_terminal() {
        let err: AgentError = TerminalError::NotStarted.into();
        assert!(matches!(err, AgentError::Terminal(_)));
        assert!(err.to_string().contains("not started"));
    }

    #[test]
    fn agent_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn terminal_error_from_io_is_transparent() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: TerminalError = io_err.into();
        assert_eq!(err.to_string(), "pipe closed");
    }
}
