pub mod errors;
pub mod types;

pub use errors::{AgentError, ConfigError, TerminalError, TransportError};
pub use types::{
    DataFrameMode, TermSize, TextFallback, DEFAULT_BUFFER_CHUNKS, DEFAULT_COLS, DEFAULT_ROWS,
};

pub type Result<T> = std::result::Result<T, AgentError>;
