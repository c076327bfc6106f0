use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default terminal rows.
pub const DEFAULT_ROWS: u16 = 24;

/// Default terminal columns.
pub const DEFAULT_COLS: u16 = 80;

/// Default capacity of the terminal output buffer, in read chunks.
pub const DEFAULT_BUFFER_CHUNKS: usize = 1_024;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub rows: u16,
    pub cols: u16,
}

impl TermSize {
    /// Returns `None` unless both dimensions are positive.
    pub fn new(rows: u16, cols: u16) -> Option<Self> {
        (rows > 0 && cols > 0).then_some(Self { rows, cols })
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// WebSocket frame type used for outbound terminal output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFrameMode {
    /// Raw bytes in binary frames.
    #[default]
    Binary,
    /// UTF-8 text frames, for gateways that only relay text.
    Text,
}

/// What to do with a text frame that is not a recognizable control message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFallback {
    /// Write the payload to the terminal verbatim.
    #[default]
    Input,
    /// Log and discard the payload.
    Drop,
}

impl fmt::Display for DataFrameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFrameMode::Binary => f.write_str("binary"),
            DataFrameMode::Text => f.write_str("text"),
        }
    }
}

impl FromStr for DataFrameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(DataFrameMode::Binary),
            "text" => Ok(DataFrameMode::Text),
            other => Err(format!("unknown data frame mode '{other}' (expected binary or text)")),
        }
    }
}

impl fmt::Display for TextFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextFallback::Input => f.write_str("input"),
            TextFallback::Drop => f.write_str("drop"),
        }
    }
}

impl FromStr for TextFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(TextFallback::Input),
            "drop" => Ok(TextFallback::Drop),
            other => Err(format!("unknown text fallback '{other}' (expected input or drop)")),
        }
    }
}
