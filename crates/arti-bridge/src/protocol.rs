//! Wire protocol between the agent and the remote peer.
//!
//! Binary frames carry raw terminal bytes in both directions. Text frames
//! from the peer carry either a JSON control message or, from peers that
//! type straight into a text frame, literal input:
//!
//! ```text
//! {"type":"resize","rows":40,"cols":120}
//! {"type":"input","data":"ls -la\n"}
//! ```
//!
//! Outbound terminal output uses binary or text frames depending on
//! [`DataFrameMode`].

use arti_common::{DataFrameMode, TextFallback};
use serde::{Deserialize, Serialize};

use crate::transport::Frame;

// =============================================================================
// CONTROL MESSAGES
// =============================================================================

/// Structured message carried in a text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireControl", try_from = "WireControl")]
pub enum ControlMessage {
    Resize { rows: u16, cols: u16 },
    Input { data: String },
}

/// Flat on-the-wire shape. Zero and empty fields are omitted so a resize
/// never carries `data` and an input never carries `rows`/`cols`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireControl {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    rows: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    cols: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    data: String,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

impl From<ControlMessage> for WireControl {
    fn from(msg: ControlMessage) -> Self {
        match msg {
            ControlMessage::Resize { rows, cols } => WireControl {
                kind: "resize".into(),
                rows,
                cols,
                ..Default::default()
            },
            ControlMessage::Input { data } => WireControl {
                kind: "input".into(),
                data,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<WireControl> for ControlMessage {
    type Error = String;

    fn try_from(wire: WireControl) -> Result<Self, Self::Error> {
        match wire.kind.as_str() {
            "resize" => Ok(ControlMessage::Resize {
                rows: wire.rows,
                cols: wire.cols,
            }),
            "input" => Ok(ControlMessage::Input { data: wire.data }),
            "" => Err("missing control type".into()),
            other => Err(format!("unknown control type '{other}'")),
        }
    }
}

// =============================================================================
// INBOUND DECODING
// =============================================================================

/// What the bridge should do with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Bytes to write to the terminal.
    Data(Vec<u8>),
    /// New terminal size.
    Resize { rows: u16, cols: u16 },
    /// Nothing to apply; the reason is only logged.
    Ignored(String),
}

/// Classify an inbound frame.
///
/// A text frame that is a JSON object with a non-empty `type` is a control
/// message; unknown types are ignored. Everything else (not JSON, or JSON
/// without a `type`) goes through `fallback`.
pub fn decode(frame: Frame, fallback: TextFallback) -> Inbound {
    let text = match frame {
        Frame::Binary(data) => return Inbound::Data(data),
        Frame::Text(text) => text,
    };

    match serde_json::from_str::<WireControl>(&text) {
        Ok(wire) if !wire.kind.is_empty() => match ControlMessage::try_from(wire) {
            Ok(ControlMessage::Resize { rows, cols }) => Inbound::Resize { rows, cols },
            Ok(ControlMessage::Input { data }) => Inbound::Data(data.into_bytes()),
            Err(reason) => Inbound::Ignored(reason),
        },
        _ => match fallback {
            TextFallback::Input => Inbound::Data(text.into_bytes()),
            TextFallback::Drop => Inbound::Ignored(format!(
                "non-control text frame ({} bytes)",
                text.len()
            )),
        },
    }
}

// =============================================================================
// OUTBOUND FRAMING
// =============================================================================

/// Turns terminal output chunks into data frames.
///
/// In text mode a multi-byte UTF-8 sequence split across two reads is held
/// back until the rest arrives, so every text frame is valid UTF-8. Bytes
/// that can never form valid UTF-8 are replaced with U+FFFD.
#[derive(Debug)]
pub struct DataFraming {
    mode: DataFrameMode,
    carry: Vec<u8>,
}

impl DataFraming {
    pub fn new(mode: DataFrameMode) -> Self {
        Self {
            mode,
            carry: Vec::new(),
        }
    }

    pub fn mode(&self) -> DataFrameMode {
        self.mode
    }

    /// Frame one chunk. Returns `None` when there is nothing to send yet.
    pub fn frame(&mut self, chunk: Vec<u8>) -> Option<Frame> {
        match self.mode {
            DataFrameMode::Binary => (!chunk.is_empty()).then_some(Frame::Binary(chunk)),
            DataFrameMode::Text => {
                let text = self.decode_utf8(chunk);
                (!text.is_empty()).then_some(Frame::Text(text))
            }
        }
    }

    fn decode_utf8(&mut self, chunk: Vec<u8>) -> String {
        let bytes = if self.carry.is_empty() {
            chunk
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(&chunk);
            joined
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk.
                            self.carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================
