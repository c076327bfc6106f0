//! Bridge between a local terminal session and a remote WebSocket peer.
//!
//! - [`transport`]: the [`Transport`] seam and its WebSocket implementation
//! - [`protocol`]: control messages and inbound frame classification
//! - [`pump`]: blocking PTY reader feeding the bounded output buffer
//! - [`bridge`]: the reconnecting session loop

pub mod bridge;
pub mod protocol;
pub mod pump;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeError, BridgeState, BridgeStats, SessionBridge, TerminalPort};
pub use protocol::{decode, ControlMessage, DataFraming, Inbound};
pub use pump::{
    join_pump, output_buffer, spawn_output_pump, DEFAULT_BUFFER_CHUNKS, READ_CHUNK,
};
pub use transport::{Frame, Transport, WsChannel, DEFAULT_HANDSHAKE_TIMEOUT};
