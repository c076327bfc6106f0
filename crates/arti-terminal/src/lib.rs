//! PTY-backed shell session for the agent.
//!
//! The session owns exactly one child shell attached to a pseudo-terminal.
//! Output is handed to the caller as a blocking reader; input and resize go
//! through the session so they stay valid across any number of reconnects.

pub mod session;
pub mod shell;

pub use session::PtySession;
pub use shell::{detect_shell, FALLBACK_SHELL};
