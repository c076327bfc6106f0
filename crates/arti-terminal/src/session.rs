//! PTY session using the `portable-pty` crate.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use arti_common::{TermSize, TerminalError};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::shell::detect_shell;

/// Master side plus the child process, kept together so resize and
/// teardown see the same PTY.
struct PtyControl {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
}

/// Owns one shell process running inside a pseudo-terminal.
///
/// All methods take `&self` so the session can be shared between the task
/// that applies remote input and the code that tears it down.
pub struct PtySession {
    shell: String,
    started: AtomicBool,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    control: Mutex<Option<PtyControl>>,
    size: Mutex<TermSize>,
    pid: Mutex<Option<u32>>,
}

impl PtySession {
    /// Session for the shell declared by the environment.
    pub fn new() -> Self {
        Self::with_shell(detect_shell())
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            started: AtomicBool::new(false),
            writer: Mutex::new(None),
            control: Mutex::new(None),
            size: Mutex::new(TermSize::default()),
            pid: Mutex::new(None),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Spawn the shell and return the reader for its output.
    ///
    /// The reader blocks until output is available and reports end of
    /// stream once the child exits or the session is closed.
    ///
    /// A failed start leaves the session unstarted, so it can be retried.
    pub fn start(&self) -> Result<Box<dyn Read + Send>, TerminalError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TerminalError::AlreadyStarted);
        }

        let spawned = self.spawn();
        if spawned.is_err() {
            self.started.store(false, Ordering::SeqCst);
        }
        spawned
    }

    fn spawn(&self) -> Result<Box<dyn Read + Send>, TerminalError> {
        let size = *lock(&self.size);
        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| TerminalError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(&self.shell);
        cmd.env("TERM", "xterm-256color");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TerminalError::SpawnFailed(format!("'{}': {e}", self.shell)))?;

        // Only the master is needed; holding the slave would keep the
        // reader from ever seeing end of stream.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TerminalError::SpawnFailed(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TerminalError::SpawnFailed(format!("failed to take PTY writer: {e}")))?;

        let pid = child.process_id();
        tracing::info!(shell = %self.shell, pid = ?pid, size = %size, "Shell started");

        *lock(&self.pid) = pid;
        *lock(&self.writer) = Some(writer);
        *lock(&self.control) = Some(PtyControl {
            master: pair.master,
            child,
        });

        Ok(reader)
    }

    /// Write input bytes (keystrokes) to the shell.
    pub fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(TerminalError::NotStarted)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Inform the kernel (and thus the child) that the terminal size changed.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), TerminalError> {
        let size = TermSize::new(rows, cols).ok_or(TerminalError::InvalidSize { rows, cols })?;

        let guard = lock(&self.control);
        let control = guard.as_ref().ok_or(TerminalError::NotStarted)?;
        control
            .master
            .resize(pty_size(size))
            .map_err(|e| TerminalError::ResizeFailed(e.to_string()))?;

        *lock(&self.size) = size;
        Ok(())
    }

    pub fn set_default_size(&self) -> Result<(), TerminalError> {
        let size = TermSize::default();
        self.resize(size.rows, size.cols)
    }

    pub fn size(&self) -> TermSize {
        *lock(&self.size)
    }

    pub fn pid(&self) -> Option<u32> {
        *lock(&self.pid)
    }

    /// Returns `true` if the child process is still running.
    pub fn is_alive(&self) -> bool {
        match lock(&self.control).as_mut() {
            Some(control) => matches!(control.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Close the PTY and terminate the shell.
    ///
    /// Safe to call any number of times. Kill and reap failures are logged
    /// and otherwise ignored; the process may already have exited.
    pub fn close(&self) {
        drop(lock(&self.writer).take());

        let Some(mut control) = lock(&self.control).take() else {
            return;
        };

        if let Err(e) = control.child.kill() {
            tracing::debug!("PTY kill error (may already be dead): {e}");
        }
        match control.child.try_wait() {
            Ok(Some(status)) => tracing::debug!(code = status.exit_code(), "Shell exited"),
            Ok(None) => tracing::debug!("Shell still exiting after kill"),
            Err(e) => tracing::debug!("PTY wait error: {e}"),
        }
        drop(control.master);

        tracing::info!(pid = ?self.pid(), "PTY closed");
    }
}

impl Default for PtySession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// A poisoned lock only means another thread panicked mid-write; the PTY
/// handles themselves are still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
