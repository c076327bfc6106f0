//! Terminal output pump: drains the PTY reader into the bounded buffer.
//!
//! The PTY reader is blocking, so it runs on its own OS thread. Each chunk
//! is pushed into a `tokio::sync::mpsc` channel; when the channel is full
//! the thread waits (backpressure) but still wakes up on shutdown.

use std::io::{ErrorKind, Read};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Maximum bytes taken from the PTY per read.
pub const READ_CHUNK: usize = 4_096;

pub use arti_common::DEFAULT_BUFFER_CHUNKS;

/// How often [`join_pump`] checks whether the thread has finished.
const JOIN_POLL: Duration = Duration::from_millis(20);

/// Create the bounded output buffer.
pub fn output_buffer(capacity: usize) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::channel(capacity.max(1))
}

/// Spawn the thread that copies `reader` into `tx` until end of stream,
/// receiver drop, or shutdown.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_output_pump<R>(
    mut reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    shutdown: CancellationToken,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let runtime = Handle::try_current().map_err(std::io::Error::other)?;

    std::thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            let mut total: u64 = 0;
            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                let n = match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::info!("Terminal output reached end of stream");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO once the shell has exited is the normal way a
                        // Linux PTY reports end of stream.
                        tracing::debug!("PTY read ended: {e}");
                        break;
                    }
                };

                let chunk = buf[..n].to_vec();
                let delivered = runtime.block_on(async {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => false,
                        sent = tx.send(chunk) => sent.is_ok(),
                    }
                });
                if !delivered {
                    break;
                }
                total += n as u64;
            }
            tracing::debug!(bytes = total, "Output pump exited");
        })
}

/// Wait up to `limit` for the pump thread to finish.
///
/// A PTY read can stay blocked after the shell is gone (a background job
/// still holding the slave open). In that case the handle is dropped, which
/// detaches the thread, and `false` is returned. The wait never occupies a
/// blocking-pool thread, so runtime shutdown is not held up by it.
pub async fn join_pump(pump: JoinHandle<()>, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while !pump.is_finished() {
        if tokio::time::Instant::now() >= deadline {
            tracing::debug!("Output pump still blocked in read; detaching it");
            return false;
        }
        tokio::time::sleep(JOIN_POLL).await;
    }
    if pump.join().is_err() {
        tracing::warn!("Output pump thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn forwards_everything_in_order_then_closes() {
        let data: Vec<u8> = (0..3 * READ_CHUNK + 100).map(|i| (i % 251) as u8).collect();
        let (tx, mut rx) = output_buffer(16);
        let pump = spawn_output_pump(Cursor::new(data.clone()), tx, CancellationToken::new())
            .expect("spawn pump");

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            assert!(chunk.len() <= READ_CHUNK);
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, data);
        pump.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_buffer_blocks_without_dropping() {
        let data = vec![7u8; 4 * READ_CHUNK];
        let (tx, mut rx) = output_buffer(1);
        let _pump = spawn_output_pump(Cursor::new(data), tx, CancellationToken::new())
            .expect("spawn pump");

        // Let the pump fill the single slot and stall on the next send.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut total = 0;
        while let Some(chunk) = rx.recv().await {
            total += chunk.len();
        }
        assert_eq!(total, 4 * READ_CHUNK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_releases_a_blocked_pump() {
        let data = vec![1u8; 8 * READ_CHUNK];
        let (tx, _rx) = output_buffer(1);
        let shutdown = CancellationToken::new();
        let pump = spawn_output_pump(Cursor::new(data), tx, shutdown.clone()).expect("spawn pump");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished(), "pump should be stalled on a full buffer");

        shutdown.cancel();
        let joined = tokio::time::timeout(
            Duration::from_secs(2),
            tokio::task::spawn_blocking(move || pump.join()),
        )
        .await
        .expect("pump should exit promptly after shutdown");
        assert!(joined.unwrap().is_ok());
    }

    /// Blocks in `read` until the test drops the sender.
    struct StuckReader(std::sync::mpsc::Receiver<()>);

    impl Read for StuckReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[tokio::test]
    async fn join_gives_up_on_a_read_that_never_returns() {
        let (release, stuck) = std::sync::mpsc::channel::<()>();
        let (tx, _rx) = output_buffer(4);
        let pump = spawn_output_pump(StuckReader(stuck), tx, CancellationToken::new())
            .expect("spawn pump");

        let started = std::time::Instant::now();
        assert!(!join_pump(pump, Duration::from_millis(100)).await);
        assert!(started.elapsed() < Duration::from_secs(1));

        drop(release);
    }

    #[test]
    fn runtime_drop_is_not_held_by_a_stuck_pump() {
        let (release, stuck) = std::sync::mpsc::channel::<()>();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        runtime.block_on(async {
            let (tx, _rx) = output_buffer(4);
            let pump = spawn_output_pump(StuckReader(stuck), tx, CancellationToken::new())
                .expect("spawn pump");
            join_pump(pump, Duration::from_millis(100)).await
        });
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(release);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_returns_true_once_the_pump_ends() {
        let (tx, mut rx) = output_buffer(4);
        let pump = spawn_output_pump(Cursor::new(b"done".to_vec()), tx, CancellationToken::new())
            .expect("spawn pump");
        while rx.recv().await.is_some() {}
        assert!(join_pump(pump, Duration::from_secs(2)).await);
    }

    #[test]
    fn requires_a_runtime() {
        let (tx, _rx) = mpsc::channel(1);
        let result = spawn_output_pump(Cursor::new(Vec::new()), tx, CancellationToken::new());
        assert!(result.is_err());
    }
}
