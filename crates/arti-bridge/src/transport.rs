//! Outbound WebSocket channel with a single writer lock.

use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use arti_common::{DataFrameMode, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::protocol::ControlMessage;

/// Default upper bound for the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `close` waits for the close frame to go out.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_millis(500);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// FRAME
// =============================================================================

/// A data-carrying WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

impl Frame {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(data) => data.len(),
            Frame::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// Duplex message channel the session bridge runs over.
///
/// Implementations serialize every write (including `ping` and `close`) so
/// frames never interleave on the wire. `close` must unblock a pending
/// `receive` with [`TransportError::ConnectionClosed`] and be idempotent.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a new connection, replacing any existing one.
    async fn connect(&self) -> Result<(), TransportError>;

    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Liveness heartbeat.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Next binary or text frame from the peer.
    async fn receive(&self) -> Result<Frame, TransportError>;

    async fn close(&self);

    /// Send one complete chunk of terminal data under `mode`. Invalid UTF-8
    /// is replaced in text mode; streaming callers use
    /// [`DataFraming`](crate::protocol::DataFraming) instead.
    async fn send_data(&self, data: &[u8], mode: DataFrameMode) -> Result<(), TransportError> {
        let frame = match mode {
            DataFrameMode::Binary => Frame::Binary(data.to_vec()),
            DataFrameMode::Text => Frame::Text(String::from_utf8_lossy(data).into_owned()),
        };
        self.send(&frame).await
    }

    /// Send a control message as a JSON text frame.
    async fn send_control(&self, msg: &ControlMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(msg).map_err(|e| TransportError::Write(e.to_string()))?;
        self.send(&Frame::Text(json)).await
    }
}

// =============================================================================
// WEBSOCKET CHANNEL
// =============================================================================

/// [`Transport`] over `tokio-tungstenite`.
///
/// Holds the target URL for the life of the process; the connection itself
/// is created by every successful [`connect`](Transport::connect) and torn
/// down by [`close`](Transport::close).
pub struct WsChannel {
    url: String,
    handshake_timeout: Duration,
    /// Write half. This lock is the single writer guard.
    writer: Mutex<Option<WsSink>>,
    reader: Mutex<Option<WsSource>>,
    /// Cancelled when the current connection is closed.
    closed: StdMutex<CancellationToken>,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        let closed = CancellationToken::new();
        closed.cancel();
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            closed: StdMutex::new(closed),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a connection is currently stored.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    fn close_signal(&self) -> CancellationToken {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn write(&self, msg: Message) -> Result<(), TransportError> {
        let closed = self.close_signal();
        let mut guard = self.writer.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;

        tokio::select! {
            biased;
            _ = closed.cancelled() => Err(TransportError::ConnectionClosed),
            result = sink.send(msg) => result.map_err(|e| TransportError::Write(e.to_string())),
        }
    }
}

#[async_trait]
impl Transport for WsChannel {
    async fn connect(&self) -> Result<(), TransportError> {
        self.close().await;

        tracing::info!(url = %self.url, "Dialing...");
        let ws = match tokio::time::timeout(self.handshake_timeout, connect_async(self.url.as_str()))
            .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(TransportError::Dial(e.to_string())),
            Err(_elapsed) => {
                return Err(TransportError::HandshakeTimeout(
                    self.handshake_timeout.as_millis() as u64,
                ))
            }
        };

        let (sink, source) = ws.split();
        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(source);
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();

        Ok(())
    }

    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let msg = match frame {
            Frame::Binary(data) => Message::Binary(data.clone().into()),
            Frame::Text(text) => Message::Text(text.clone().into()),
        };
        self.write(msg).await
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.write(Message::Ping(Vec::new().into())).await
    }

    async fn receive(&self) -> Result<Frame, TransportError> {
        let closed = self.close_signal();
        let mut guard = self.reader.lock().await;
        let source = guard.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            let next = tokio::select! {
                biased;
                _ = closed.cancelled() => return Err(TransportError::ConnectionClosed),
                next = source.next() => next,
            };

            match next {
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data.to_vec())),
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(frame = ?frame, "Peer closed connection");
                    return Err(TransportError::ConnectionClosed);
                }
                // Pongs to our pings, and pings answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    async fn close(&self) {
        self.close_signal().cancel();

        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            if tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sink.close())
                .await
                .is_err()
            {
                tracing::debug!("Close frame not flushed in time");
            }
            tracing::debug!(url = %self.url, "Connection closed");
        }
        drop(writer);

        self.reader.lock().await.take();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    /// Loopback server that reports every data frame it receives and echoes
    /// it back.
    async fn echo_server() -> (SocketAddr, mpsc::UnboundedReceiver<Message>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_binary() || msg.is_text() {
                            let _ = tx.send(msg.clone());
                            if ws.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        (addr, rx)
    }

    fn url_for(addr: SocketAddr) -> String {
        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn operations_before_connect_report_not_connected() {
        let channel = WsChannel::new("ws://127.0.0.1:1/ws");
        assert!(matches!(
            channel.send(&Frame::Binary(b"x".to_vec())).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            channel.receive().await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(channel.ping().await, Err(TransportError::NotConnected)));
        // Closing with no connection is a no-op.
        channel.close().await;
        channel.close().await;
    }

    #[tokio::test]
    async fn dial_failure_leaves_no_connection() {
        // Grab a free port, then release it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = WsChannel::new(url_for(addr));
        assert_eq!(channel.url(), url_for(addr));
        assert!(matches!(
            channel.connect().await,
            Err(TransportError::Dial(_))
        ));
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn handshake_timeout_is_enforced() {
        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let channel =
            WsChannel::new(url_for(addr)).with_handshake_timeout(Duration::from_millis(200));
        assert!(matches!(
            channel.connect().await,
            Err(TransportError::HandshakeTimeout(200))
        ));
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn frames_round_trip_with_their_kind() {
        let (addr, _seen) = echo_server().await;
        let channel = WsChannel::new(url_for(addr));
        channel.connect().await.expect("connect");

        channel
            .send(&Frame::Binary(vec![0x00, 0xff]))
            .await
            .expect("send binary");
        assert_eq!(channel.receive().await.unwrap(), Frame::Binary(vec![0x00, 0xff]));

        channel
            .send(&Frame::Text("hello".into()))
            .await
            .expect("send text");
        assert_eq!(channel.receive().await.unwrap(), Frame::Text("hello".into()));

        channel.ping().await.expect("ping");
        channel.close().await;
    }

    #[tokio::test]
    async fn control_messages_go_out_as_json_text() {
        let (addr, mut seen) = echo_server().await;
        let channel = WsChannel::new(url_for(addr));
        channel.connect().await.expect("connect");

        channel
            .send_control(&ControlMessage::Resize { rows: 40, cols: 120 })
            .await
            .expect("send control");

        let msg = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            Message::Text(String::from(r#"{"type":"resize","rows":40,"cols":120}"#).into())
        );
        channel.close().await;
    }

    #[tokio::test]
    async fn data_follows_the_frame_mode() {
        let (addr, mut seen) = echo_server().await;
        let channel = WsChannel::new(url_for(addr));
        channel.connect().await.expect("connect");

        channel
            .send_data(b"ls\n", DataFrameMode::Binary)
            .await
            .expect("binary data");
        channel
            .send_data(b"ls\n", DataFrameMode::Text)
            .await
            .expect("text data");

        let first = seen.recv().await.unwrap();
        let second = seen.recv().await.unwrap();
        assert_eq!(first, Message::Binary(b"ls\n".to_vec().into()));
        assert_eq!(second, Message::Text(String::from("ls\n").into()));
        channel.close().await;
    }

    #[tokio::test]
    async fn close_unblocks_pending_receive() {
        let (addr, _seen) = echo_server().await;
        let channel = Arc::new(WsChannel::new(url_for(addr)));
        channel.connect().await.expect("connect");

        let reader = Arc::clone(&channel);
        let pending = tokio::spawn(async move { reader.receive().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        channel.close().await;
        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("receive should return after close")
            .unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));

        channel.close().await;
        assert!(!channel.is_connected().await);
        assert!(matches!(
            channel.send(&Frame::Text("late".into())).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reconnect_replaces_connection() {
        let (addr, mut seen) = echo_server().await;
        let channel = WsChannel::new(url_for(addr));

        channel.connect().await.expect("first connect");
        channel.connect().await.expect("second connect");
        channel
            .send(&Frame::Binary(b"after".to_vec()))
            .await
            .expect("send on new connection");

        let msg = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, Message::Binary(b"after".to_vec().into()));
        channel.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_senders_never_interleave_frames() {
        const TASKS: usize = 8;
        const PER_TASK: usize = 50;

        let (addr, mut seen) = echo_server().await;
        let channel = Arc::new(WsChannel::new(url_for(addr)));
        channel.connect().await.expect("connect");

        // Consume the echoes so the server never stalls on a full socket.
        let drain = Arc::clone(&channel);
        tokio::spawn(async move { while drain.receive().await.is_ok() {} });

        let mut handles = Vec::new();
        for task in 0..TASKS {
            let channel = Arc::clone(&channel);
            handles.push(tokio::spawn(async move {
                for i in 0..PER_TASK {
                    let payload = format!("{task}:{i}:{}", "x".repeat(512));
                    channel
                        .send(&Frame::Binary(payload.into_bytes()))
                        .await
                        .expect("send");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut next_expected: HashMap<usize, usize> = HashMap::new();
        for _ in 0..TASKS * PER_TASK {
            let msg = tokio::time::timeout(Duration::from_secs(5), seen.recv())
                .await
                .expect("frame should arrive")
                .unwrap();
            let text = String::from_utf8(msg.into_data().to_vec()).expect("intact utf8 frame");
            let mut parts = text.splitn(3, ':');
            let task: usize = parts.next().unwrap().parse().unwrap();
            let i: usize = parts.next().unwrap().parse().unwrap();
            assert_eq!(parts.next().unwrap().len(), 512, "frame body corrupted");

            let expected = next_expected.entry(task).or_insert(0);
            assert_eq!(i, *expected, "frames from task {task} out of order");
            *expected += 1;
        }
        assert!(next_expected.values().all(|&n| n == PER_TASK));
        channel.close().await;
    }
}
