//! WebSocket connection manager.
//!
//! One supervisor task owns the socket for the whole process lifetime. It
//! connects, pumps frames in both directions, and when the link drops for
//! any reason reconnects forever with capped exponential backoff plus
//! jitter. Link transitions are reported as [`WsEvent`]s so the UI can show
//! connectivity loss instead of hiding it.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use confab_core::{decode_server_frame, encode_client_frame, ClientFrame, ServerFrame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// First reconnect delay.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Reconnect delay ceiling, before jitter.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Error type for WebSocket operations.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The supervisor task is gone and the frame could not be queued.
    #[error("send failed: {0}")]
    Send(String),

    /// Frame encoding failed.
    #[error(transparent)]
    Protocol(#[from] confab_core::ProtocolError),
}

/// Events from the connection supervisor.
#[derive(Debug)]
pub enum WsEvent {
    /// The link is up. No handshake payload is sent on open.
    Up,
    /// One decoded inbound frame.
    Frame(ServerFrame),
    /// The link dropped; the supervisor retries after `retry_in`.
    Down {
        /// Human-readable cause.
        reason: String,
        /// Delay before the next connect attempt.
        retry_in: Duration,
    },
}

/// Handle for queueing outbound frames.
#[derive(Debug, Clone)]
pub struct WsHandle {
    tx: mpsc::Sender<String>,
}

impl WsHandle {
    /// Serialize and queue one outbound frame.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), WsError> {
        let json = encode_client_frame(frame)?;
        self.tx
            .send(json)
            .await
            .map_err(|e| WsError::Send(e.to_string()))
    }
}

/// Start the connection supervisor for `url`.
///
/// Returns a handle for outbound frames and the inbound event stream. The
/// supervisor runs until every [`WsHandle`] clone is dropped.
pub fn spawn(url: String) -> (WsHandle, mpsc::Receiver<WsEvent>) {
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(32);
    let (event_tx, event_rx) = mpsc::channel::<WsEvent>(128);

    tokio::spawn(supervise(url, outgoing_rx, event_tx));

    (WsHandle { tx: outgoing_tx }, event_rx)
}

/// Connect-pump-retry loop.
async fn supervise(
    url: String,
    mut outgoing: mpsc::Receiver<String>,
    events: mpsc::Sender<WsEvent>,
) {
    let mut backoff = Backoff::new();

    loop {
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                let retry_in = backoff.next_delay();
                tracing::warn!(error = %e, ?retry_in, "connect failed");
                if events
                    .send(WsEvent::Down {
                        reason: e.to_string(),
                        retry_in,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                discard_queued(&mut outgoing);
                tokio::time::sleep(retry_in).await;
                continue;
            }
        };

        backoff.reset();
        tracing::info!(url = %url, "connected");
        if events.send(WsEvent::Up).await.is_err() {
            return;
        }

        let Some(reason) = pump(socket, &mut outgoing, &events).await else {
            // All handles dropped; the client is shutting down.
            return;
        };

        let retry_in = backoff.next_delay();
        tracing::warn!(reason = %reason, ?retry_in, "connection lost");
        if events
            .send(WsEvent::Down { reason, retry_in })
            .await
            .is_err()
        {
            return;
        }
        discard_queued(&mut outgoing);
        tokio::time::sleep(retry_in).await;
    }
}

/// Pump frames both ways until the link drops.
///
/// Returns the drop reason, or `None` when the outgoing channel closed
/// (client shutdown).
async fn pump(
    socket: Socket,
    outgoing: &mut mpsc::Receiver<String>,
    events: &mpsc::Sender<WsEvent>,
) -> Option<String> {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            queued = outgoing.recv() => {
                let Some(text) = queued else {
                    let _ = write.send(Message::Close(None)).await;
                    return None;
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    return Some(e.to_string());
                }
            }
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match decode_server_frame(&text) {
                            Ok(frame) => {
                                if matches!(frame, ServerFrame::Unknown) {
                                    tracing::debug!(raw = %text, "unknown frame discriminant");
                                }
                                if events.send(WsEvent::Frame(frame)).await.is_err() {
                                    return None;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, raw = %text, "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Some("closed by server".to_string());
                    }
                    // Control frames and binary payloads carry nothing for us.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        return Some(e.to_string());
                    }
                }
            }
        }
    }
}

/// Drop frames queued while the link is down. Callers are expected to check
/// connectivity before sending; anything that slips through is stale by the
/// time the link comes back.
fn discard_queued(outgoing: &mut mpsc::Receiver<String>) {
    while let Ok(text) = outgoing.try_recv() {
        tracing::warn!(frame = %text, "link down, discarding outbound frame");
    }
}

/// Reconnect delay schedule: doubling from [`BACKOFF_BASE`] up to
/// [`BACKOFF_CAP`], with up to 25% additive jitter.
#[derive(Debug)]
struct Backoff {
    attempt: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { attempt: 0 }
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1 << self.attempt.min(6));
        let capped = exp.min(BACKOFF_CAP);
        self.attempt = self.attempt.saturating_add(1);

        let max_jitter_ms = u64::try_from(capped.as_millis() / 4).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms));
        capped + jitter
    }
}

/// Normalize the configured server to the socket endpoint.
///
/// Accepts `host:port`, `http(s)://…`, or `ws(s)://…` and yields
/// `ws(s)://host[:port]/ws`; the protocol lives at the fixed `/ws` path.
pub fn endpoint_url(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');

    let normalized = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        format!("ws://{trimmed}")
    };

    if normalized.ends_with("/ws") {
        normalized
    } else {
        format!("{normalized}/ws")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

    // =========================================================================
    // Endpoint Normalization Tests
    // =========================================================================

    #[test]
    fn endpoint_from_bare_host() {
        assert_eq!(endpoint_url("localhost:8000"), "ws://localhost:8000/ws");
        assert_eq!(endpoint_url("192.168.1.1:3000"), "ws://192.168.1.1:3000/ws");
    }

    #[test]
    fn endpoint_from_http_scheme() {
        assert_eq!(endpoint_url("http://example.com"), "ws://example.com/ws");
        assert_eq!(
            endpoint_url("https://agent.example.com/"),
            "wss://agent.example.com/ws"
        );
    }

    #[test]
    fn endpoint_from_ws_scheme_is_preserved() {
        assert_eq!(endpoint_url("ws://localhost:8000/ws"), "ws://localhost:8000/ws");
        assert_eq!(endpoint_url("wss://example.com"), "wss://example.com/ws");
    }

    // =========================================================================
    // Backoff Tests
    // =========================================================================

    #[test]
    fn backoff_doubles_and_respects_cap() {
        let mut backoff = Backoff::new();
        let mut previous_floor = Duration::ZERO;

        for attempt in 0..12 {
            let delay = backoff.next_delay();
            let floor = BACKOFF_BASE
                .saturating_mul(1 << attempt.min(6))
                .min(BACKOFF_CAP);

            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(
                delay <= floor + floor / 4,
                "attempt {attempt}: {delay:?} exceeds jitter bound"
            );
            assert!(floor >= previous_floor);
            previous_floor = floor;
        }
    }

    #[test]
    fn backoff_resets_to_base() {
        let mut backoff = Backoff::new();
        for _ in 0..8 {
            backoff.next_delay();
        }
        backoff.reset();

        let delay = backoff.next_delay();
        assert!(delay >= BACKOFF_BASE);
        assert!(delay <= BACKOFF_BASE + BACKOFF_BASE / 4);
    }

    // =========================================================================
    // Supervisor Tests (in-process server)
    // =========================================================================

    async fn expect_up(events: &mut mpsc::Receiver<WsEvent>) {
        loop {
            match timeout(EVENT_TIMEOUT, events.recv()).await.unwrap().unwrap() {
                WsEvent::Up => return,
                WsEvent::Down { .. } => {}
                WsEvent::Frame(frame) => panic!("unexpected frame before Up: {frame:?}"),
            }
        }
    }

    #[tokio::test]
    async fn delivers_inbound_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            socket
                .send(Message::Text(
                    r#"{"type":"agent_message","content":"hi"}"#.to_string(),
                ))
                .await
                .unwrap();
        });

        let (_handle, mut events) = spawn(format!("ws://{addr}/ws"));
        expect_up(&mut events).await;

        match timeout(EVENT_TIMEOUT, events.recv()).await.unwrap().unwrap() {
            WsEvent::Frame(ServerFrame::AgentMessage { content, .. }) => {
                assert_eq!(content, "hi");
            }
            other => panic!("expected agent message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_outbound_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            match socket.next().await.unwrap().unwrap() {
                Message::Text(text) => text,
                other => panic!("expected text frame, got {other:?}"),
            }
        });

        let (handle, mut events) = spawn(format!("ws://{addr}/ws"));
        expect_up(&mut events).await;

        handle.send(&ClientFrame::Ping).await.unwrap();

        let received = timeout(EVENT_TIMEOUT, server).await.unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&received).unwrap();
        assert_eq!(parsed["type"], "ping");
    }

    #[tokio::test]
    async fn reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // First connection: drop immediately. Second: stay open.
            let (stream, _) = listener.accept().await.unwrap();
            let socket = accept_async(stream).await.unwrap();
            drop(socket);

            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            socket
                .send(Message::Text(r#"{"type":"pong"}"#.to_string()))
                .await
                .unwrap();
            // Keep the connection alive until the test ends.
            while socket.next().await.is_some() {}
        });

        let (_handle, mut events) = spawn(format!("ws://{addr}/ws"));
        expect_up(&mut events).await;

        // The link must go down and come back up on its own.
        let mut saw_down = false;
        loop {
            match timeout(EVENT_TIMEOUT, events.recv()).await.unwrap().unwrap() {
                WsEvent::Down { retry_in, .. } => {
                    assert!(retry_in >= BACKOFF_BASE);
                    saw_down = true;
                }
                WsEvent::Up => break,
                WsEvent::Frame(_) => {}
            }
        }
        assert!(saw_down);

        match timeout(EVENT_TIMEOUT, events.recv()).await.unwrap().unwrap() {
            WsEvent::Frame(ServerFrame::Pong) => {}
            other => panic!("expected pong after reconnect, got {other:?}"),
        }
    }
}
