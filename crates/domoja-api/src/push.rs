//! Push channel with reconnect handling.
//!
//! Connects to the Domoja server's Socket.IO endpoint over a plain
//! WebSocket transport and streams parsed events through a
//! [`tokio::sync::broadcast`] channel. Only the event names and payloads
//! matter to consumers: `connect`, `change`, `message`, `connect_error`
//! and `error` surface as [`PushEvent`] variants.
//!
//! Reconnection is timer-based with a fixed delay. A consumer may force an
//! immediate reopen with [`PushHandle::reconnect`], and a new session cookie
//! published on the watch channel also triggers one.
//!
//! # Example
//!
//! ```rust,ignore
//! use domoja_api::push::{PushConfig, PushHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let handle = PushHandle::connect(&base_url, PushConfig::default(), cancel, cookie_rx)?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{Notify, broadcast, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::ChangeEvent;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── PushEvent ────────────────────────────────────────────────────────

/// An event received on (or about) the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The namespace connection was acknowledged.
    Connect,
    /// A device changed state.
    Change(ChangeEvent),
    /// Free-form `message` event.
    Message(serde_json::Value),
    /// The connection was refused, either at the HTTP upgrade or by the server.
    ConnectError(ConnectError),
    /// The transport failed after the connection was established.
    Error(String),
    /// The server closed the namespace.
    Disconnect,
}

/// Details of a refused connection.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ConnectError {
    #[serde(default)]
    pub message: String,
    /// HTTP status or server-provided detail, e.g. `"401"` or `401`.
    #[serde(default, alias = "data")]
    pub description: Option<serde_json::Value>,
}

impl ConnectError {
    /// `true` when the refusal carries HTTP 401 semantics.
    pub fn is_unauthorized(&self) -> bool {
        match &self.description {
            Some(serde_json::Value::String(s)) => s == "401",
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(401),
            Some(serde_json::Value::Object(map)) => map
                .get("status")
                .or_else(|| map.get("description"))
                .is_some_and(|v| v.as_str() == Some("401") || v.as_u64() == Some(401)),
            _ => false,
        }
    }
}

// ── PushConfig ───────────────────────────────────────────────────────

/// Reconnection policy for the push channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Delay before retrying a failed connection. Default: 10s.
    pub reconnect_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

// ── PushHandle ───────────────────────────────────────────────────────

/// Handle to a running push channel.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task.
pub struct PushHandle {
    event_rx: broadcast::Receiver<Arc<PushEvent>>,
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
}

impl PushHandle {
    /// Spawn the connection loop against `base_url`.
    ///
    /// Returns immediately once the background task is spawned. The
    /// current value of `cookie` is sent on every (re)connection.
    pub fn connect(
        base_url: &Url,
        config: PushConfig,
        cancel: CancellationToken,
        cookie: watch::Receiver<String>,
    ) -> Result<Self, Error> {
        let ws_url = socket_url(base_url)?;
        let referer = base_url.to_string();
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let reconnect = Arc::new(Notify::new());

        let task_cancel = cancel.clone();
        let task_reconnect = Arc::clone(&reconnect);
        tokio::spawn(async move {
            push_loop(
                ws_url,
                referer,
                event_tx,
                config,
                task_cancel,
                task_reconnect,
                cookie,
            )
            .await;
        });

        Ok(Self {
            event_rx,
            cancel,
            reconnect,
        })
    }

    /// Get a new broadcast receiver for the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.event_rx.resubscribe()
    }

    /// Take the receiver created at connect time, which has buffered
    /// every event since the task started.
    pub fn into_receiver(self) -> (broadcast::Receiver<Arc<PushEvent>>, PushControl) {
        (
            self.event_rx,
            PushControl {
                cancel: self.cancel,
                reconnect: self.reconnect,
            },
        )
    }

    /// Close the current connection and reopen it immediately.
    pub fn reconnect(&self) {
        self.reconnect.notify_one();
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Control half of a [`PushHandle`] once its receiver has been taken.
#[derive(Clone)]
pub struct PushControl {
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
}

impl PushControl {
    /// A control whose reconnect requests land on `reconnect`, for hosts
    /// that drive their own connection loop.
    pub fn new(cancel: CancellationToken, reconnect: Arc<Notify>) -> Self {
        Self { cancel, reconnect }
    }

    /// Close the current connection and reopen it immediately.
    pub fn reconnect(&self) {
        self.reconnect.notify_one();
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Derive the Socket.IO WebSocket endpoint from the server base URL.
pub fn socket_url(base_url: &Url) -> Result<Url, Error> {
    let mut url = base_url.clone();
    let scheme = if base_url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| Error::PushConnect(format!("cannot derive socket URL from {base_url}")))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on failure, wait → reconnect.
async fn push_loop(
    ws_url: Url,
    referer: String,
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    config: PushConfig,
    cancel: CancellationToken,
    reconnect: Arc<Notify>,
    mut cookie: watch::Receiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        let current_cookie = cookie.borrow_and_update().clone();
        let opened = tokio::time::Instant::now();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = reconnect.notified() => {
                tracing::info!("reopening push channel on request");
                attempt = 0;
                continue;
            }
            result = connect_and_read(&ws_url, &referer, &event_tx, &current_cookie) => result,
        };

        match result {
            Ok(()) if reopen_immediately(opened.elapsed(), config.reconnect_delay) => {
                tracing::info!("push channel closed, reconnecting");
                attempt = 0;
                continue;
            }
            Ok(()) => {
                tracing::warn!("push channel closed right after connecting, backing off");
            }
            Err(e) => {
                tracing::debug!(error = %e, attempt, "push channel failure");
                let _ = event_tx.send(Arc::new(event_from_error(&e)));
            }
        }

        if let Some(max) = config.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "push channel retry limit reached, giving up");
                break;
            }
        }
        attempt += 1;

        if wait_to_reconnect(config.reconnect_delay, &cancel, &reconnect, &mut cookie).await == Resume::Stop {
            break;
        }
    }

    tracing::debug!("push channel loop exiting");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Reconnect,
    Stop,
}

/// Wait `delay` before the next attempt. A reconnect request or a renewed
/// session cookie cuts the wait short.
async fn wait_to_reconnect(
    delay: Duration,
    cancel: &CancellationToken,
    reconnect: &Notify,
    cookie: &mut watch::Receiver<String>,
) -> Resume {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Resume::Stop,
        () = reconnect.notified() => Resume::Reconnect,
        changed = cookie.changed() => {
            if changed.is_err() {
                return Resume::Stop;
            }
            tracing::debug!("session cookie renewed, reconnecting push channel");
            Resume::Reconnect
        }
        () = tokio::time::sleep(delay) => Resume::Reconnect,
    }
}

/// A clean close reopens at once only when the connection lived at least
/// one reconnect delay; a server that hangs up straight away is paced.
fn reopen_immediately(lived: Duration, delay: Duration) -> bool {
    lived >= delay
}

fn event_from_error(error: &Error) -> PushEvent {
    match error {
        Error::Unauthorized => PushEvent::ConnectError(ConnectError {
            message: error.to_string(),
            description: Some(serde_json::Value::String("401".into())),
        }),
        Error::PushConnect(message) => PushEvent::ConnectError(ConnectError {
            message: message.clone(),
            description: None,
        }),
        other => PushEvent::Error(other.to_string()),
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    referer: &str,
    event_tx: &broadcast::Sender<Arc<PushEvent>>,
    cookie: &str,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting push channel");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::PushConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri).with_header("Referer", referer);
    if !cookie.is_empty() {
        request = request.with_header("Cookie", cookie);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| match e {
            tungstenite::Error::Http(ref resp)
                if resp.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                Error::Unauthorized
            }
            other => Error::PushConnect(other.to_string()),
        })?;

    let (mut write, mut read) = ws_stream.split();

    while let Some(frame) = read.next().await {
        match frame {
            Ok(tungstenite::Message::Text(text)) => match parse_frame(&text) {
                Frame::Ignore => {}
                Frame::Reply(reply) => {
                    write
                        .send(tungstenite::Message::text(reply))
                        .await
                        .map_err(|e| Error::PushDropped(e.to_string()))?;
                }
                Frame::Emit(event) => {
                    // Ignore send errors -- just means no active subscribers right now
                    let _ = event_tx.send(Arc::new(event));
                }
                Frame::Close(event) => {
                    if let Some(event) = event {
                        let _ = event_tx.send(Arc::new(event));
                    }
                    return Ok(());
                }
            },
            Ok(tungstenite::Message::Close(frame)) => {
                if let Some(ref cf) = frame {
                    tracing::info!(code = %cf.code, reason = %cf.reason, "push channel close frame");
                }
                return Ok(());
            }
            Ok(_) => {
                // Binary, Ping, Pong -- tungstenite answers pings itself
            }
            Err(e) => return Err(Error::PushDropped(e.to_string())),
        }
    }

    tracing::info!("push channel stream ended");
    Ok(())
}

// ── Frame parsing ────────────────────────────────────────────────────

/// What to do with one Engine.IO text frame.
#[derive(Debug, PartialEq)]
enum Frame {
    Ignore,
    Reply(&'static str),
    Emit(PushEvent),
    Close(Option<PushEvent>),
}

/// Decode an Engine.IO v4 frame carrying a Socket.IO packet.
///
/// Engine.IO: `0` open, `1` close, `2` ping, `3` pong, `4` message, `6` noop.
/// Socket.IO (inside `4`): `0` connect, `1` disconnect, `2` event,
/// `4` connect_error.
fn parse_frame(text: &str) -> Frame {
    let mut chars = text.chars();
    match chars.next() {
        // Handshake: join the default namespace.
        Some('0') => Frame::Reply("40"),
        Some('1') => Frame::Close(None),
        Some('2') => Frame::Reply("3"),
        Some('4') => parse_packet(chars.as_str()),
        _ => Frame::Ignore,
    }
}

fn parse_packet(packet: &str) -> Frame {
    let mut chars = packet.chars();
    let kind = chars.next();
    let body = skip_namespace_and_ack(chars.as_str());

    match kind {
        Some('0') => Frame::Emit(PushEvent::Connect),
        Some('1') => Frame::Close(Some(PushEvent::Disconnect)),
        Some('2') => parse_event(body),
        Some('4') => {
            let error = serde_json::from_str::<ConnectError>(body).unwrap_or_else(|_| ConnectError {
                message: body.to_owned(),
                description: None,
            });
            Frame::Emit(PushEvent::ConnectError(error))
        }
        _ => Frame::Ignore,
    }
}

/// Strip an optional `/namespace,` prefix and a numeric ack id.
fn skip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_event(body: &str) -> Frame {
    let Ok(serde_json::Value::Array(mut args)) = serde_json::from_str::<serde_json::Value>(body)
    else {
        tracing::debug!(body, "failed to parse push event");
        return Frame::Ignore;
    };
    if args.is_empty() {
        return Frame::Ignore;
    }

    let name = args.remove(0);
    let payload = args.into_iter().next().unwrap_or(serde_json::Value::Null);

    match name.as_str() {
        Some("change") => match serde_json::from_value::<ChangeEvent>(payload) {
            Ok(change) => Frame::Emit(PushEvent::Change(change)),
            Err(e) => {
                tracing::debug!(error = %e, "malformed change event");
                Frame::Ignore
            }
        },
        Some("message") => Frame::Emit(PushEvent::Message(payload)),
        Some("error") => Frame::Emit(PushEvent::Error(match payload {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })),
        Some(other) => {
            tracing::trace!(event = other, "ignoring push event");
            Frame::Ignore
        }
        None => Frame::Ignore,
    }
}

// ── Tests ────────────────────────────────────────────────────────────
