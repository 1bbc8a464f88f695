//! Per-endpoint connection actor.
//!
//! Each endpoint URL gets one tokio task that exclusively owns the socket
//! and all connection state. The manager talks to it through a command
//! channel; status flows back through a watch channel and registered
//! callbacks. Timers (connect timeout, heartbeat, reconnect delay) live
//! inside the task, so dropping out of a phase cancels them with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use pressroom_shared::{ClientFrame, ServerFrame};

use super::{
    ConnectionStatus, MessageCallback, OutboundMessage, StatusCallback, StatusUpdate, WsConfig,
};
use crate::credentials::CredentialProvider;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands the manager sends to a connection actor.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Reconnect,
    Send(OutboundMessage, oneshot::Sender<bool>),
    Subscribe {
        id: u64,
        on_message: Option<MessageCallback>,
        on_status: Option<StatusCallback>,
    },
    Unsubscribe {
        id: u64,
    },
}

/// What the actor should do next. Returned by each phase handler.
enum Phase {
    /// Disconnected or failed; wait for commands.
    Idle,
    /// Attempt to open the socket now.
    Connect,
    /// Wait out a reconnect delay, then attempt again.
    Backoff(Duration),
    /// Command channel closed; tear down.
    Stop,
}

pub(crate) struct ConnectionActor {
    url: String,
    config: WsConfig,
    credentials: Arc<dyn CredentialProvider>,
    rx: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<StatusUpdate>,
    message_subs: Vec<(u64, MessageCallback)>,
    status_subs: Vec<(u64, StatusCallback)>,
    attempts: u32,
}

impl ConnectionActor {
    pub(crate) fn new(
        url: String,
        config: WsConfig,
        credentials: Arc<dyn CredentialProvider>,
        rx: mpsc::UnboundedReceiver<Command>,
        status_tx: watch::Sender<StatusUpdate>,
    ) -> Self {
        Self {
            url,
            config,
            credentials,
            rx,
            status_tx,
            message_subs: Vec::new(),
            status_subs: Vec::new(),
            attempts: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect => self.attempt().await,
                Phase::Backoff(delay) => self.backoff(delay).await,
                Phase::Stop => break,
            };
        }
        tracing::debug!(url = %self.url, "connection actor stopped");
    }

    /// Disconnected / failed: nothing scheduled, just react to commands.
    async fn idle(&mut self) -> Phase {
        let Some(cmd) = self.rx.recv().await else {
            return Phase::Stop;
        };
        match cmd {
            Command::Connect => Phase::Connect,
            Command::Reconnect => {
                self.attempts = 0;
                Phase::Connect
            }
            Command::Disconnect => {
                // Safe from any state; already idle, so only the status moves.
                if !matches!(self.current_status(), ConnectionStatus::Disconnected) {
                    self.set_status(ConnectionStatus::Disconnected, "closed by client");
                }
                Phase::Idle
            }
            Command::Send(_, reply) => {
                let _ = reply.send(false);
                Phase::Idle
            }
            other => {
                self.handle_registration(other);
                Phase::Idle
            }
        }
    }

    /// One connection attempt, bounded by the connect timeout.
    async fn attempt(&mut self) -> Phase {
        let Some(token) = self.credentials.access_token() else {
            // Fatal precondition, not a transient fault: no retry timer.
            self.set_status(
                ConnectionStatus::Failed {
                    reason: "missing access token".to_string(),
                },
                "missing access token",
            );
            return Phase::Idle;
        };

        self.set_status(ConnectionStatus::Connecting, "opening connection");

        let endpoint = socket_url(&self.url, &token);
        let connect = tokio::time::timeout(self.config.connect_timeout, connect_async(endpoint));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                res = &mut connect => {
                    return match res {
                        Ok(Ok((stream, _response))) => self.session(stream).await,
                        Ok(Err(e)) => self.after_transport_fault(&format!("connect failed: {e}")),
                        Err(_) => self.after_transport_fault("connect timed out"),
                    };
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::Disconnect) => {
                            self.set_status(ConnectionStatus::Disconnected, "closed by client");
                            return Phase::Idle;
                        }
                        Some(Command::Connect) => {
                            // Already connecting: no-op, never a second socket.
                        }
                        Some(Command::Reconnect) => {
                            self.attempts = 0;
                        }
                        Some(Command::Send(_, reply)) => {
                            let _ = reply.send(false);
                        }
                        Some(other) => self.handle_registration(other),
                        None => return Phase::Stop,
                    }
                }
            }
        }
    }

    /// Open session: pump frames, heartbeat and commands until something
    /// ends it.
    async fn session(&mut self, stream: WsStream) -> Phase {
        self.attempts = 0;
        self.set_status(ConnectionStatus::Connected, "connected");
        tracing::info!(url = %self.url, "websocket connected");

        let (mut write, mut read) = stream.split();
        let hb = self.config.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + hb, hb);

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Close(close))) => {
                            let detail = close
                                .map(|c| format!("close frame, code {}", c.code))
                                .unwrap_or_else(|| "close frame".to_string());
                            return self.after_transport_fault(&detail);
                        }
                        Some(Ok(Message::Ping(_))) => {
                            // tungstenite answers pings on its own
                        }
                        Some(Ok(_)) => {
                            // binary, pong frames: nothing to do
                        }
                        Some(Err(e)) => {
                            return self.after_transport_fault(&format!("read error: {e}"));
                        }
                        None => {
                            return self.after_transport_fault("connection closed");
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let ping = match serde_json::to_string(&ClientFrame::ping()) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(url = %self.url, "failed to serialize ping: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(ping.into())).await {
                        return self.after_transport_fault(&format!("heartbeat send failed: {e}"));
                    }
                    tracing::trace!(url = %self.url, "heartbeat sent");
                }
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::Disconnect) => {
                            let _ = write.send(Message::Close(None)).await;
                            self.set_status(ConnectionStatus::Disconnected, "closed by client");
                            return Phase::Idle;
                        }
                        Some(Command::Connect) => {
                            // Already connected: no-op.
                        }
                        Some(Command::Reconnect) => {
                            self.attempts = 0;
                        }
                        Some(Command::Send(msg, reply)) => {
                            let ok = write.send(Message::Text(msg.into_text().into())).await.is_ok();
                            let _ = reply.send(ok);
                            if !ok {
                                return self.after_transport_fault("write failed");
                            }
                        }
                        Some(other) => self.handle_registration(other),
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Phase::Stop;
                        }
                    }
                }
            }
        }
    }

    /// Sleep out the reconnect delay; commands can cut it short.
    async fn backoff(&mut self, delay: Duration) -> Phase {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return Phase::Connect,
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(Command::Disconnect) => {
                            self.set_status(ConnectionStatus::Disconnected, "closed by client");
                            return Phase::Idle;
                        }
                        Some(Command::Reconnect) => {
                            self.attempts = 0;
                            return Phase::Connect;
                        }
                        Some(Command::Connect) => return Phase::Connect,
                        Some(Command::Send(_, reply)) => {
                            let _ = reply.send(false);
                        }
                        Some(other) => self.handle_registration(other),
                        None => return Phase::Stop,
                    }
                }
            }
        }
    }

    /// Unexpected close / open failure: schedule a retry or give up.
    fn after_transport_fault(&mut self, detail: &str) -> Phase {
        self.attempts += 1;
        let max = self.config.reconnect.max_attempts;
        if self.attempts > max {
            tracing::warn!(url = %self.url, "giving up after {max} reconnect attempts: {detail}");
            self.set_status(
                ConnectionStatus::Failed {
                    reason: format!("gave up after {max} attempts: {detail}"),
                },
                "reconnect attempts exhausted",
            );
            return Phase::Idle;
        }
        let delay = self.config.reconnect.delay_for_attempt(self.attempts);
        tracing::info!(
            url = %self.url,
            "reconnecting in {}ms (attempt {}/{max}): {detail}",
            delay.as_millis(),
            self.attempts,
        );
        self.set_status(
            ConnectionStatus::Reconnecting {
                attempt: self.attempts,
                max,
            },
            detail,
        );
        Phase::Backoff(delay)
    }

    /// Decode one inbound text frame and fan it out.
    fn handle_frame(&mut self, text: &str) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                // Malformed frames are dropped, never fatal.
                tracing::debug!(url = %self.url, "dropping undecodable frame: {e}");
                return;
            }
        };
        match frame {
            ServerFrame::Pong { .. } => {
                tracing::trace!(url = %self.url, "heartbeat reply");
            }
            ServerFrame::Unknown => {
                tracing::trace!(url = %self.url, "ignoring unrecognized frame type");
            }
            frame => self.dispatch_message(&frame),
        }
    }

    /// Invoke message subscribers in registration order. The set is
    /// snapshotted first so a callback unsubscribing mid-iteration cannot
    /// disturb the walk, and each callback is isolated so one panicking
    /// consumer cannot starve the rest.
    fn dispatch_message(&self, frame: &ServerFrame) {
        let subs: Vec<MessageCallback> =
            self.message_subs.iter().map(|(_, cb)| cb.clone()).collect();
        for cb in subs {
            if catch_unwind(AssertUnwindSafe(|| cb(frame))).is_err() {
                tracing::warn!(url = %self.url, "message subscriber panicked; continuing fan-out");
            }
        }
    }

    fn handle_registration(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe {
                id,
                on_message,
                on_status,
            } => {
                if let Some(cb) = on_message {
                    self.message_subs.push((id, cb));
                }
                if let Some(cb) = on_status {
                    // New status subscribers immediately see the current state.
                    let current = self.status_tx.borrow().clone();
                    if catch_unwind(AssertUnwindSafe(|| cb(&current))).is_err() {
                        tracing::warn!(url = %self.url, "status subscriber panicked on attach");
                    }
                    self.status_subs.push((id, cb));
                }
            }
            Command::Unsubscribe { id } => {
                self.message_subs.retain(|(sub, _)| *sub != id);
                self.status_subs.retain(|(sub, _)| *sub != id);
            }
            _ => unreachable!("handle_registration only receives registration commands"),
        }
    }

    fn current_status(&self) -> ConnectionStatus {
        self.status_tx.borrow().status.clone()
    }

    fn set_status(&mut self, status: ConnectionStatus, message: &str) {
        let update = StatusUpdate {
            status,
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
            attempts: self.attempts,
        };
        tracing::debug!(url = %self.url, "status -> {:?} ({message})", update.status);
        let _ = self.status_tx.send(update.clone());
        let subs: Vec<StatusCallback> = self.status_subs.iter().map(|(_, cb)| cb.clone()).collect();
        for cb in subs {
            if catch_unwind(AssertUnwindSafe(|| cb(&update))).is_err() {
                tracing::warn!(url = %self.url, "status subscriber panicked; continuing fan-out");
            }
        }
    }
}

/// Build the handshake URL: http(s) schemes rewritten to ws(s), access
/// token appended as a query parameter.
pub(crate) fn socket_url(base: &str, token: &str) -> String {
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}token={}", urlencoding::encode(token))
}

#[cfg(test)]
mod tests {
    use super::socket_url;

    #[test]
    fn socket_url_rewrites_scheme_and_encodes_token() {
        assert_eq!(
            socket_url("https://blog.example/api/ws", "a b+c"),
            "wss://blog.example/api/ws?token=a%20b%2Bc"
        );
        assert_eq!(
            socket_url("ws://localhost:9000/ws?v=2", "t"),
            "ws://localhost:9000/ws?v=2&token=t"
        );
    }
}
