//! WebSocket push channel.
//!
//! Connects to the board's broadcast endpoint, forwards every text frame to
//! the owner and keeps the connection honest with a periodic liveness probe.
//! A probe that errors or does not complete within the heartbeat timeout
//! closes the connection as half-open. Lost connections are retried with
//! exponential backoff.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{ConnectionState, TransportTiming};
use crate::error::{BoardError, Result};

/// Text frame sent as the liveness probe.
pub const PROBE: &str = "ping";

/// What the push channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection changed state.
    StateChanged(ConnectionState),
    /// A text frame arrived.
    Message(String),
}

/// Reconnect backoff: `base_delay` doubling per consecutive failure, capped
/// at `max_delay`, for at most `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Push channel settings.
#[derive(Debug, Clone)]
pub struct PushChannelConfig {
    /// `ws://` or `wss://` endpoint, see [`push_url`].
    pub url: String,
    pub timing: TransportTiming,
    pub reconnect: ReconnectPolicy,
}

/// Build the push endpoint for `board_id` from the HTTP server URL.
///
/// `http` maps to `ws` and `https` to `wss`; other schemes are kept.
pub fn push_url(server_url: &str, board_id: &str) -> Result<String> {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    let url = Url::parse(&format!("{}/api/ws/boards/{}", base, board_id))?;
    Ok(url.to_string())
}

/// Handle to a running push channel. Dropping it stops the channel.
#[derive(Debug)]
pub struct PushChannelHandle {
    task: JoinHandle<()>,
}

impl PushChannelHandle {
    /// Stop the channel, closing any open connection.
    pub fn close(self) {
        log::info!("[PushChannel] Closing");
        // Drop aborts the task.
    }

    /// Whether the connection loop has ended (closed, or attempts exhausted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PushChannelHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the connection loop on the current tokio runtime.
pub fn spawn(config: PushChannelConfig, events: mpsc::UnboundedSender<TransportEvent>) -> PushChannelHandle {
    let task = tokio::spawn(run(config, events));
    PushChannelHandle { task }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run(config: PushChannelConfig, events: mpsc::UnboundedSender<TransportEvent>) {
    let mut attempts: u32 = 0;

    loop {
        if !report(&events, ConnectionState::Connecting) {
            break;
        }
        log::info!("[PushChannel] Connecting to {}", config.url);

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((socket, _)) => {
                attempts = 0;
                if !report(&events, ConnectionState::Connected) {
                    break;
                }
                match serve(socket, &config.timing, &events).await {
                    Ok(()) => log::info!("[PushChannel] Connection closed"),
                    Err(e) => log::warn!("[PushChannel] Connection lost: {}", e),
                }
            }
            Err(e) => log::warn!("[PushChannel] Connect failed: {}", e),
        }

        if !report(&events, ConnectionState::Disconnected) {
            break;
        }

        attempts += 1;
        if attempts > config.reconnect.max_attempts {
            log::error!(
                "[PushChannel] Giving up after {} reconnect attempts",
                config.reconnect.max_attempts
            );
            break;
        }
        let delay = config.reconnect.delay(attempts);
        log::info!(
            "[PushChannel] Reconnecting in {:?} (attempt {})",
            delay,
            attempts
        );
        tokio::time::sleep(delay).await;
    }

    log::info!("[PushChannel] Loop ended");
}

// Returns false once the owner is gone.
fn report(events: &mpsc::UnboundedSender<TransportEvent>, state: ConnectionState) -> bool {
    events.send(TransportEvent::StateChanged(state)).is_ok()
}

async fn serve(
    socket: Socket,
    timing: &TransportTiming,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<()> {
    let (mut write, mut read) = socket.split();

    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + timing.heartbeat_interval,
        timing.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    log::debug!("[PushChannel] Received {} bytes", text.len());
                    if events.send(TransportEvent::Message(text.to_string())).is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = heartbeat.tick() => {
                let probe = write.send(Message::Text(PROBE.into()));
                match tokio::time::timeout(timing.heartbeat_timeout, probe).await {
                    Ok(Ok(())) => log::debug!("[PushChannel] Heartbeat sent"),
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(BoardError::HeartbeatTimeout(timing.heartbeat_timeout)),
                }
            }
        }
    }
}
