//! WebSocket connector
//!
//! Owns the socket and the two timers (push debounce, pull heartbeat) and
//! drives the sans-I/O [`Session`] from a single `tokio::select!` loop.
//! Every event runs to completion before the next is processed; timers are
//! cancelled by dropping the loop and are connection-state-checked inside
//! the session if they fire around teardown.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::cursor::CursorRenderer;
use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::surface::{ChangeRange, EditorSurface};

/// Default push debounce: coalesce rapid keystrokes into one message
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Default pull heartbeat, the self-healing backstop for missed broadcasts
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(3);

/// Connector configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `ws://127.0.0.1:8080`
    pub url: String,
    pub room: String,
    pub display_name: Option<String>,
    pub debounce: Duration,
    pub pull_interval: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room: room.into(),
            display_name: None,
            debounce: DEFAULT_DEBOUNCE,
            pull_interval: DEFAULT_PULL_INTERVAL,
        }
    }
}

/// Application -> engine commands
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Structured per-edit ranges from the editing surface
    Changes(Vec<ChangeRange>),
    /// Full before/after snapshot (fallback diff path)
    Snapshot(String),
    /// The local caret moved
    Caret(usize),
    /// Rename and re-announce presence
    Rename(String),
    /// Graceful teardown
    Disconnect,
}

/// Engine -> application notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Handshake complete, identity adopted
    Connected { client_id: String },
    /// Transport lost or closed; ephemeral state cleared
    Disconnected,
    /// Document, cursor, or presence state changed
    Updated { version: u64 },
}

/// Handle to a running sync client.
///
/// The connection runs in a background task; the handle carries the command
/// sender and the event receiver.
pub struct SyncClient {
    commands: mpsc::Sender<ClientCommand>,
    events: Option<mpsc::Receiver<ClientEvent>>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncClient {
    /// Connect and spawn the session loop.
    ///
    /// The surface and renderer move into the background task; hand in
    /// shared handles if the application needs to observe them.
    pub async fn connect<S, R>(
        config: ClientConfig,
        surface: S,
        renderer: R,
    ) -> ClientResult<Self>
    where
        S: EditorSurface + Send + 'static,
        R: CursorRenderer + Send + 'static,
        R::Handle: Send,
    {
        let url = format!("{}/ws/{}", config.url.trim_end_matches('/'), config.room);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        info!(url = %url, room = %config.room, "Connected to sequencer");

        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);

        let session = Session::new(
            config.room.clone(),
            config.display_name.clone(),
            surface,
            renderer,
        );
        let task = tokio::spawn(run_loop(ws, session, config, command_rx, event_tx));

        Ok(Self {
            commands: command_tx,
            events: Some(event_rx),
            task,
        })
    }

    /// Sender for application commands
    pub fn commands(&self) -> mpsc::Sender<ClientCommand> {
        self.commands.clone()
    }

    /// Take the event receiver (can only be taken once)
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events.take()
    }

    /// Request a graceful teardown and wait for the loop to finish
    pub async fn disconnect(self) {
        let _ = self.commands.send(ClientCommand::Disconnect).await;
        let _ = self.task.await;
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn run_loop<S, R>(
    ws: WsStream,
    mut session: Session<S, R>,
    config: ClientConfig,
    mut commands: mpsc::Receiver<ClientCommand>,
    events: mpsc::Sender<ClientEvent>,
) where
    S: EditorSurface + Send + 'static,
    R: CursorRenderer + Send + 'static,
    R::Handle: Send,
{
    let (mut write, mut read) = ws.split();
    session.connect();

    let mut pull = interval(config.pull_interval);
    let debounce = sleep(Duration::from_secs(86400));
    tokio::pin!(debounce);
    let mut debounce_armed = false;
    let mut announced = false;

    'run: loop {
        let outgoing = tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => session.handle_frame(&text),
                Some(Ok(WsMessage::Ping(payload))) => {
                    if write.send(WsMessage::Pong(payload)).await.is_err() {
                        break 'run;
                    }
                    Vec::new()
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("Server closed the connection");
                    break 'run;
                }
                Some(Ok(_)) => Vec::new(), // ignore other frame types
                Some(Err(e)) => {
                    warn!(error = %e, "Transport lost");
                    break 'run;
                }
            },

            cmd = commands.recv() => match cmd {
                Some(ClientCommand::Changes(ranges)) => session.local_changes(&ranges),
                Some(ClientCommand::Snapshot(text)) => session.local_snapshot(&text),
                Some(ClientCommand::Caret(position)) => session.caret_moved(position),
                Some(ClientCommand::Rename(alias)) => session.rename(&alias),
                Some(ClientCommand::Disconnect) | None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    break 'run;
                }
            },

            _ = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                session.flush_push()
            },

            _ = pull.tick() => session.pull_tick(),
        };

        for msg in outgoing {
            let frame = match msg.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outgoing message");
                    continue;
                }
            };
            if write.send(WsMessage::Text(frame)).await.is_err() {
                warn!("Transport lost while sending");
                break 'run;
            }
        }

        if !announced && !session.client_id().is_empty() {
            announced = true;
            let _ = events.try_send(ClientEvent::Connected {
                client_id: session.client_id().to_string(),
            });
        }
        if session.take_dirty() {
            let _ = events.try_send(ClientEvent::Updated {
                version: session.document().version(),
            });
        }
        // Arm the debounce on the first unflushed edit; a fixed delay from
        // that edit guarantees progress even under continuous typing.
        if session.wants_push() && !debounce_armed {
            debounce_armed = true;
            debounce.as_mut().reset(Instant::now() + config.debounce);
        }
    }

    session.disconnected();
    let _ = events.try_send(ClientEvent::Disconnected);
}
