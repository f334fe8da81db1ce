//! WebSocket listener
//!
//! Accepts connections on `/ws/{room}`, assigns each one a client identity,
//! registers it with the hub, and pumps frames between the socket and the
//! room until the connection drops.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use cowrite_protocol::Message;

use crate::hub::Hub;

/// WebSocket server for CoWrite rooms
pub struct WsServer {
    hub: Arc<Hub>,
    addr: SocketAddr,
}

impl WsServer {
    pub fn new(hub: Arc<Hub>, addr: SocketAddr) -> Self {
        Self { hub, addr }
    }

    /// Bind and serve until the process shuts down
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "CoWrite sequencer listening");
        Self::serve(self.hub.clone(), listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve(
        hub: Arc<Hub>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, hub).await {
                            error!(peer = %peer_addr, error = %e, "WebSocket connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: Arc<Hub>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut path = String::new();
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    })
    .await?;

    let Some(room_id) = path.strip_prefix("/ws/").filter(|r| !r.is_empty()) else {
        warn!(path = %path, "Rejecting connection with unroutable path");
        return Ok(());
    };
    let room_id = room_id.to_string();

    let client_id = hub.assign_client_id();
    let (tx, mut rx) = mpsc::channel::<Message>(256);
    let room = match hub.register(&room_id, &client_id, tx).await {
        Ok(room) => room,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Rejecting connection");
            return Ok(());
        }
    };
    info!(client = %client_id, room = %room_id, "WebSocket client connected");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            // Inbound frames feed the room
            frame = read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match Message::decode(&text) {
                            Ok(msg) => {
                                room.lock().handle_message(&client_id, msg);
                                hub.persist(&room_id).await;
                            }
                            Err(e) => {
                                warn!(client = %client_id, error = %e, "Dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if write.send(WsMessage::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!(client = %client_id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore other frame types
                    }
                    Some(Err(e)) => {
                        warn!(client = %client_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }

            // Room traffic destined for this client
            outbound = rx.recv() => {
                match outbound {
                    Some(msg) => {
                        match msg.encode() {
                            Ok(frame) => {
                                if write.send(WsMessage::Text(frame)).await.is_err() {
                                    warn!(client = %client_id, "WebSocket write error");
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(client = %client_id, error = %e, "Failed to encode outbound message");
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    hub.persist(&room_id).await;
    hub.unregister(&room_id, &client_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cowrite_client::{
        BufferSurface, ChangeRange, ClientCommand, ClientConfig, ClientEvent, CursorRenderer,
        EditorSurface, SyncClient,
    };
    use cowrite_storage::MemoryStorage;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedSurface(Arc<parking_lot::Mutex<BufferSurface>>);

    impl EditorSurface for SharedSurface {
        fn content(&self) -> String {
            self.0.lock().content()
        }
        fn set_content(&mut self, text: &str) {
            self.0.lock().set_content(text)
        }
        fn apply_insert(&mut self, position: usize, text: &str) {
            self.0.lock().apply_insert(position, text)
        }
        fn apply_delete(&mut self, position: usize, span: usize) {
            self.0.lock().apply_delete(position, span)
        }
        fn caret(&self) -> usize {
            self.0.lock().caret()
        }
        fn coords_at(&self, offset: usize) -> Option<(f32, f32)> {
            self.0.lock().coords_at(offset)
        }
    }

    #[derive(Clone, Default)]
    struct SharedRenderer(Arc<parking_lot::Mutex<HashMap<String, Option<(f32, f32)>>>>);

    impl CursorRenderer for SharedRenderer {
        type Handle = String;

        fn create(&mut self, user_id: &str) -> String {
            self.0.lock().insert(user_id.to_string(), None);
            user_id.to_string()
        }
        fn place(&mut self, handle: &mut String, x: f32, y: f32) {
            self.0.lock().insert(handle.clone(), Some((x, y)));
        }
        fn hide(&mut self, handle: &mut String) {
            self.0.lock().insert(handle.clone(), None);
        }
        fn remove(&mut self, handle: String) {
            self.0.lock().remove(&handle);
        }
        fn is_attached(&self, handle: &String) -> bool {
            self.0.lock().contains_key(handle)
        }
        fn attach(&mut self, handle: &mut String) {
            self.0.lock().entry(handle.clone()).or_insert(None);
        }
    }

    async fn start_server() -> SocketAddr {
        let hub = Arc::new(Hub::new().with_storage(Arc::new(MemoryStorage::new())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(WsServer::serve(hub, listener));
        addr
    }

    async fn connect(
        addr: SocketAddr,
        room: &str,
        debounce: Duration,
    ) -> (
        SyncClient,
        SharedSurface,
        SharedRenderer,
        tokio::sync::mpsc::Receiver<ClientEvent>,
    ) {
        let surface = SharedSurface::default();
        let renderer = SharedRenderer::default();
        let mut config = ClientConfig::new(format!("ws://{}", addr), room);
        config.debounce = debounce;
        config.pull_interval = Duration::from_millis(300);
        let mut client = SyncClient::connect(config, surface.clone(), renderer.clone())
            .await
            .unwrap();
        let events = client.take_events().unwrap();
        (client, surface, renderer, events)
    }

    async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
        for _ in 0..250 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    async fn client_id_of(events: &mut tokio::sync::mpsc::Receiver<ClientEvent>) -> String {
        let deadline = tokio::time::Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            loop {
                match events.recv().await {
                    Some(ClientEvent::Connected { client_id }) => return client_id,
                    Some(_) => continue,
                    None => panic!("event channel closed before Connected"),
                }
            }
        })
        .await
        .expect("no Connected event in time")
    }

    /// Wait until the version handshake completed (first state change)
    async fn wait_synced(events: &mut tokio::sync::mpsc::Receiver<ClientEvent>) {
        let deadline = tokio::time::Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            loop {
                match events.recv().await {
                    Some(ClientEvent::Updated { .. }) => return,
                    Some(_) => continue,
                    None => panic!("event channel closed before first update"),
                }
            }
        })
        .await
        .expect("no Updated event in time")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_end_to_end_convergence() {
        let addr = start_server().await;
        let (client_a, surface_a, _, mut events_a) =
            connect(addr, "e2e", Duration::ZERO).await;
        let (client_b, surface_b, _, _events_b) = connect(addr, "e2e", Duration::ZERO).await;
        client_id_of(&mut events_a).await;
        wait_synced(&mut events_a).await;

        // A inserts "foo" at 0 in the empty doc
        surface_a.0.lock().insert_local(0, "foo");
        client_a
            .commands()
            .send(ClientCommand::Changes(vec![ChangeRange::insertion(0, "foo")]))
            .await
            .unwrap();

        wait_for(|| surface_b.content() == "foo", "B to receive the insert").await;

        // A deletes the "f"; both converge to "oo"
        surface_a.0.lock().delete_local(0, 1);
        client_a
            .commands()
            .send(ClientCommand::Changes(vec![ChangeRange::deletion(0, 1)]))
            .await
            .unwrap();

        wait_for(
            || surface_a.content() == "oo" && surface_b.content() == "oo",
            "both clients to converge on \"oo\"",
        )
        .await;

        client_a.disconnect().await;
        client_b.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_late_joiner_adopts_snapshot() {
        let addr = start_server().await;
        let (client_a, surface_a, _, mut events_a) = connect(addr, "late", Duration::ZERO).await;
        wait_synced(&mut events_a).await;

        surface_a.0.lock().insert_local(0, "history");
        client_a
            .commands()
            .send(ClientCommand::Changes(vec![ChangeRange::insertion(
                0, "history",
            )]))
            .await
            .unwrap();

        wait_for(|| surface_a.content() == "history", "A to sync").await;

        let (client_c, surface_c, _, _) = connect(addr, "late", Duration::ZERO).await;
        wait_for(|| surface_c.content() == "history", "C to adopt the snapshot").await;

        client_a.disconnect().await;
        client_c.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cursor_presence_and_leave() {
        let addr = start_server().await;
        let (client_a, _, _, mut events_a) = connect(addr, "cursors", Duration::ZERO).await;
        let (client_b, _, renderer_b, _) = connect(addr, "cursors", Duration::ZERO).await;
        let a_id = client_id_of(&mut events_a).await;
        wait_synced(&mut events_a).await;

        // Re-report until B has joined and rendered it; cursor reports are
        // not replayed, each keystroke re-announces them in practice.
        let commands_a = client_a.commands();
        let seen = renderer_b.clone();
        let a = a_id.clone();
        for attempt in 0..250 {
            commands_a.send(ClientCommand::Caret(0)).await.unwrap();
            if seen.0.lock().contains_key(&a) {
                break;
            }
            assert!(attempt < 249, "timed out waiting for B to render A's cursor");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        client_a.disconnect().await;

        let gone = renderer_b.clone();
        wait_for(
            move || !gone.0.lock().contains_key(&a_id),
            "A's cursor to be removed on leave",
        )
        .await;

        client_b.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disconnect_discards_unpushed_batch() {
        let addr = start_server().await;

        // Debounce far longer than the test: the edit never flushes
        let (client_a, surface_a, _, mut events_a) =
            connect(addr, "discard", Duration::from_secs(600)).await;
        client_id_of(&mut events_a).await;
        wait_synced(&mut events_a).await;

        surface_a.0.lock().insert_local(0, "never pushed");
        client_a
            .commands()
            .send(ClientCommand::Changes(vec![ChangeRange::insertion(
                0,
                "never pushed",
            )]))
            .await
            .unwrap();
        client_a.disconnect().await;

        // A fresh participant sees the authoritative (empty) document
        let (client_b, surface_b, _, mut events_b) =
            connect(addr, "discard", Duration::ZERO).await;
        client_id_of(&mut events_b).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(surface_b.content(), "");

        client_b.disconnect().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rapid_edits_coalesce_and_converge() {
        let addr = start_server().await;
        let (client_a, surface_a, _, mut events_a) =
            connect(addr, "burst", Duration::from_millis(150)).await;
        let (client_b, surface_b, _, _) = connect(addr, "burst", Duration::ZERO).await;
        wait_synced(&mut events_a).await;

        // Three keystrokes inside one debounce window
        for (i, c) in ["a", "b", "c"].iter().enumerate() {
            surface_a.0.lock().insert_local(i, c);
            client_a
                .commands()
                .send(ClientCommand::Changes(vec![ChangeRange::insertion(i, *c)]))
                .await
                .unwrap();
        }

        wait_for(
            || surface_a.content() == "abc" && surface_b.content() == "abc",
            "burst to converge",
        )
        .await;

        client_a.disconnect().await;
        client_b.disconnect().await;
    }
}
