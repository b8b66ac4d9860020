//! Reference protocol client
//!
//! A [`Client`] is a handle to a connection task. Outgoing packets go
//! through an unbounded queue, so actions never block; incoming packets
//! update the shared [`ClientState`] and are then emitted on the client's
//! [`EventSource`].

mod state;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

pub use state::ClientState;

use crate::error::{HarnessError, Result};
use crate::events::{Event, EventSource};
use crate::harness::{ClientConnection, ClientFactory, ConnectOptions};
use crate::position::{BlockPos, Vec3};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::world_data::{Block, Experience, Item};

struct Inner {
    username: String,
    events: EventSource,
    state: Arc<Mutex<ClientState>>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    shutdown: watch::Sender<bool>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one connected player
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Open a connection and log in; must be called inside a tokio runtime
    ///
    /// Returns at once. Watch for `Login` on [`Client::events`], or `End` if
    /// the server refuses the player.
    pub fn connect(options: ConnectOptions) -> Result<Self> {
        let (outbound, rx) = mpsc::unbounded_channel();
        outbound
            .send(ClientMessage::Login {
                username: options.username.clone(),
                version: options.version.clone(),
            })
            .map_err(|_| HarnessError::Disconnected(options.username.clone()))?;

        let events = EventSource::new(options.username.clone());
        let state = Arc::new(Mutex::new(ClientState::default()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let url = format!("ws://{}:{}/ws", options.host, options.port);

        let task = tokio::spawn(run(url, events.clone(), state.clone(), rx, shutdown_rx));

        Ok(Self {
            inner: Arc::new(Inner {
                username: options.username,
                events,
                state,
                outbound,
                shutdown,
                task: tokio::sync::Mutex::new(Some(task)),
            }),
        })
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    pub fn events(&self) -> &EventSource {
        &self.inner.events
    }

    /// Snapshot of part of the local view
    pub fn with_state<R>(&self, f: impl FnOnce(&ClientState) -> R) -> R {
        f(&self.inner.state.lock())
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        self.inner
            .outbound
            .send(msg)
            .map_err(|_| HarnessError::Disconnected(self.inner.username.clone()))
    }

    /// Close the connection and wait for the task to finish
    pub async fn quit(&self) -> Result<()> {
        let _ = self.inner.shutdown.send(true);
        let mut task = self.inner.task.lock().await;
        if let Some(task) = task.take() {
            if let Err(e) = task.await {
                warn!("Client task for {} ended abnormally: {}", self.inner.username, e);
            }
        }
        Ok(())
    }
}

/// Connection task: pump packets until either side closes
async fn run(
    url: String,
    events: EventSource,
    state: Arc<Mutex<ClientState>>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: watch::Receiver<bool>,
) {
    let reason = match connect_async(url.as_str()).await {
        Ok((ws, _)) => pump(ws, &events, &state, outbound, shutdown).await,
        Err(e) => {
            warn!("{} could not connect to {}: {}", events.name(), url, e);
            e.to_string()
        }
    };
    debug!("{} disconnected: {}", events.name(), reason);
    events.emit_event(&Event::End { reason });
    events.close();
}

async fn pump(
    ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    events: &EventSource,
    state: &Mutex<ClientState>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> String {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            Some(msg) = outbound.recv() => {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Could not encode {:?}: {}", msg, e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    return e.to_string();
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Disconnect { reason }) => return reason,
                            Ok(msg) => handle_packet(events, state, msg),
                            Err(e) => warn!("{} got an unreadable packet: {}", events.name(), e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return "Connection closed".to_string(),
                    Some(Err(e)) => return e.to_string(),
                    Some(Ok(_)) => {}
                }
            }
            _ = quit_requested(&mut shutdown) => {
                let _ = write.send(Message::Close(None)).await;
                return "Client quit".to_string();
            }
        }
    }
}

async fn quit_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|quit| *quit).await;
}

/// Emit the raw packet, then the domain events it implies
fn handle_packet(events: &EventSource, state: &Mutex<ClientState>, msg: ServerMessage) {
    trace!(client = events.name(), kind = ?msg.kind(), "packet");
    let domain = state.lock().apply(&msg);
    events.emit_event(&Event::Packet(msg));
    for (kind, event) in domain {
        events.emit(kind, &event);
    }
}

impl ClientConnection for Client {
    fn username(&self) -> &str {
        Client::username(self)
    }

    fn events(&self) -> &EventSource {
        Client::events(self)
    }

    fn is_logged_in(&self) -> bool {
        self.with_state(|s| s.logged_in)
    }

    fn is_spawned(&self) -> bool {
        self.with_state(|s| s.spawned)
    }

    fn position(&self) -> Vec3 {
        self.with_state(|s| s.position)
    }

    fn on_ground(&self) -> bool {
        self.with_state(|s| s.on_ground)
    }

    fn block_at(&self, pos: BlockPos) -> Option<Block> {
        self.with_state(|s| s.block_at(pos))
    }

    fn inventory_slot(&self, slot: u16) -> Option<Item> {
        self.with_state(|s| s.inventory.get(&slot).copied())
    }

    fn experience(&self) -> Experience {
        self.with_state(|s| s.experience)
    }

    fn chat(&self, message: &str) -> Result<()> {
        self.send(ClientMessage::Chat {
            message: message.to_string(),
        })
    }

    fn dig(&self, block: &Block) -> Result<()> {
        self.send(ClientMessage::Dig {
            location: block.position,
        })
    }

    fn place_block(&self, reference: &Block, face: BlockPos) -> Result<()> {
        self.send(ClientMessage::PlaceBlock {
            location: reference.position,
            face,
        })
    }

    fn set_inventory_slot(&self, slot: u16, item: Option<Item>) -> Result<()> {
        self.send(ClientMessage::CreativeSlot { slot, item })
    }

    fn join_world(&self) -> Result<()> {
        self.send(ClientMessage::JoinWorld)
    }

    fn quit(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        Client::quit(self)
    }
}

/// Creates reference clients
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldClientFactory;

impl ClientFactory for WorldClientFactory {
    type Client = Client;

    fn connect(&self, options: ConnectOptions) -> Result<Client> {
        Client::connect(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::events::{once, wait_state, EventKind};
    use crate::server::Server;

    async fn listening_server() -> Server {
        let config = ServerConfig::for_scenario(&ServerConfig::default(), "1.12.2");
        let server = Server::create(config).unwrap();
        once::<std::net::SocketAddr>(server.events(), EventKind::Listening)
            .await
            .ok();
        server
    }

    fn options(server: &Server, username: &str, version: &str) -> ConnectOptions {
        ConnectOptions {
            host: "127.0.0.1".to_string(),
            port: server.local_addr().unwrap().port(),
            username: username.to_string(),
            version: version.to_string(),
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_connection_task_is_send() {
        let (_outbound, rx) = mpsc::unbounded_channel();
        let (_shutdown, shutdown_rx) = watch::channel(false);
        let task = run(
            "ws://127.0.0.1:1/ws".to_string(),
            EventSource::new("bot"),
            Arc::default(),
            rx,
            shutdown_rx,
        );
        assert_send(&task);
    }

    #[tokio::test]
    async fn test_login_and_spawn() {
        let server = listening_server().await;
        let client = Client::connect(options(&server, "bot", "1.12.2")).unwrap();

        let probe = client.clone();
        wait_state(client.events(), EventKind::Login, move || probe.is_logged_in())
            .await
            .unwrap();

        let spawn = once::<Vec3>(client.events(), EventKind::Spawn);
        client.join_world().unwrap();
        let position = spawn.await.unwrap();
        assert_eq!(position.x, 0.5);

        client.quit().await.unwrap();
        assert!(client.events().is_closed());
        assert!(client.chat("hello").is_err());
        server.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_mismatch_ends_connection() {
        let server = listening_server().await;
        let client = Client::connect(options(&server, "bot", "1.8.8")).unwrap();

        let reason = once::<Event>(client.events(), EventKind::End).await.unwrap();
        assert!(matches!(reason, Event::End { reason } if reason.contains("1.12.2")));
        assert!(!client.is_logged_in());
        server.quit().await.unwrap();
    }
}
