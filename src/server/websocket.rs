//! WebSocket handler for player connections

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{commands, shutdown_signal, AppState};
use crate::position::{BlockPos, Vec3};
use crate::protocol::{ChatMessage, ClientMessage, ServerMessage};
use crate::world_data::{Block, Item, AIR, QUICK_BAR_START};

/// Height above the surface a player is dropped from when joining
pub const SPAWN_DROP: f64 = 2.0;

/// A connected player
#[derive(Debug)]
pub struct PlayerSession {
    pub entity_id: i32,
    pub username: String,
    pub uuid: String,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    pub position: Vec3,
    pub on_ground: bool,
    /// Gravity applies until the player lands or is teleported
    pub falling: bool,
    pub in_world: bool,
    pub op: bool,
    pub experience: u32,
    pub inventory: HashMap<u16, Item>,
    pub held_slot: u16,
}

impl PlayerSession {
    pub fn send(&self, msg: ServerMessage) {
        if self.sender.send(msg).is_err() {
            debug!("Dropping message for disconnected player {}", self.username);
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.send(ServerMessage::Chat {
            message: ChatMessage::new(text),
        });
    }
}

/// Connection manager for all logged-in players
#[derive(Default)]
pub struct ConnectionManager {
    sessions: RwLock<HashMap<i32, PlayerSession>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player session; fails if the username is taken
    pub fn register(&self, session: PlayerSession) -> Result<(), PlayerSession> {
        let mut sessions = self.sessions.write();
        if sessions.values().any(|s| s.username == session.username) {
            return Err(session);
        }
        sessions.insert(session.entity_id, session);
        Ok(())
    }

    /// Remove a player session
    pub fn unregister(&self, entity_id: i32) -> Option<PlayerSession> {
        self.sessions.write().remove(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Find a player's entity id by username
    pub fn find(&self, username: &str) -> Option<i32> {
        self.sessions
            .read()
            .values()
            .find(|s| s.username == username)
            .map(|s| s.entity_id)
    }

    /// Run `f` against one session
    pub fn with<R>(&self, entity_id: i32, f: impl FnOnce(&PlayerSession) -> R) -> Option<R> {
        self.sessions.read().get(&entity_id).map(f)
    }

    /// Run `f` against one session, mutably
    pub fn with_mut<R>(
        &self,
        entity_id: i32,
        f: impl FnOnce(&mut PlayerSession) -> R,
    ) -> Option<R> {
        self.sessions.write().get_mut(&entity_id).map(f)
    }

    /// Run `f` against every session, mutably
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut PlayerSession)) {
        for session in self.sessions.write().values_mut() {
            f(session);
        }
    }

    /// Send a message to one player
    pub fn send_to(&self, entity_id: i32, msg: ServerMessage) {
        self.with(entity_id, |s| s.send(msg));
    }

    /// Send a chat line to one player
    pub fn tell(&self, entity_id: i32, text: impl Into<String>) {
        let text = text.into();
        self.with(entity_id, |s| s.send_text(text));
    }

    /// Broadcast to every logged-in player
    pub fn broadcast(&self, msg: ServerMessage) {
        for session in self.sessions.read().values() {
            session.send(msg.clone());
        }
    }

    /// Broadcast to players that joined the world
    pub fn broadcast_in_world(&self, msg: ServerMessage) {
        for session in self.sessions.read().values().filter(|s| s.in_world) {
            session.send(msg.clone());
        }
    }

    /// Broadcast a chat line to every logged-in player
    pub fn announce(&self, text: impl Into<String>) {
        self.broadcast(ServerMessage::Chat {
            message: ChatMessage::new(text),
        });
    }
}

/// Handle WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let _guard = state.track_session();
    let mut shutdown = state.shutdown.clone();

    let Some((entity_id, mut rx)) = login(&mut socket, &state).await else {
        return;
    };

    // Main loop: outgoing packets, incoming packets, server shutdown
    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if let Ok(json) = serde_json::to_string(&msg) {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => handle_client_message(&state, entity_id, msg),
                            Err(e) => warn!("Bad packet from {}: {}", entity_id, e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Socket error for {}: {}", entity_id, e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_signal(&mut shutdown) => {
                send_packet(&mut socket, &ServerMessage::Disconnect {
                    reason: "Server closed".to_string(),
                }).await;
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Clean up
    if let Some(session) = state.connections.unregister(entity_id) {
        if state.config.logging {
            info!("{} left the game", session.username);
        }
        if session.in_world && !*state.shutdown.borrow() {
            state
                .connections
                .announce(format!("{} left the game.", session.username));
        }
    }
}

async fn send_packet(socket: &mut WebSocket, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn reject(socket: &mut WebSocket, reason: String) {
    debug!("Rejecting login: {}", reason);
    send_packet(socket, &ServerMessage::Disconnect { reason }).await;
    let _ = socket.send(Message::Close(None)).await;
}

/// Run the login exchange; returns the player's entity id and packet queue
async fn login(
    socket: &mut WebSocket,
    state: &AppState,
) -> Option<(i32, mpsc::UnboundedReceiver<ServerMessage>)> {
    let mut shutdown = state.shutdown.clone();
    let (username, version) = loop {
        let frame = tokio::select! {
            frame = socket.recv() => frame,
            _ = shutdown_signal(&mut shutdown) => return None,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Login { username, version }) => break (username, version),
                _ => {
                    reject(socket, "Expected login".to_string()).await;
                    return None;
                }
            },
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            _ => continue,
        }
    };

    if state.config.auth_enabled {
        reject(socket, "Online mode is not supported".to_string()).await;
        return None;
    }
    if version != state.config.version {
        reject(
            socket,
            format!("Outdated client! Please use {}", state.config.version),
        )
        .await;
        return None;
    }
    if state.connections.len() >= state.config.max_players as usize {
        reject(socket, "The server is full!".to_string()).await;
        return None;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let entity_id = state.next_entity_id();
    let uuid = offline_uuid(&username);
    let spawn = state.spawn_point();
    let session = PlayerSession {
        entity_id,
        username: username.clone(),
        uuid: uuid.clone(),
        sender: tx,
        position: spawn,
        on_ground: false,
        falling: false,
        in_world: false,
        op: state.config.everybody_op,
        experience: 0,
        inventory: HashMap::new(),
        held_slot: QUICK_BAR_START,
    };
    if state.connections.register(session).is_err() {
        reject(socket, format!("{} is already connected", username)).await;
        return None;
    }

    let reply = ServerMessage::Login {
        entity_id,
        username: username.clone(),
        uuid,
    };
    if !send_packet(socket, &reply).await {
        state.connections.unregister(entity_id);
        return None;
    }
    if state.config.logging {
        info!("{} logged in with entity id {}", username, entity_id);
    }
    Some((entity_id, rx))
}

/// Offline-mode player UUID derived from the username
pub fn offline_uuid(username: &str) -> String {
    let name = format!("OfflinePlayer:{}", username);
    uuid::Uuid::new_v3(&uuid::Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Handle a message from the client
fn handle_client_message(state: &AppState, entity_id: i32, msg: ClientMessage) {
    match msg {
        ClientMessage::Login { .. } => {
            debug!("Ignoring repeated login from {}", entity_id);
        }
        ClientMessage::JoinWorld => join_world(state, entity_id),
        ClientMessage::Chat { message } => {
            if let Some(command) = message.strip_prefix('/') {
                commands::execute(state, entity_id, command);
            } else if let Some(name) = state.connections.with(entity_id, |s| s.username.clone()) {
                state.connections.announce(format!("<{}> {}", name, message));
            }
        }
        ClientMessage::Dig { location } => {
            let air = Block {
                position: location,
                type_id: AIR,
                metadata: 0,
            };
            if state.set_block(air).is_some() && state.config.logging {
                info!("Player {} dug {}", entity_id, location);
            }
        }
        ClientMessage::PlaceBlock { location, face } => place_block(state, entity_id, location, face),
        ClientMessage::CreativeSlot { slot, item } => {
            let updated = state.connections.with_mut(entity_id, |s| {
                match item {
                    Some(item) => s.inventory.insert(slot, item),
                    None => s.inventory.remove(&slot),
                };
                s.send(ServerMessage::SetSlot {
                    window_id: 0,
                    slot,
                    item,
                });
            });
            if updated.is_none() {
                warn!("Creative slot edit for unknown player {}", entity_id);
            }
        }
    }
}

/// Stream terrain, announce the player and drop them onto the surface
fn join_world(state: &AppState, entity_id: i32) {
    let Some((username, position, already)) = state
        .connections
        .with(entity_id, |s| (s.username.clone(), s.position, s.in_world))
    else {
        return;
    };
    if already {
        return;
    }

    let view = state.config.view_distance as i32;
    let (scx, scz) = position.floored().chunk();
    let chunks: Vec<ServerMessage> = {
        let mut world = state.world.lock();
        let mut chunks = Vec::new();
        for cx in scx - view..scx + view {
            for cz in scz - view..scz + view {
                let column = world.column(cx, cz);
                chunks.push(ServerMessage::MapChunk {
                    x: cx,
                    z: cz,
                    heights: column.heights().to_vec(),
                    blocks: column.overrides(),
                });
            }
        }
        chunks
    };

    state.connections.with_mut(entity_id, |s| {
        for chunk in chunks {
            s.send(chunk);
        }
        s.in_world = true;
        s.falling = true;
        s.on_ground = false;
    });

    state
        .connections
        .announce(format!("{} joined the game.", username));

    state.connections.send_to(
        entity_id,
        ServerMessage::Position {
            position,
            on_ground: false,
            teleport: true,
        },
    );
    if state.config.logging {
        info!("{} joined the world at {}", username, position);
    }
}

fn place_block(state: &AppState, entity_id: i32, location: BlockPos, face: BlockPos) {
    let Some(held) = state
        .connections
        .with(entity_id, |s| s.inventory.get(&s.held_slot).copied())
    else {
        return;
    };
    let Some(item) = held else {
        debug!("Player {} placed with an empty hand", entity_id);
        return;
    };

    let target = location + face;
    let current = state.world.lock().block_at(target);
    if !current.is_air() {
        // Resync the client's view of the occupied block
        state.connections.send_to(
            entity_id,
            ServerMessage::BlockChange {
                location: target,
                type_id: current.type_id,
                metadata: current.metadata,
            },
        );
        return;
    }

    state.set_block(Block {
        position: target,
        type_id: item.type_id,
        metadata: item.metadata as u8,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(entity_id: i32, username: &str) -> (PlayerSession, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, rx) = mpsc::unbounded_channel();
        let session = PlayerSession {
            entity_id,
            username: username.to_string(),
            uuid: offline_uuid(username),
            sender,
            position: Vec3::default(),
            on_ground: false,
            falling: false,
            in_world: false,
            op: true,
            experience: 0,
            inventory: HashMap::new(),
            held_slot: QUICK_BAR_START,
        };
        (session, rx)
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let connections = ConnectionManager::new();
        let (first, _rx1) = session(1, "bot");
        let (second, _rx2) = session(2, "bot");
        assert!(connections.register(first).is_ok());
        assert!(connections.register(second).is_err());
        assert_eq!(connections.find("bot"), Some(1));
        assert!(connections.unregister(1).is_some());
        assert!(connections.is_empty());
    }

    #[test]
    fn test_in_world_broadcast_skips_lobby() {
        let connections = ConnectionManager::new();
        let (mut joined, mut joined_rx) = session(1, "bot");
        joined.in_world = true;
        let (lobby, mut lobby_rx) = session(2, "bot2");
        connections.register(joined).unwrap();
        connections.register(lobby).unwrap();

        connections.broadcast_in_world(ServerMessage::EntityDestroy { entity_ids: vec![7] });
        connections.announce("hello");

        assert!(matches!(joined_rx.try_recv(), Ok(ServerMessage::EntityDestroy { .. })));
        assert!(matches!(joined_rx.try_recv(), Ok(ServerMessage::Chat { .. })));
        assert!(matches!(lobby_rx.try_recv(), Ok(ServerMessage::Chat { .. })));
        assert!(lobby_rx.try_recv().is_err());
    }

    fn assert_send_handler<F, Fut>(_: F)
    where
        F: FnOnce(WebSocket, AppState) -> Fut,
        Fut: Send,
    {
    }

    #[test]
    fn test_session_future_is_send() {
        assert_send_handler(handle_socket);
    }

    #[tokio::test]
    async fn test_quit_releases_socket_waiting_for_login() {
        use crate::config::ServerConfig;
        use crate::events::{once, EventKind};
        use crate::server::Server;

        let config = ServerConfig::for_scenario(&ServerConfig::default(), "1.12.2");
        let server = Server::create(config).unwrap();
        let addr = once::<std::net::SocketAddr>(server.events(), EventKind::Listening)
            .await
            .unwrap();

        // Connected but never sends Login
        let (_socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), server.quit())
            .await
            .expect("quit finished")
            .unwrap();
    }

    #[test]
    fn test_offline_uuid_is_stable() {
        assert_eq!(offline_uuid("bot"), offline_uuid("bot"));
        assert_ne!(offline_uuid("bot"), offline_uuid("bot2"));
    }
}
