//! Reference block-world server
//!
//! A compact server speaking the JSON wire protocol over a WebSocket. It
//! exists so the scenario catalog has something real to drive: sessions,
//! chunk streaming, gravity, block edits and the chat command set.

pub mod commands;
mod physics;
pub mod websocket;
pub mod world;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{HarnessError, Result};
use crate::events::{Entity, Event, EventSource};
use crate::harness::{ServerFactory, ServerInstance};
use crate::position::Vec3;
use crate::protocol::ServerMessage;
use crate::world_data::{Block, Feature, VersionData};
pub use websocket::{ConnectionManager, PlayerSession};
use world::World;

/// Shared server state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub data: VersionData,
    pub world: Arc<Mutex<World>>,
    pub connections: Arc<ConnectionManager>,
    /// Non-player entities by id
    pub mobs: Arc<Mutex<HashMap<i32, Entity>>>,
    pub shutdown: watch::Receiver<bool>,
    next_entity: Arc<AtomicI32>,
    sessions: Arc<watch::Sender<usize>>,
}

impl AppState {
    fn new(config: ServerConfig, data: VersionData, world: World) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sessions, _) = watch::channel(0);
        let state = Self {
            config: Arc::new(config),
            data,
            world: Arc::new(Mutex::new(world)),
            connections: Arc::new(ConnectionManager::new()),
            mobs: Arc::new(Mutex::new(HashMap::new())),
            shutdown: shutdown_rx,
            next_entity: Arc::new(AtomicI32::new(1)),
            sessions: Arc::new(sessions),
        };
        (state, shutdown_tx)
    }

    pub fn next_entity_id(&self) -> i32 {
        self.next_entity.fetch_add(1, Ordering::SeqCst)
    }

    /// Where joining players appear: above the surface at the origin column
    pub fn spawn_point(&self) -> Vec3 {
        let surface = self.world.lock().surface_y(0, 0);
        Vec3::new(0.5, (surface + 1) as f64 + websocket::SPAWN_DROP, 0.5)
    }

    /// Change a block and broadcast it to players in the world
    pub fn set_block(&self, block: Block) -> Option<Block> {
        let old = self.world.lock().set_block(block)?;
        self.connections
            .broadcast_in_world(ServerMessage::BlockChange {
                location: block.position,
                type_id: block.type_id,
                metadata: block.metadata,
            });
        Some(old)
    }

    /// Count a live session until the guard drops
    pub fn track_session(&self) -> SessionGuard {
        self.sessions.send_modify(|n| *n += 1);
        SessionGuard {
            sessions: self.sessions.clone(),
        }
    }
}

/// Keeps the live session count accurate for shutdown
pub struct SessionGuard {
    sessions: Arc<watch::Sender<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: state.data.version(),
        players: state.connections.len(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    players: usize,
}

/// A running reference server
///
/// Created by [`Server::create`], which binds in the background; the
/// `Listening` event on [`Server::events`] reports the bound address.
pub struct Server {
    state: AppState,
    events: EventSource,
    addr: Arc<OnceLock<SocketAddr>>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    quit_started: AtomicBool,
}

impl Server {
    /// Start a server; must be called inside a tokio runtime
    pub fn create(config: ServerConfig) -> Result<Self> {
        let data = VersionData::for_version(&config.version).ok_or_else(|| {
            HarnessError::SetupFailure(format!("unsupported version {}", config.version))
        })?;

        let mut world = World::new(&config.generation);
        if let Some(folder) = &config.world_folder {
            world.load(folder)?;
        }

        let port = config.port;
        let (state, shutdown_tx) = AppState::new(config, data, world);
        let events = EventSource::new("server");
        let addr = Arc::new(OnceLock::new());

        let handle = tokio::spawn(run(state.clone(), events.clone(), addr.clone(), port));

        Ok(Self {
            state,
            events,
            addr,
            shutdown_tx,
            handle: tokio::sync::Mutex::new(Some(handle)),
            quit_started: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> &EventSource {
        &self.events
    }

    /// Bound address, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr.get().copied()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        self.state.data.supports(feature)
    }

    /// Grant or revoke operator rights; false if the player is not online
    pub fn set_operator(&self, username: &str, op: bool) -> bool {
        let Some(id) = self.state.connections.find(username) else {
            return false;
        };
        self.state.connections.with_mut(id, |s| s.op = op).is_some()
    }

    /// Stop accepting players, close every session and persist the world
    ///
    /// Safe to call more than once; later calls wait for the first to finish.
    pub async fn quit(&self) -> Result<()> {
        let first = !self.quit_started.swap(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);

        let mut handle = self.handle.lock().await;
        if let Some(task) = handle.take() {
            if let Err(e) = task.await {
                warn!("Server task ended abnormally: {}", e);
            }
            let mut sessions = self.state.sessions.subscribe();
            let _ = sessions.wait_for(|n| *n == 0).await;

            if let Some(folder) = &self.state.config.world_folder {
                self.state.world.lock().save(folder)?;
            }
        }
        if first {
            debug!("Server quit complete");
        }
        Ok(())
    }
}

/// Bind, serve until shutdown, then close the event source
async fn run(state: AppState, events: EventSource, addr: Arc<OnceLock<SocketAddr>>, port: u16) {
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Server failed to bind port {}: {}", port, e);
            events.emit_event(&Event::End {
                reason: e.to_string(),
            });
            events.close();
            return;
        }
    };
    let local = match listener.local_addr() {
        Ok(local) => local,
        Err(e) => {
            events.emit_event(&Event::End {
                reason: e.to_string(),
            });
            events.close();
            return;
        }
    };

    let _ = addr.set(local);
    if state.config.logging {
        info!("Server listening on {}", local);
    }
    events.emit_event(&Event::Listening { addr: local });

    let physics = tokio::spawn(physics::run(state.clone()));
    let mut shutdown_rx = state.shutdown.clone();
    let result = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(async move { shutdown_signal(&mut shutdown_rx).await })
        .await;
    physics.abort();

    let reason = match result {
        Ok(()) => "Server closed".to_string(),
        Err(e) => {
            warn!("Server error: {}", e);
            e.to_string()
        }
    };
    if state.config.logging {
        info!("Server shutdown complete");
    }
    events.emit_event(&Event::End { reason });
    events.close();
}

impl ServerInstance for Server {
    fn events(&self) -> &EventSource {
        Server::events(self)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Server::local_addr(self)
    }

    fn supports_feature(&self, feature: Feature) -> bool {
        Server::supports_feature(self, feature)
    }

    fn set_operator(&self, username: &str, op: bool) -> bool {
        Server::set_operator(self, username, op)
    }

    fn quit(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        Server::quit(self)
    }
}

/// Creates reference servers
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldServerFactory;

impl ServerFactory for WorldServerFactory {
    type Server = Server;

    fn create(&self, config: ServerConfig) -> Result<Server> {
        Server::create(config)
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
/// The `watch::Ref` is dropped before returning, so callers stay `Send`.
pub(crate) async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
