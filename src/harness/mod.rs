//! Scenario harness
//!
//! The runner and the catalog only talk to the server and clients through
//! the traits below, so any implementation that emits the same events can
//! be driven. [`crate::server`] and [`crate::client`] are the reference pair.

mod context;
mod runner;

use std::future::Future;
use std::net::SocketAddr;

pub use context::ScenarioContext;
pub use runner::{Preconditions, ScenarioRunner, Setup};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::events::EventSource;
use crate::position::{BlockPos, Vec3};
use crate::world_data::{Block, Experience, Feature, Item};

/// A server under test
///
/// Emits `Listening` once bound and `End` when it stops.
pub trait ServerInstance: Send + Sync + 'static {
    fn events(&self) -> &EventSource;

    /// Bound address, available from `Listening` on
    fn local_addr(&self) -> Option<SocketAddr>;

    fn supports_feature(&self, feature: Feature) -> bool;

    /// Grant or revoke operator rights for an online player
    fn set_operator(&self, username: &str, op: bool) -> bool;

    /// Shut down; idempotent
    fn quit(&self) -> impl Future<Output = Result<()>> + Send;
}

pub trait ServerFactory: Send + Sync {
    type Server: ServerInstance;

    fn create(&self, config: ServerConfig) -> Result<Self::Server>;
}

/// Where and as whom a client connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub version: String,
}

/// One protocol client, cheap to clone
///
/// Actions queue a packet and return; their effects arrive as events.
pub trait ClientConnection: Clone + Send + Sync + 'static {
    fn username(&self) -> &str;
    fn events(&self) -> &EventSource;

    fn is_logged_in(&self) -> bool;
    fn is_spawned(&self) -> bool;
    fn position(&self) -> Vec3;
    fn on_ground(&self) -> bool;
    /// Block in a loaded chunk column, `None` if the column is not loaded
    fn block_at(&self, pos: BlockPos) -> Option<Block>;
    fn inventory_slot(&self, slot: u16) -> Option<Item>;
    fn experience(&self) -> Experience;

    fn chat(&self, message: &str) -> Result<()>;
    fn dig(&self, block: &Block) -> Result<()>;
    /// Place the held item against `reference` on side `face`
    fn place_block(&self, reference: &Block, face: BlockPos) -> Result<()>;
    fn set_inventory_slot(&self, slot: u16, item: Option<Item>) -> Result<()>;
    /// Ask the server to stream terrain and spawn the player
    fn join_world(&self) -> Result<()>;

    /// Disconnect; idempotent
    fn quit(&self) -> impl Future<Output = Result<()>> + Send;
}

pub trait ClientFactory: Send + Sync {
    type Client: ClientConnection;

    /// Start connecting; login completes asynchronously
    fn connect(&self, options: ConnectOptions) -> Result<Self::Client>;
}
