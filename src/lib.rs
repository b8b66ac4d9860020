//! worldsync - multi-actor event synchronization for block-world servers
//!
//! Drives a live server through several concurrent client connections and
//! checks order-sensitive, broadcast-style state changes. The harness core
//! is [`events`], [`harness`] and [`catalog`]; [`server`] and [`client`] are
//! a reference pair speaking JSON over WebSocket.

pub mod catalog;
pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod harness;
pub mod position;
pub mod protocol;
pub mod server;
pub mod world_data;

pub use catalog::{run_entry, CatalogEntry};
pub use client::{Client, WorldClientFactory};
pub use config::{HarnessSettings, ServerConfig};
pub use error::{HarnessError, Result};
pub use harness::{ScenarioContext, ScenarioRunner, Setup};
pub use server::{Server, WorldServerFactory};

/// Runner over the reference server and client
pub type WorldRunner = ScenarioRunner<WorldServerFactory, WorldClientFactory>;

/// Build a runner over the reference server and client
pub fn world_runner(settings: HarnessSettings) -> WorldRunner {
    ScenarioRunner::new(WorldServerFactory, WorldClientFactory, settings)
}
