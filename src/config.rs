//! Configuration
//!
//! Two layers:
//! - [`ServerConfig`]: the settings template a server instance is created
//!   from. Scenarios never mutate it; [`ServerConfig::for_scenario`] derives
//!   a fresh value with the test overrides applied.
//! - [`HarnessSettings`]: harness knobs plus the base template, loaded with
//!   figment from defaults, an optional `worldsync.toml` and `WORLDSYNC_*`
//!   environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Seed used by every scenario so terrain-dependent checks are reproducible
pub const SCENARIO_SEED: u64 = 2116746182;

/// View distance used by every scenario
pub const SCENARIO_VIEW_DISTANCE: u32 = 2;

/// Default config file name looked up by [`HarnessSettings::load`]
pub const CONFIG_FILE: &str = "worldsync.toml";

/// Server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    /// Require authenticated sessions
    #[serde(rename = "online-mode")]
    pub auth_enabled: bool,
    /// Listening port, 0 for OS-assigned
    pub port: u16,
    /// Chunk radius streamed around a joining player
    pub view_distance: u32,
    /// Where world edits are persisted; `None` keeps the world in memory
    pub world_folder: Option<PathBuf>,
    /// Emit per-player activity logs
    pub logging: bool,
    /// Protocol version string, e.g. "1.12.2"
    pub version: String,
    pub generation: WorldGeneration,
    /// Every player starts as an operator
    pub everybody_op: bool,
    pub max_players: u32,
    pub motd: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_enabled: true,
            port: 25565,
            view_distance: 10,
            world_folder: Some(PathBuf::from("world")),
            logging: true,
            version: "1.12.2".to_string(),
            generation: WorldGeneration::default(),
            everybody_op: true,
            max_players: 10,
            motd: "A Minecraft server".to_string(),
        }
    }
}

impl ServerConfig {
    /// Derive the per-scenario configuration from a base template
    ///
    /// Auth off, ephemeral port, bounded view distance, in-memory world,
    /// logging off, explicit version and a fixed generation seed.
    pub fn for_scenario(base: &ServerConfig, version: &str) -> ServerConfig {
        ServerConfig {
            auth_enabled: false,
            port: 0,
            view_distance: SCENARIO_VIEW_DISTANCE,
            world_folder: None,
            logging: false,
            version: version.to_string(),
            generation: WorldGeneration {
                algorithm: GenerationAlgorithm::DiamondSquare,
                options: GenerationOptions {
                    seed: Some(SCENARIO_SEED),
                    ..base.generation.options.clone()
                },
            },
            ..base.clone()
        }
    }
}

/// World generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorldGeneration {
    #[serde(rename = "name")]
    pub algorithm: GenerationAlgorithm,
    pub options: GenerationOptions,
}

/// Terrain algorithms understood by the reference server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationAlgorithm {
    #[default]
    DiamondSquare,
    Superflat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GenerationOptions {
    /// `None` picks a random seed at startup
    pub seed: Option<u64>,
    /// Average surface height
    pub world_height: u8,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            seed: None,
            world_height: 64,
        }
    }
}

/// Harness settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HarnessSettings {
    /// Host clients connect to
    pub host: String,
    /// Wall-clock bound for block action scenarios, in seconds
    pub action_timeout_secs: u64,
    /// Wall-clock bound for command scenarios, in seconds
    pub command_timeout_secs: u64,
    /// Base server settings template
    pub server: ServerConfig,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            action_timeout_secs: 100,
            command_timeout_secs: 60,
            server: ServerConfig::default(),
        }
    }
}

impl HarnessSettings {
    /// Load from defaults, `worldsync.toml` and `WORLDSYNC_*` variables
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load with an explicit config file path; a missing file is skipped
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(HarnessSettings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("WORLDSYNC_").split("__"))
            .extract()?;
        Ok(settings)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
