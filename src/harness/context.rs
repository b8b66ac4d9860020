use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::{HarnessError, Result};
use crate::world_data::{Feature, VersionData};

use super::{ClientConnection, ServerInstance};

/// Everything a scenario body can reach
pub struct ScenarioContext<S, C> {
    server: Arc<S>,
    clients: Vec<C>,
    config: ServerConfig,
    data: VersionData,
}

impl<S: ServerInstance, C: ClientConnection> ScenarioContext<S, C> {
    pub(crate) fn new(
        server: Arc<S>,
        clients: Vec<C>,
        config: ServerConfig,
        data: VersionData,
    ) -> Self {
        Self {
            server,
            clients,
            config,
            data,
        }
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Actor by position in the setup's username list
    pub fn actor(&self, index: usize) -> Result<&C> {
        self.clients.get(index).ok_or_else(|| {
            HarnessError::SetupFailure(format!(
                "scenario needs actor {} but only {} connected",
                index,
                self.clients.len()
            ))
        })
    }

    pub fn actors(&self) -> &[C] {
        &self.clients
    }

    /// The configuration the server was created with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// World-data tables for the scenario's protocol version
    pub fn data(&self) -> &VersionData {
        &self.data
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        self.server.supports_feature(feature)
    }
}
