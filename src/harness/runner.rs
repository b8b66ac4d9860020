//! Scenario lifecycle
//!
//! configured -> server listening -> clients logged in -> preconditions met
//! -> body -> teardown. Teardown runs exactly once whatever ends the run:
//! success, error, panic or timeout.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{ClientConnection, ClientFactory, ConnectOptions, ScenarioContext, ServerFactory, ServerInstance};
use crate::config::{HarnessSettings, ServerConfig};
use crate::error::{HarnessError, Result};
use crate::events::{
    once, spawn_zone_chunks, wait_count, wait_messages, wait_state, EventKind, Wait,
};
use crate::world_data::VersionData;

/// Conditions awaited before the body runs, by actor index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// Every spawn-zone chunk column has loaded
    pub spawn_zone: &'static [usize],
    /// Gravity has settled the actor on the ground
    pub on_ground: &'static [usize],
    /// The actor saw every "<name> joined the game." line exactly once
    pub join_messages: &'static [usize],
}

impl Preconditions {
    pub const NONE: Preconditions = Preconditions {
        spawn_zone: &[],
        on_ground: &[],
        join_messages: &[],
    };
}

/// What a scenario needs before its body runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setup {
    pub usernames: Vec<String>,
    pub preconditions: Preconditions,
    /// Bound on everything from server start to the end of the body
    pub timeout: Duration,
}

impl Setup {
    pub fn new<I, S>(usernames: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            usernames: usernames.into_iter().map(Into::into).collect(),
            preconditions: Preconditions::NONE,
            timeout,
        }
    }

    pub fn with_preconditions(mut self, preconditions: Preconditions) -> Self {
        self.preconditions = preconditions;
        self
    }
}

/// Runs scenarios against servers and clients from the given factories
pub struct ScenarioRunner<SF, CF> {
    server_factory: SF,
    client_factory: CF,
    settings: HarnessSettings,
}

impl<SF, CF> ScenarioRunner<SF, CF>
where
    SF: ServerFactory,
    CF: ClientFactory,
{
    pub fn new(server_factory: SF, client_factory: CF, settings: HarnessSettings) -> Self {
        Self {
            server_factory,
            client_factory,
            settings,
        }
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Run one scenario body against a fresh server for `version`
    ///
    /// Setup failures surface as `SetupFailure`, an expired bound as
    /// `Timeout`. A panicking body is resumed after teardown.
    pub async fn run<F, Fut>(&self, setup: &Setup, version: &str, body: F) -> Result<()>
    where
        F: FnOnce(ScenarioContext<SF::Server, CF::Client>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let data = VersionData::for_version(version).ok_or_else(|| {
            HarnessError::SetupFailure(format!("unsupported version {}", version))
        })?;
        let config = ServerConfig::for_scenario(&self.settings.server, version);
        let server = Arc::new(
            self.server_factory
                .create(config.clone())
                .map_err(|e| e.into_setup_failure("create server"))?,
        );
        let clients: Mutex<Vec<CF::Client>> = Mutex::new(Vec::new());

        let staged = async {
            self.start(setup, &config, &server, &clients).await?;
            let actors = clients.lock().clone();
            body(ScenarioContext::new(server.clone(), actors, config.clone(), data)).await
        };
        let outcome = tokio::time::timeout(setup.timeout, AssertUnwindSafe(staged).catch_unwind()).await;

        // Teardown: clients first, then the server, once
        let connected = std::mem::take(&mut *clients.lock());
        for client in &connected {
            if let Err(e) = client.quit().await {
                warn!("Client {} did not quit cleanly: {}", client.username(), e);
            }
        }
        let quit = server.quit().await;
        debug!("Scenario teardown complete");

        match outcome {
            Err(_) => {
                if let Err(e) = quit {
                    warn!("Server did not quit cleanly: {}", e);
                }
                Err(HarnessError::Timeout(setup.timeout))
            }
            Ok(Err(panic)) => std::panic::resume_unwind(panic),
            Ok(Ok(Err(e))) => {
                if let Err(quit) = quit {
                    warn!("Server did not quit cleanly: {}", quit);
                }
                Err(e)
            }
            Ok(Ok(Ok(()))) => quit,
        }
    }

    /// Bring the server and every actor to the point the body can run
    async fn start(
        &self,
        setup: &Setup,
        config: &ServerConfig,
        server: &Arc<SF::Server>,
        clients: &Mutex<Vec<CF::Client>>,
    ) -> Result<()> {
        let probe = server.clone();
        wait_state(server.events(), EventKind::Listening, move || {
            probe.local_addr().is_some()
        })
        .await
        .map_err(|e| e.into_setup_failure("server start"))?;
        let addr = server
            .local_addr()
            .ok_or_else(|| HarnessError::SetupFailure("server has no address".to_string()))?;
        info!("Server listening on {}", addr);

        for username in &setup.usernames {
            let client = self
                .client_factory
                .connect(ConnectOptions {
                    host: self.settings.host.clone(),
                    port: addr.port(),
                    username: username.clone(),
                    version: config.version.clone(),
                })
                .map_err(|e| e.into_setup_failure("connect"))?;
            clients.lock().push(client);
        }
        let actors = clients.lock().clone();

        let logins = actors.iter().map(|client| {
            let probe = client.clone();
            wait_state(client.events(), EventKind::Login, move || probe.is_logged_in())
        });
        try_join_all(logins)
            .await
            .map_err(|e| e.into_setup_failure("login"))?;

        // Register everything before any actor enters the world
        let spawns: Vec<Wait<()>> = actors
            .iter()
            .map(|client| once(client.events(), EventKind::Spawn))
            .collect();
        let preconditions = register_preconditions(setup, config, &actors)?;

        for client in &actors {
            client
                .join_world()
                .map_err(|e| e.into_setup_failure("join world"))?;
        }
        try_join_all(spawns)
            .await
            .map_err(|e| e.into_setup_failure("spawn"))?;
        try_join_all(preconditions)
            .await
            .map_err(|e| e.into_setup_failure("preconditions"))?;
        debug!("{} actors ready", actors.len());
        Ok(())
    }
}

fn register_preconditions<C: ClientConnection>(
    setup: &Setup,
    config: &ServerConfig,
    actors: &[C],
) -> Result<Vec<Wait<()>>> {
    let actor = |index: usize| {
        actors.get(index).ok_or_else(|| {
            HarnessError::SetupFailure(format!("precondition names missing actor {}", index))
        })
    };
    let mut waits = Vec::new();

    for &index in setup.preconditions.spawn_zone {
        let client = actor(index)?;
        waits.push(wait_count(
            client.events(),
            EventKind::ChunkColumnLoad,
            spawn_zone_chunks(config.view_distance),
        ));
    }
    for &index in setup.preconditions.on_ground {
        let client = actor(index)?;
        let probe = client.clone();
        waits.push(wait_state(client.events(), EventKind::Move, move || {
            probe.is_spawned() && probe.on_ground()
        }));
    }
    for &index in setup.preconditions.join_messages {
        let client = actor(index)?;
        let expected = setup
            .usernames
            .iter()
            .map(|name| format!("{} joined the game.", name));
        waits.push(wait_messages(client.events(), expected));
    }
    Ok(waits)
}
