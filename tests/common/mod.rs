//! Common test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use worldsync::config::ServerConfig;
use worldsync::events::EventSource;
use worldsync::harness::{ServerFactory, ServerInstance};
use worldsync::world_data::Feature;
use worldsync::{HarnessSettings, Result, Server};

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worldsync=warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Settings with the default template and tighter bounds
pub fn test_settings() -> HarnessSettings {
    HarnessSettings {
        action_timeout_secs: 30,
        command_timeout_secs: 20,
        ..HarnessSettings::default()
    }
}

pub const SHORT: Duration = Duration::from_secs(20);

/// Reference server that counts `quit` calls
pub struct CountingServer {
    inner: Server,
    quits: Arc<AtomicUsize>,
}

impl ServerInstance for CountingServer {
    fn events(&self) -> &EventSource {
        self.inner.events()
    }

    fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    fn supports_feature(&self, feature: Feature) -> bool {
        self.inner.supports_feature(feature)
    }

    fn set_operator(&self, username: &str, op: bool) -> bool {
        self.inner.set_operator(username, op)
    }

    fn quit(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        self.quits.fetch_add(1, Ordering::SeqCst);
        self.inner.quit()
    }
}

#[derive(Clone, Default)]
pub struct CountingFactory {
    pub quits: Arc<AtomicUsize>,
    pub created: Arc<AtomicUsize>,
    /// Forced listen port, ignoring the scenario's own
    pub port: Option<u16>,
}

impl CountingFactory {
    pub fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ServerFactory for CountingFactory {
    type Server = CountingServer;

    fn create(&self, mut config: ServerConfig) -> Result<CountingServer> {
        if let Some(port) = self.port {
            config.port = port;
        }
        let inner = Server::create(config)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CountingServer {
            inner,
            quits: self.quits.clone(),
        })
    }
}
