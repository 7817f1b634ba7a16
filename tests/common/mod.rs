//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use pulse::config::PulseConfig;
use pulse::http::{AppState, HttpServer};
use pulse::lifecycle::Shutdown;
use pulse::storage::{MemoryStore, Storage};
use tokio::net::TcpListener;

/// A Pulse server bound to an ephemeral local port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// Start a server with an in-memory store and a short stream tick.
pub async fn start_server() -> TestServer {
    let mut config = PulseConfig::default();
    config.stream.tick_ms = 50;
    config.observability.metrics_enabled = false;
    start_server_with(config).await
}

pub async fn start_server_with(config: PulseConfig) -> TestServer {
    let store = Arc::new(MemoryStore::new(config.query.limits()));
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, store.clone() as Arc<dyn Storage>, shutdown.clone());
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        store,
        state,
        shutdown,
    }
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
