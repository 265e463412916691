//! Live-reloading development server for wd.
//!
//! Serves a mirror of a source directory over HTTP and pushes the path of
//! every changed file to connected browsers over a WebSocket:
//! - Static files from the mirror root (tower-http `ServeDir`)
//! - WebSocket reload endpoint, one session per browser tab
//! - Change watcher keeping the mirror in sync with the source
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use wd_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         source_dir: PathBuf::from("site"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! source dir ──notify──► ChangeWatcher ──re-mirror──► mirror dir ◄──ServeDir── Browser
//!                              │                                                  ▲
//!                              └──ChangeEvent──► ReloadDispatcher ──► session ──ws─┘
//! ```
//!
//! Shutdown flows the same way: cancelling stops the watcher, which closes
//! the change stream, which drains the dispatcher, which ends every session.

mod app;
mod error;
pub mod live_reload;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wd_mirror::{ChangeEvent, ChangeWatcher, ClientScriptOptions, Mirror, build_mirror};

pub use error::ServerError;
use live_reload::ReloadDispatcher;
use state::AppState;

/// Change events buffered between the watcher and the dispatcher.
const UPSTREAM_CAPACITY: usize = 100;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Directory to mirror and serve.
    pub source_dir: PathBuf,
    /// Path of the WebSocket reload endpoint.
    pub reload_path: String,
    /// Reload every page on every change.
    pub force_reload: bool,
    /// Generated client connects with `wss://`.
    pub tls: bool,
    /// Quiet period before a write is acted on.
    pub debounce: Duration,
    /// Client reconnection delay.
    pub retry_delay: Duration,
    /// Events buffered per client before it is disconnected.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
            source_dir: PathBuf::from("."),
            reload_path: "/delta-streamer-ws".to_owned(),
            force_reload: false,
            tls: false,
            debounce: wd_mirror::DEFAULT_DEBOUNCE,
            retry_delay: Duration::from_secs(1),
            outbox_capacity: 16,
        }
    }
}

/// A set-up server, ready to run.
pub struct LiveServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    watcher: ChangeWatcher,
    mirror: Arc<Mirror>,
    events: mpsc::Sender<ChangeEvent>,
    dispatcher: Arc<ReloadDispatcher>,
    reload_path: String,
    outbox_capacity: usize,
}

impl LiveServer {
    /// Bind the listener, build the mirror and wire up the pipeline.
    ///
    /// The listener is bound first so that the port baked into the client
    /// script is the one actually listened on.
    ///
    /// # Errors
    ///
    /// Returns an error if binding, watcher creation or mirroring fails.
    pub async fn setup(config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|source| ServerError::Bind {
                address: format!("{}:{}", config.host, config.port),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let mut watcher = ChangeWatcher::new(config.debounce)?;
        let script = ClientScriptOptions {
            port: local_addr.port(),
            reload_path: config.reload_path.clone(),
            force_reload: config.force_reload,
            tls: config.tls,
            retry_delay: config.retry_delay,
        };
        let mirror = Arc::new(build_mirror(&config.source_dir, &script, &mut watcher)?);

        let (events, upstream) = mpsc::channel(UPSTREAM_CAPACITY);
        let dispatcher = ReloadDispatcher::new(upstream);

        Ok(Self {
            listener,
            local_addr,
            watcher,
            mirror,
            events,
            dispatcher,
            reload_path: config.reload_path.clone(),
            outbox_capacity: config.outbox_capacity,
        })
    }

    /// Address the server listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Directory being served.
    pub fn mirror_root(&self) -> &Path {
        self.mirror.root()
    }

    /// Dispatcher fanning out change events.
    pub fn dispatcher(&self) -> &Arc<ReloadDispatcher> {
        &self.dispatcher
    }

    /// Serve until `cancel` fires or the watcher fails.
    ///
    /// A watcher failure cancels `cancel` so the HTTP side shuts down too,
    /// then is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher or the HTTP server fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let Self {
            listener,
            local_addr,
            watcher,
            mirror,
            events,
            dispatcher,
            reload_path,
            outbox_capacity,
        } = self;

        let state = Arc::new(AppState {
            dispatcher,
            outbox_capacity,
        });
        let app = app::create_router(state, mirror.root(), &reload_path);

        tracing::info!(address = %local_addr, reload_path = %reload_path, "Starting server");

        let serve = async {
            axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .await
                .map_err(ServerError::from)
        };
        let watch = async {
            let result = watcher
                .watch(Arc::clone(&mirror), events, cancel.clone())
                .await;
            if result.is_err() {
                cancel.cancel();
            }
            result.map_err(ServerError::from)
        };

        let (served, watched) = tokio::join!(serve, watch);
        watched?;
        served
    }
}

/// Run the server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if setup fails or the server stops abnormally.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let server = LiveServer::setup(&config).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    server.run(cancel).await
}

/// Cancel `cancel` on Ctrl-C.
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                return;
            }
            tracing::info!("Shutdown signal received, stopping server...");
            cancel.cancel();
        }
        () = cancel.cancelled() => {}
    }
}

/// Create server configuration from wd config.
#[must_use]
pub fn server_config_from_wd_config(config: &wd_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        source_dir: config.mirror_resolved.source_dir.clone(),
        reload_path: config.live_reload.path.clone(),
        force_reload: config.live_reload.force_reload,
        tls: config.live_reload.tls,
        debounce: Duration::from_millis(config.live_reload.debounce_ms),
        retry_delay: Duration::from_millis(config.live_reload.retry_ms),
        outbox_capacity: config.live_reload.outbox_capacity,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use wd_mirror::{RELOAD_MARKER, SCRIPT_FILENAME};

    use super::*;
    use crate::live_reload::DispatcherState;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config(source_dir: &Path) -> ServerConfig {
        ServerConfig {
            port: 0,
            source_dir: source_dir.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_server_config_from_wd_config() {
        let config = wd_config::Config::default();

        let server = server_config_from_wd_config(&config);

        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8080);
        assert_eq!(server.reload_path, "/delta-streamer-ws");
        assert_eq!(server.debounce, Duration::from_millis(100));
        assert_eq!(server.retry_delay, Duration::from_secs(1));
        assert_eq!(server.outbox_capacity, 16);
    }

    #[tokio::test]
    async fn test_setup_bakes_bound_port_into_script() {
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("index.html"), "<html><head></head></html>").unwrap();

        let server = LiveServer::setup(&test_config(source.path())).await.unwrap();

        let port = server.local_addr().port();
        assert_ne!(port, 0);
        let script = fs::read_to_string(server.mirror_root().join(SCRIPT_FILENAME)).unwrap();
        assert!(script.contains(&format!(":{port}$")));
        assert_eq!(server.dispatcher().state(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn test_setup_fails_for_missing_source() {
        let source = tempfile::tempdir().unwrap();

        let result = LiveServer::setup(&test_config(&source.path().join("missing"))).await;

        assert!(matches!(result, Err(ServerError::Mirror(_))));
    }

    #[tokio::test]
    async fn test_setup_fails_when_port_taken() {
        let source = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            port: taken.local_addr().unwrap().port(),
            ..test_config(source.path())
        };

        let result = LiveServer::setup(&config).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_run_serves_mirror_and_stops_on_cancel() {
        let source = tempfile::tempdir().unwrap();
        fs::write(
            source.path().join("index.html"),
            "<html><head><title>t</title></head><body></body></html>",
        )
        .unwrap();
        let server = LiveServer::setup(&test_config(source.path())).await.unwrap();
        let addr = server.local_addr();
        let cancel = CancellationToken::new();
        let running = tokio::spawn(server.run(cancel.clone()));

        let response = timeout(WAIT, http_get(addr, "/index.html")).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(RELOAD_MARKER));

        let script = timeout(WAIT, http_get(addr, &format!("/{SCRIPT_FILENAME}")))
            .await
            .unwrap();
        assert!(script.starts_with("HTTP/1.1 200"));
        assert!(script.contains("new WebSocket"));

        cancel.cancel();
        timeout(WAIT, running).await.unwrap().unwrap().unwrap();
    }
}
