//! Relay server listener
//!
//! Binds the HTTP listener, serves the relay routes and coordinates
//! shutdown: open sessions are told to close with 1001 and the server waits
//! up to `shutdown_timeout` for them to finish.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Result;
use crate::registry::{Broadcaster, RegistryConfig, RoleRegistry};
use crate::server::auth::CredentialStore;
use crate::server::config::ServerConfig;
use crate::server::handler::{router, RelayState};
use crate::session::Dispatcher;
use crate::stats::RelayStats;

/// Image relay server
pub struct RelayServer {
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a new server with the given configuration and credentials
    pub fn new<C: CredentialStore>(config: ServerConfig, credentials: C) -> Self {
        Self::with_registry_config(config, credentials, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config<C: CredentialStore>(
        config: ServerConfig,
        credentials: C,
        registry_config: RegistryConfig,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let stats = Arc::new(RelayStats::new());
        let registry = Arc::new(RoleRegistry::with_config(registry_config));
        let broadcaster = Broadcaster::new(config.send_timeout).with_stats(Arc::clone(&stats));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            broadcaster,
            Arc::clone(&stats),
        ));

        let state = RelayState {
            config,
            registry,
            dispatcher,
            credentials: Arc::new(credentials),
            stats,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };

        Self {
            state: Arc::new(state),
        }
    }

    /// Get a reference to the role registry
    pub fn registry(&self) -> &Arc<RoleRegistry> {
        &self.state.registry
    }

    /// Relay-wide counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.state.stats
    }

    /// Routes without a listener, for embedding in a larger app
    ///
    /// The embedding service must provide `ConnectInfo<SocketAddr>`.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.state.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let token = self.state.shutdown.clone();
        let signal = async move {
            tokio::select! {
                _ = shutdown => tracing::info!("Shutdown signal received"),
                _ = token.cancelled() => {}
            }
            token.cancel();
        };

        let app = self.router();
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        // Upgraded connections outlive the HTTP server
        self.state.shutdown.cancel();
        self.drain().await;

        result?;
        Ok(())
    }

    async fn drain(&self) {
        let tracker = &self.state.tracker;
        tracker.close();

        let open = tracker.len();
        if open > 0 {
            tracing::info!(sessions = open, "Waiting for sessions to close");
        }

        if tokio::time::timeout(self.state.config.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(sessions = tracker.len(), "Sessions still open after shutdown timeout");
        }

        let stats = self.state.stats.snapshot();
        tracing::info!(
            accepted = stats.connections_accepted,
            rejected = stats.connections_rejected,
            images = stats.images_received,
            "Relay server stopped"
        );
    }
}
