//! Core server: accepts connections and runs one session task per peer.
//!
//! Owns the connection registry, the authenticator and the rate limiter.
//! Nothing here is global; everything a session needs is reached through
//! the shared [`SessionContext`].

use crate::config::ServerConfig;
use crate::handshake::Authenticator;
use crate::identity::IdentityVerifier;
use crate::rate_limit::AuthRateLimiter;
use crate::registry::ConnectionRegistry;
use crate::session::{run_session, SessionContext};
use crate::transport::websocket::{self, UpgradePolicy, WebSocketConnection};
use shuttler_core::ShuttlerResult;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// How often idle rate limiter entries are collected.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// The shuttler relay server.
pub struct RelayServer {
    config: ServerConfig,
    rate_limits: Arc<Mutex<AuthRateLimiter>>,
    sessions: Arc<SessionContext>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let rate_limits = Arc::new(Mutex::new(AuthRateLimiter::new(
            config.auth_max_failures,
            config.auth_window,
        )));
        let sessions = Arc::new(SessionContext {
            registry: Arc::new(ConnectionRegistry::new()),
            authenticator: Authenticator::new(verifier, rate_limits.clone()),
        });
        Self {
            config,
            rate_limits,
            sessions,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.sessions.registry
    }

    /// Bind the WebSocket listener.
    pub async fn listen(
        &self,
    ) -> ShuttlerResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
        let policy = UpgradePolicy {
            path: self.config.path.clone(),
            allow_cross_origin: self.config.allow_cross_origin,
        };
        websocket::start_listener(self.config.listen, policy).await
    }

    /// Bind and serve until the listener stops.
    pub async fn run(self) -> ShuttlerResult<()> {
        let server = Arc::new(self);
        let (addr, rx) = server.listen().await?;
        info!(
            addr = %addr,
            path = %server.config.path,
            identity = %server.config.identity_url,
            "shuttler-server ready"
        );
        server.serve(rx).await;
        Ok(())
    }

    /// Spawn a session for every accepted connection.
    pub async fn serve(self: Arc<Self>, mut connections: mpsc::Receiver<WebSocketConnection>) {
        let maintenance = self.clone();
        let maintenance_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                interval.tick().await;
                maintenance.rate_limits.lock().await.gc();
                debug!(connections = maintenance.registry().len(), "registry size");
            }
        });

        while let Some(conn) = connections.recv().await {
            let sessions = self.sessions.clone();
            tokio::spawn(async move {
                let remote = conn.remote_addr;
                debug!(remote = %remote, "handling WebSocket connection");
                if let Err(e) = run_session(conn.channel, Some(remote.ip()), &sessions).await {
                    warn!(remote = %remote, error = %e, "WebSocket session ended with error");
                }
            });
        }

        info!("listener closed, shutting down");
        maintenance_task.abort();
    }
}
