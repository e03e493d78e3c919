mod connection_pool_error;
mod connector;
mod pooled_connection;

pub use connection_pool_error::ConnectionError;
pub use connector::{Connector, RedirectingConnector, TcpConnector};
pub use pooled_connection::PooledConnection;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use tracing::instrument;

use crate::{
    deployment::Deployment, host_address::HostAddress, host_health_registry::HostHealthRegistry,
};

type IdleConnections<T> = HashMap<HostAddress, Vec<PooledConnection<T>>>;

/// Hands out connections to the hosts of one [`Deployment`].
///
/// Hosts marked down in the [`HostHealthRegistry`] fail fast with
/// [`ConnectionError::InjectedTimeout`], which callers treat like a real timeout. Hosts outside
/// the deployment are never connected to.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C: Connector> {
    connector: C,
    deployment: Deployment,
    health: HostHealthRegistry,
    idle: Mutex<IdleConnections<C::Connection>>,
    last_connection_id: AtomicU64,
    connect_timeout: Duration,
    max_idle_per_host: usize,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("deployment", &self.inner.deployment)
            .field("connect_timeout", &self.inner.connect_timeout)
            .field("max_idle_per_host", &self.inner.max_idle_per_host)
            .finish()
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(
        connector: C,
        deployment: Deployment,
        health: HostHealthRegistry,
        connect_timeout: Duration,
        max_idle_per_host: usize,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                connector,
                deployment,
                health,
                idle: Mutex::new(HashMap::new()),
                last_connection_id: AtomicU64::new(0),
                connect_timeout,
                max_idle_per_host,
            }),
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.inner.deployment
    }

    #[instrument(
        level = "debug",
        name = "Connection Pool - Acquire",
        skip(self, host),
        fields(%host)
    )]
    pub async fn acquire(
        &self,
        host: &HostAddress,
    ) -> Result<PooledConnection<C::Connection>, ConnectionError> {
        if self.inner.health.is_down(host) {
            let discarded = self.clear(host);
            tracing::debug!(discarded, "Host is marked down, failing acquisition");
            return Err(ConnectionError::InjectedTimeout(host.clone()));
        }

        if !self.inner.deployment.contains(host) {
            tracing::error!("Refusing to connect to a host outside the deployment");
            return Err(ConnectionError::UnknownHost(host.clone()));
        }

        let reusable = self.idle().get_mut(host).and_then(Vec::pop);
        if let Some(connection) = reusable {
            tracing::trace!(id = connection.id(), "Reusing idle connection");
            return Ok(connection);
        }

        let connection = tokio::time::timeout(
            self.inner.connect_timeout,
            self.inner.connector.connect(host),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(host.clone()))??;

        let id = self.inner.last_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(id, "Opened new connection");
        Ok(PooledConnection::new(id, host.clone(), connection))
    }

    /// Returns a connection for reuse. Connections to down hosts, and connections beyond the idle
    /// limit, are dropped.
    pub fn release(&self, connection: PooledConnection<C::Connection>) {
        if self.inner.health.is_down(connection.address()) {
            tracing::trace!(id = connection.id(), "Dropping connection to a down host");
            return;
        }

        let mut idle = self.idle();
        let for_host = idle.entry(connection.address().clone()).or_default();
        if for_host.len() < self.inner.max_idle_per_host {
            for_host.push(connection);
        }
    }

    /// Drops every idle connection to `host` and returns how many there were.
    pub fn clear(&self, host: &HostAddress) -> usize {
        self.idle().remove(host).map_or(0, |dropped| dropped.len())
    }

    pub fn idle_count(&self, host: &HostAddress) -> usize {
        self.idle().get(host).map_or(0, Vec::len)
    }

    // Idle lists hold whole connections, a panic elsewhere can't leave one half inserted.
    fn idle(&self) -> MutexGuard<'_, IdleConnections<C::Connection>> {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
