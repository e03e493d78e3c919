use std::{collections::BTreeSet, sync::Arc};

use tracing::instrument;

use crate::{
    command_executor::{CommandError, CommandExecutor, CommandTransport},
    connection_pool::{ConnectionPool, Connector},
    deployment::Deployment,
    events::EventBus,
    host_address::HostAddress,
    host_health_registry::HostHealthRegistry,
    topology_description::{ReadPreference, TopologyDescription},
    topology_monitor::TopologyMonitor,
    ClientError, Document,
};

/**
The application root: one health registry, one event bus, one topology monitor and one connection
pool for a deployment.

Cloning the client is cheap and every clone shares the same components. Build one with a
[`ClientBuilder`](crate::ClientBuilder) and hand clones to whatever needs to talk to the deployment.

```rust
# tokio_test::block_on(async {
use serde_json::json;
use mongodb_topology::{ClientOptions, Deployment, HostAddress, MockCluster, ReadPreference};

let members = HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap();
let cluster = MockCluster::new(Deployment::new(vec![], members, vec![]));
let client = cluster.client(ClientOptions::default_for_testing()).unwrap();

client.refresh().await.unwrap();
let reply = client
    .run_command_on(ReadPreference::Primary, "admin", json!({"ping": 1}))
    .await
    .unwrap();
assert_eq!(reply, json!({"ok": 1}));
# })
```
*/
pub struct Client<C: Connector, T> {
    deployment: Arc<Deployment>,
    health: HostHealthRegistry,
    bus: EventBus,
    monitor: TopologyMonitor,
    executor: CommandExecutor<C, T>,
}

impl<C: Connector, T> Clone for Client<C, T> {
    fn clone(&self) -> Self {
        Self {
            deployment: Arc::clone(&self.deployment),
            health: self.health.clone(),
            bus: self.bus.clone(),
            monitor: self.monitor.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<C: Connector, T> std::fmt::Debug for Client<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("deployment", &self.deployment)
            .field("health", &self.health)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl<C, T> Client<C, T>
where
    C: Connector,
    T: CommandTransport<C::Connection>,
{
    // Only the builder creates clients.
    pub(crate) fn new(
        deployment: Deployment,
        health: HostHealthRegistry,
        bus: EventBus,
        monitor: TopologyMonitor,
        executor: CommandExecutor<C, T>,
    ) -> Self {
        Self {
            deployment: Arc::new(deployment),
            health,
            bus,
            monitor,
            executor,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn health(&self) -> &HostHealthRegistry {
        &self.health
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn monitor(&self) -> &TopologyMonitor {
        &self.monitor
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        self.executor.pool()
    }

    /// Fault injection: the host stops answering probes and connections until revived.
    pub fn kill_host(&self, host: &HostAddress) {
        self.health.kill_host(host);
    }

    pub fn revive_host(&self, host: &HostAddress) {
        self.health.revive_host(host);
    }

    /// Probes every configured host and publishes the result.
    #[instrument(level = "debug", name = "Client - Refresh", skip(self))]
    pub async fn refresh(&self) -> Result<Arc<TopologyDescription>, ClientError> {
        Ok(self.monitor.refresh(self.deployment.all_hosts()).await?)
    }

    pub fn current_primary(&self) -> Option<HostAddress> {
        self.monitor.current_primary()
    }

    pub fn members(&self) -> BTreeSet<HostAddress> {
        self.monitor.members()
    }

    /// Picks a server from the last published description.
    pub fn select_server(&self, read_preference: ReadPreference) -> Option<HostAddress> {
        self.monitor.description().select_server(read_preference)
    }

    pub async fn run_command(
        &self,
        host: &HostAddress,
        database: &str,
        command: Document,
    ) -> Result<Document, CommandError> {
        self.executor.run_command(host, database, command).await
    }

    /// Runs `command` on a server chosen by `read_preference`.
    #[instrument(level = "debug", name = "Client - Run Command On", skip(self, command))]
    pub async fn run_command_on(
        &self,
        read_preference: ReadPreference,
        database: &str,
        command: Document,
    ) -> Result<Document, ClientError> {
        let host = self.select_server(read_preference).ok_or_else(|| {
            tracing::warn!("No server available in the current topology");
            ClientError::NoSuitableServer(read_preference)
        })?;
        tracing::debug!(%host, "Server selected");
        Ok(self.executor.run_command(&host, database, command).await?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use serde_json::json;

    use super::*;
    use crate::{
        connection_pool::ConnectionError, events::CommandEventRecorder, ClientOptions,
        MockClient, MockCluster,
    };

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    fn setup() -> (MockCluster, MockClient) {
        let cluster = MockCluster::new(Deployment::new(
            vec![],
            HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap(),
            vec![],
        ));
        let client = cluster
            .client(ClientOptions::default_for_testing())
            .unwrap();
        (cluster, client)
    }

    #[tokio::test]
    async fn refresh_probes_every_configured_host() {
        let (_cluster, client) = setup();

        let description = client.refresh().await.unwrap();

        assert_eq!(description.members().len(), 3);
        assert_eq!(client.current_primary(), Some(addr("a:1")));
    }

    #[tokio::test]
    async fn run_command_on_primary_follows_failover() {
        // Arrange
        let (cluster, client) = setup();
        let recorder = CommandEventRecorder::new();
        client.event_bus().subscribe(Arc::new(recorder.clone()));
        client.refresh().await.unwrap();

        // Act
        cluster.set_primary(&addr("c:3")).unwrap();
        client.refresh().await.unwrap();
        recorder.take();
        client
            .run_command_on(ReadPreference::Primary, "admin", json!({"ping": 1}))
            .await
            .unwrap();

        // Assert
        let started = recorder.started_events();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].connection_address, addr("c:3"));
    }

    #[tokio::test]
    async fn run_command_on_without_topology_is_NoSuitableServer() {
        let (_cluster, client) = setup();

        let result = client
            .run_command_on(ReadPreference::Secondary, "admin", json!({"ping": 1}))
            .await;

        assert!(matches!(
            result,
            Err(ClientError::NoSuitableServer(ReadPreference::Secondary))
        ));
    }

    #[tokio::test]
    async fn killed_host_fails_fast_and_leaves_the_topology() {
        let (_cluster, client) = setup();
        client.kill_host(&addr("b:2"));

        let description = client.refresh().await.unwrap();
        let result = client
            .run_command(&addr("b:2"), "admin", json!({"ping": 1}))
            .await;

        assert!(!description.contains(&addr("b:2")));
        assert!(matches!(
            result,
            Err(CommandError::Connection(ConnectionError::InjectedTimeout(_)))
        ));

        client.revive_host(&addr("b:2"));
        assert!(client
            .run_command(&addr("b:2"), "admin", json!({"ping": 1}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_same_components() {
        let (_cluster, client) = setup();
        let clone = client.clone();

        client.refresh().await.unwrap();

        assert_eq!(clone.current_primary(), Some(addr("a:1")));
        clone.kill_host(&addr("a:1"));
        assert!(client.health().is_down(&addr("a:1")));
    }
}
