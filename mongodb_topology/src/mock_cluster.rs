//! An in-memory deployment for tests and demos.
//!
//! [`MockCluster`] answers handshakes the way real servers would for the roles it was configured
//! with, hands out fake connections and replies to scripted commands. Failover and outages are
//! scripted with [`set_primary`](MockCluster::set_primary) and
//! [`kill_host`](MockCluster::kill_host).

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::bail;
use serde_json::json;

use crate::{
    client::{Client, ClientBuilder, ClientError},
    client_options::ClientOptions,
    command_executor::CommandTransport,
    connection_pool::{Connector, PooledConnection},
    deployment::{ConfiguredRole, Deployment},
    events::command_name_of,
    handshake::{HandshakeError, HandshakeReply, HandshakeTransport, ROUTER_MARKER},
    host_address::HostAddress,
    host_health_registry::HostHealthRegistry,
    Document,
};

/// A client backed entirely by a [`MockCluster`].
pub type MockClient = Client<MockCluster, MockCluster>;

const MOCK_ROUND_TRIP: Duration = Duration::from_millis(10);
const COMMAND_NOT_FOUND_CODE: i64 = 59;

/// A fake connection. Only remembers which host it was opened for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockConnection {
    host: HostAddress,
}

impl MockConnection {
    pub fn host(&self) -> &HostAddress {
        &self.host
    }
}

#[derive(Clone, Debug)]
pub struct MockCluster {
    deployment: Arc<Deployment>,
    health: HostHealthRegistry,
    primary: Arc<RwLock<Option<HostAddress>>>,
    replies: Arc<RwLock<HashMap<String, Document>>>,
    round_trip: Duration,
}

impl MockCluster {
    /// The first configured member starts out as primary.
    pub fn new(deployment: Deployment) -> Self {
        let primary = deployment.members().first().cloned();
        Self {
            deployment: Arc::new(deployment),
            health: HostHealthRegistry::new(),
            primary: Arc::new(RwLock::new(primary)),
            replies: Arc::new(RwLock::new(HashMap::new())),
            round_trip: MOCK_ROUND_TRIP,
        }
    }

    /// Round trip reported for every handshake. Defaults to 10ms.
    pub fn with_round_trip(mut self, round_trip: Duration) -> Self {
        self.round_trip = round_trip;
        self
    }

    /// The registry used for fault injection. Share it with the probe and the pool so they see
    /// the same outages.
    pub fn health(&self) -> &HostHealthRegistry {
        &self.health
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// A [`ClientBuilder`] preloaded with this cluster's hosts, set name and health registry.
    pub fn client_builder(&self) -> ClientBuilder {
        let names = |hosts: &[HostAddress]| {
            hosts.iter().map(ToString::to_string).collect::<Vec<_>>()
        };
        ClientBuilder::new()
            .set_standalones(&names(self.deployment.standalones()))
            .set_members(&names(self.deployment.members()))
            .set_routers(&names(self.deployment.routers()))
            .set_set_name(self.deployment.set_name())
            .set_health_registry(self.health.clone())
    }

    /// Builds a client whose handshakes, connections and commands are all served by this cluster.
    pub fn client(&self, options: ClientOptions) -> Result<MockClient, ClientError> {
        self.client_builder().set_options(options).build(
            Arc::new(self.clone()),
            self.clone(),
            Arc::new(self.clone()),
        )
    }

    pub fn kill_host(&self, host: &HostAddress) {
        self.health.kill_host(host)
    }

    pub fn revive_host(&self, host: &HostAddress) {
        self.health.revive_host(host)
    }

    /// Makes `host` the primary. Fails unless `host` is a configured member.
    pub fn set_primary(&self, host: &HostAddress) -> anyhow::Result<()> {
        if self.deployment.role_of(host) != Some(ConfiguredRole::Member) {
            bail!("{} is not a replica set member", host);
        }
        tracing::info!(%host, "Primary moved");
        *self.primary.write().unwrap_or_else(|p| p.into_inner()) = Some(host.clone());
        Ok(())
    }

    /// Leaves the replica set without a primary, as during an election.
    pub fn clear_primary(&self) {
        tracing::info!("Primary cleared");
        *self.primary.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn primary(&self) -> Option<HostAddress> {
        self.primary
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replies with `reply` to every command named `command_name`.
    pub fn script_reply(&self, command_name: impl Into<String>, reply: Document) {
        self.replies
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(command_name.into(), reply);
    }

    /// The handshake reply `host` would send, ignoring whether it is down.
    pub fn is_master(&self, host: &HostAddress) -> Result<Document, HandshakeError> {
        match self.deployment.role_of(host) {
            Some(ConfiguredRole::Standalone) => Ok(json!({"ismaster": true, "ok": 1})),
            Some(ConfiguredRole::Router) => {
                Ok(json!({"ismaster": true, "msg": ROUTER_MARKER, "ok": 1}))
            }
            Some(ConfiguredRole::Member) => {
                let primary = self.primary();
                let is_primary = primary.as_ref() == Some(host);
                let hosts = self
                    .deployment
                    .members()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                let mut reply = json!({
                    "ismaster": is_primary,
                    "secondary": !is_primary,
                    "setName": self.deployment.set_name(),
                    "hosts": hosts,
                    "ok": 1,
                });
                if let (Some(primary), Some(fields)) = (primary, reply.as_object_mut()) {
                    fields.insert("primary".to_string(), json!(primary.to_string()));
                }
                Ok(reply)
            }
            None => Err(HandshakeError::UnknownHost(host.clone())),
        }
    }

    fn reply_to(&self, host: &HostAddress, command: &Document) -> anyhow::Result<Document> {
        let command_name = match command_name_of(command) {
            Some(name) => name,
            None => bail!("Command document has no command name"),
        };

        if let Some(reply) = self
            .replies
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(command_name)
        {
            return Ok(reply.clone());
        }

        match command_name {
            "ismaster" | "isMaster" | "hello" => Ok(self.is_master(host)?),
            "ping" => Ok(json!({"ok": 1})),
            _ => Ok(json!({
                "ok": 0,
                "errmsg": format!("no such command: '{}'", command_name),
                "code": COMMAND_NOT_FOUND_CODE,
            })),
        }
    }
}

impl HandshakeTransport for MockCluster {
    async fn handshake(
        &self,
        host: &HostAddress,
        _database: &str,
        _command: &Document,
    ) -> Result<HandshakeReply, HandshakeError> {
        let document = self.is_master(host)?;
        if self.health.is_down(host) {
            return Err(HandshakeError::Timeout(host.clone()));
        }
        Ok(HandshakeReply {
            document,
            round_trip: Some(self.round_trip),
        })
    }
}

impl Connector for MockCluster {
    type Connection = MockConnection;

    async fn connect(&self, host: &HostAddress) -> anyhow::Result<MockConnection> {
        if !self.deployment.contains(host) {
            bail!("{} is not part of the mock deployment", host);
        }
        if self.health.is_down(host) {
            bail!("connection refused by {}", host);
        }
        Ok(MockConnection { host: host.clone() })
    }
}

impl CommandTransport<MockConnection> for MockCluster {
    async fn send_command(
        &self,
        connection: &mut PooledConnection<MockConnection>,
        _database: &str,
        command: &Document,
    ) -> anyhow::Result<Document> {
        let host = connection.address();
        if self.health.is_down(host) {
            bail!("connection reset by {}", host);
        }
        self.reply_to(host, command)
    }
}
