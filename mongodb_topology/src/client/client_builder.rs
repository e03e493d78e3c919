use std::sync::Arc;

use tracing::instrument;

use crate::{
    client_options::ClientOptions,
    command_executor::{CommandExecutor, CommandTransport},
    connection_pool::{ConnectionPool, Connector},
    deployment::Deployment,
    events::EventBus,
    handshake::HandshakeTransport,
    host_address::HostAddress,
    host_health_registry::HostHealthRegistry,
    topology_monitor::TopologyMonitor,
    topology_probe::TopologyProbe,
    Client, ClientError,
};

#[derive(Debug, Default)]
pub struct ClientBuilder {
    standalones: Vec<String>,
    members: Vec<String>,
    routers: Vec<String>,
    set_name: Option<String>,
    event_bus: Option<EventBus>,
    health: Option<HostHealthRegistry>,
    options: ClientOptions,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_standalones<T>(mut self, hosts: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        for h in hosts {
            self.standalones.push(h.as_ref().to_string());
        }
        self
    }

    pub fn set_members<T>(mut self, hosts: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        for h in hosts {
            self.members.push(h.as_ref().to_string());
        }
        self
    }

    pub fn set_routers<T>(mut self, hosts: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        for h in hosts {
            self.routers.push(h.as_ref().to_string());
        }
        self
    }

    pub fn set_set_name(mut self, set_name: &str) -> Self {
        self.set_name = Some(set_name.to_string());
        self
    }

    /// Share an existing bus instead of creating a new one.
    pub fn set_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Share an existing registry, e.g. one a test harness injects faults into.
    pub fn set_health_registry(mut self, health: HostHealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn set_options(mut self, options: ClientOptions) -> Self {
        tracing::trace!("Setting client options: {:?}", &options);
        self.options = options;
        self
    }

    /// Validates the configured hosts, spawns the topology monitor and returns the client.
    ///
    /// Must be called from within a tokio runtime. The builder can be reused as a template; each
    /// call creates a new monitor, pool and, unless one was set, a new event bus.
    #[instrument(level = "debug", name = "Build Client", skip_all)]
    pub fn build<H, C, T>(
        &self,
        handshake: Arc<H>,
        connector: C,
        transport: Arc<T>,
    ) -> Result<Client<C, T>, ClientError>
    where
        H: HandshakeTransport,
        C: Connector,
        T: CommandTransport<C::Connection>,
    {
        let deployment = self.validate_deployment()?;
        tracing::debug!(hosts = deployment.all_hosts().len(), "Deployment validated");

        let health = self.health.clone().unwrap_or_default();
        let bus = self.event_bus.clone().unwrap_or_default();

        let probe = TopologyProbe::new(
            handshake,
            health.clone(),
            bus.clone(),
            self.options.probe_timeout(),
        );
        let monitor = TopologyMonitor::new(
            probe,
            deployment.all_hosts(),
            self.options.heartbeat_interval(),
        );

        let pool = ConnectionPool::new(
            connector,
            deployment.clone(),
            health.clone(),
            self.options.connect_timeout(),
            self.options.max_idle_per_host(),
        );
        let executor = CommandExecutor::new(pool, transport, bus.clone());

        Ok(Client::new(deployment, health, bus, monitor, executor))
    }

    fn validate_deployment(&self) -> Result<Deployment, ClientError> {
        if self.standalones.is_empty() && self.members.is_empty() && self.routers.is_empty() {
            tracing::error!("No hosts were supplied and a client can't exist without at least one");
            return Err(ClientError::MissingHostsError);
        }

        let parse = |hosts: &[String]| {
            HostAddress::parse_all(hosts).map_err(|e| {
                tracing::error!("{}", e);
                e
            })
        };

        let deployment = Deployment::new(
            parse(self.standalones.as_slice())?,
            parse(self.members.as_slice())?,
            parse(self.routers.as_slice())?,
        );
        Ok(match &self.set_name {
            Some(set_name) => deployment.with_set_name(set_name.as_str()),
            None => deployment,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::MockCluster;

    fn build(builder: &ClientBuilder) -> Result<(), ClientError> {
        let cluster = MockCluster::new(Deployment::default());
        builder
            .build(Arc::new(cluster.clone()), cluster.clone(), Arc::new(cluster))
            .map(|_| ())
    }

    #[tokio::test]
    async fn build_without_hosts_is_MissingHostsError() {
        let result = build(&ClientBuilder::new().set_set_name("rs"));

        assert!(matches!(result, Err(ClientError::MissingHostsError)));
    }

    #[tokio::test]
    async fn build_with_bad_host_is_InvalidHost() {
        let result = build(&ClientBuilder::new().set_members(&["a:1", "b:notaport"]));

        assert!(matches!(result, Err(ClientError::InvalidHost(ref e)) if e.0 == "b:notaport"));
    }

    #[test]
    fn validate_keeps_roles_and_set_name() {
        let builder = ClientBuilder::new()
            .set_standalones(&["s:1"])
            .set_members(&["a:1", "b:2"])
            .set_routers(&["m:1"])
            .set_set_name("prod");

        let deployment = builder.validate_deployment().unwrap();

        assert_eq!(deployment.standalones().len(), 1);
        assert_eq!(deployment.members().len(), 2);
        assert_eq!(deployment.routers().len(), 1);
        assert_eq!(deployment.set_name(), "prod");
    }

    #[tokio::test]
    async fn builder_can_be_reused_as_a_template() {
        let builder = ClientBuilder::new()
            .set_members(&["a:1"])
            .set_options(ClientOptions::default_for_testing());

        assert!(build(&builder).is_ok());
        assert!(build(&builder).is_ok());
    }
}
