use std::{collections::BTreeSet, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::instrument;

use crate::{
    handshake::HandshakeTransport, host_address::HostAddress,
    topology_description::TopologyDescription, topology_probe::TopologyProbe,
};

use super::{
    topology_monitor_actor::run_topology_monitor_actor, TopologyMonitorActor,
    TopologyMonitorError, TopologyMonitorMessage,
};

/**
A handle to the topology monitor actor.

Cloning the handle is cheap and every clone talks to the same actor. The actor stops once the last
handle is dropped.

Reads ([`current_primary`](Self::current_primary), [`members`](Self::members),
[`description`](Self::description)) never wait on a refresh: they return the last published
description, which is always complete.

```rust
# tokio_test::block_on(async {
use std::{sync::Arc, time::Duration};
use mongodb_topology::{
    events::EventBus, Deployment, HostAddress, MockCluster, TopologyMonitor, TopologyProbe,
};

let members = HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap();
let cluster = MockCluster::new(Deployment::new(vec![], members.clone(), vec![]));
let probe = TopologyProbe::new(
    Arc::new(cluster.clone()),
    cluster.health().clone(),
    EventBus::new(),
    Duration::from_secs(1),
);
let monitor = TopologyMonitor::new(probe, members.clone(), None);

monitor.refresh(members).await.unwrap();
assert_eq!(monitor.current_primary(), Some("a:1".parse().unwrap()));
# })
```
*/
#[derive(Clone, Debug)]
pub struct TopologyMonitor {
    sender: mpsc::Sender<TopologyMonitorMessage>,
    description: watch::Receiver<Arc<TopologyDescription>>,
}

impl TopologyMonitor {
    /// Spawns the monitor actor. Must be called from within a tokio runtime.
    ///
    /// `seeds` are the hosts refreshed by the heartbeat before any explicit refresh. A
    /// `heartbeat_interval` of `None` turns the heartbeat off.
    pub fn new<T: HandshakeTransport>(
        probe: TopologyProbe<T>,
        seeds: Vec<HostAddress>,
        heartbeat_interval: Option<Duration>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let (published, description) = watch::channel(Arc::new(TopologyDescription::default()));
        let actor = TopologyMonitorActor::new(receiver, published, probe, seeds, heartbeat_interval);

        tokio::spawn(run_topology_monitor_actor(actor));

        Self {
            sender,
            description,
        }
    }

    /// Probes `hosts` and publishes the resulting description.
    ///
    /// If a refresh over all of `hosts` is already running this waits for it and returns its
    /// result instead. Otherwise the request is probed by the refresh that follows.
    #[instrument(level = "debug", name = "Monitor Handle - Refresh", skip(self))]
    pub async fn refresh(
        &self,
        hosts: Vec<HostAddress>,
    ) -> Result<Arc<TopologyDescription>, TopologyMonitorError> {
        self.request_refresh(Some(hosts)).await
    }

    /// Probes every host the monitor knows about: seeds, hosts of earlier refreshes that
    /// completed and hosts reported by replica set members. Hosts found to be unknown are
    /// dropped.
    #[instrument(level = "debug", name = "Monitor Handle - Refresh Tracked", skip(self))]
    pub async fn refresh_tracked(&self) -> Result<Arc<TopologyDescription>, TopologyMonitorError> {
        self.request_refresh(None).await
    }

    async fn request_refresh(
        &self,
        hosts: Option<Vec<HostAddress>>,
    ) -> Result<Arc<TopologyDescription>, TopologyMonitorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TopologyMonitorMessage::Refresh {
                hosts,
                respond_to: Some(tx),
            })
            .await
            .map_err(|_| TopologyMonitorError::MonitorShutDown)?;

        tracing::trace!("Waiting for refresh to complete");
        rx.await.map_err(|_| TopologyMonitorError::MonitorShutDown)?
    }

    pub fn current_primary(&self) -> Option<HostAddress> {
        self.description.borrow().primary().cloned()
    }

    pub fn members(&self) -> BTreeSet<HostAddress> {
        self.description.borrow().members()
    }

    /// The last published description.
    pub fn description(&self) -> Arc<TopologyDescription> {
        Arc::clone(&self.description.borrow())
    }

    /// A receiver notified each time a new description is published.
    pub fn watch(&self) -> watch::Receiver<Arc<TopologyDescription>> {
        self.description.clone()
    }
}
