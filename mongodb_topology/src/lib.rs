/*!
mongodb_topology keeps track of which servers of a MongoDB style deployment are up and which one
is the replica set primary, and reports every command sent to those servers to interested
subscribers.

The pieces fit together like this:

* A [`TopologyProbe`] sends the `ismaster` handshake to one host and classifies it as a
  standalone, a replica set member or a router.
* A [`TopologyMonitor`] actor probes every host in parallel, on demand and on a heartbeat, and
  publishes an immutable [`TopologyDescription`] readers can grab at any time.
* A [`ConnectionPool`] hands out connections tagged with the logical address that was asked for,
  and fails fast for hosts marked down in the [`HostHealthRegistry`].
* An [`EventBus`](events::EventBus) delivers a started event and exactly one succeeded or failed
  event for every command, including the handshakes themselves.

The [`Client`] owns one of each. [`MockCluster`] provides a scripted in-memory deployment with
fault injection for tests.

This library requires tokio. The monitor runs as a background task for as long as a handle to it
is alive.

# Example
```rust
# tokio_test::block_on(async {
use mongodb_topology::{ClientOptions, Deployment, HostAddress, MockCluster};

let members = HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap();
let cluster = MockCluster::new(Deployment::new(vec![], members, vec![]));
let client = cluster.client(ClientOptions::default_for_testing()).unwrap();

client.refresh().await.unwrap();
assert_eq!(client.current_primary(), Some("a:1".parse().unwrap()));

// The primary goes away. A secondary is not promoted until the set elects one.
client.kill_host(&"a:1".parse().unwrap());
client.refresh().await.unwrap();
assert_eq!(client.current_primary(), None);
assert_eq!(client.members().len(), 2);
# })
```
*/

mod client;
mod client_options;
mod command_executor;
mod connection_pool;
mod deployment;
mod host_address;
mod host_health_registry;
mod mock_cluster;
mod probe_result;
mod topology_description;
mod topology_monitor;
mod topology_probe;

pub mod events;
pub mod handshake;

pub use client::*;
pub use client_options::ClientOptions;
pub use command_executor::{CommandError, CommandExecutor, CommandTransport};
pub use connection_pool::*;
pub use deployment::{ConfiguredRole, Deployment, DEFAULT_SET_NAME};
pub use host_address::{HostAddress, InvalidHostAddress, DEFAULT_PORT};
pub use host_health_registry::HostHealthRegistry;
pub use mock_cluster::{MockClient, MockCluster, MockConnection};
pub use probe_result::{ProbeResult, TopologyRole};
pub use topology_description::{ReadPreference, TopologyDescription};
pub use topology_monitor::{TopologyMonitor, TopologyMonitorError};
pub use topology_probe::{ProbeError, TopologyProbe};

/// Command documents and replies. Field order is preserved, so the first key is the command name.
pub type Document = serde_json::Value;

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_chain_fmt_walks_every_cause() {
        let error = ClientError::Topology(TopologyMonitorError::Probe(ProbeError::UnknownHost(
            HostAddress::new("z", 9),
        )));

        let rendered = format!("{:?}", error);

        assert!(rendered.starts_with("Failed to refresh the topology"));
        assert!(rendered.contains("Topology refresh aborted"));
        assert!(rendered.contains("`z:9` is not a configured"));
    }
}
