mod topology_probe_error;

pub use topology_probe_error::ProbeError;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::instrument;

use crate::{
    events::{failure_document, EventBus},
    handshake::{
        handshake_command, HandshakeError, HandshakeTransport, IsMasterResponse,
        HANDSHAKE_COMMAND_NAME, HANDSHAKE_DATABASE,
    },
    host_address::HostAddress,
    host_health_registry::HostHealthRegistry,
    probe_result::{ProbeResult, TopologyRole},
    Document,
};

/// Asks a single host for its role.
///
/// Hosts marked down in the [`HostHealthRegistry`] fail with [`ProbeError::HostUnreachable`]
/// without touching the transport. Every handshake that does go out is reported on the
/// [`EventBus`] as an `ismaster` command against `admin`.
pub struct TopologyProbe<T> {
    transport: Arc<T>,
    health: HostHealthRegistry,
    bus: EventBus,
    timeout: Duration,
}

impl<T> Clone for TopologyProbe<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            health: self.health.clone(),
            bus: self.bus.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> std::fmt::Debug for TopologyProbe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyProbe")
            .field("health", &self.health)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<T: HandshakeTransport> TopologyProbe<T> {
    pub fn new(
        transport: Arc<T>,
        health: HostHealthRegistry,
        bus: EventBus,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            health,
            bus,
            timeout,
        }
    }

    #[instrument(
        level = "debug",
        name = "Topology Probe - Probe Host",
        skip(self, host),
        fields(%host)
    )]
    pub async fn probe(&self, host: &HostAddress) -> Result<ProbeResult, ProbeError> {
        if self.health.is_down(host) {
            tracing::debug!("Host is marked down, skipping handshake");
            return Err(ProbeError::unreachable(host, "host is marked down"));
        }

        let command = handshake_command();
        let in_flight = self.bus.start_command(
            HANDSHAKE_COMMAND_NAME,
            HANDSHAKE_DATABASE,
            command.clone(),
            host.clone(),
        );
        let sent_at = Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.transport.handshake(host, HANDSHAKE_DATABASE, &command),
        )
        .await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(HandshakeError::UnknownHost(unknown))) => {
                tracing::error!("Handshake sent to a host outside the deployment");
                in_flight.fail(failure_document(format!("unknown host: {}", unknown)));
                return Err(ProbeError::UnknownHost(unknown));
            }
            Ok(Err(e)) => {
                tracing::debug!("Handshake failed. Caused by: {}", e);
                in_flight.fail(failure_document(&e));
                return Err(ProbeError::unreachable(host, e.to_string()));
            }
            Err(_) => {
                let reason = format!("no handshake reply within {:?}", self.timeout);
                tracing::debug!("{}", reason);
                in_flight.fail(failure_document(&reason));
                return Err(ProbeError::unreachable(host, reason));
            }
        };

        let round_trip = reply.round_trip.unwrap_or_else(|| sent_at.elapsed());
        match classify(host, &reply.document) {
            Ok(role) => {
                tracing::trace!(?role, ?round_trip, "Host classified");
                in_flight.succeed(reply.document);
                Ok(ProbeResult::new(host.clone(), role, round_trip))
            }
            Err(e) => {
                tracing::warn!("Unusable handshake reply. Caused by: {}", e);
                in_flight.fail(failure_document(&e));
                Err(e)
            }
        }
    }
}

/// Turns a handshake reply into a role. Routers win over replica set fields.
fn classify(host: &HostAddress, document: &Document) -> Result<TopologyRole, ProbeError> {
    let invalid = |reason: String| ProbeError::InvalidReply {
        host: host.clone(),
        reason,
    };

    let response: IsMasterResponse =
        serde_json::from_value(document.clone()).map_err(|e| invalid(e.to_string()))?;

    if response.is_router() {
        return Ok(TopologyRole::Router);
    }

    let set_name = match response.set_name {
        Some(set_name) => set_name,
        None => return Ok(TopologyRole::Standalone),
    };

    let known_hosts = HostAddress::parse_all(response.hosts.as_deref().unwrap_or_default())
        .map_err(|e| invalid(e.to_string()))?;
    let reported_primary = response
        .primary
        .as_deref()
        .map(str::parse::<HostAddress>)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    Ok(TopologyRole::ReplicaSetMember {
        is_primary: response.ismaster,
        is_secondary: response.secondary.unwrap_or(false),
        set_name,
        known_hosts,
        reported_primary,
    })
}
