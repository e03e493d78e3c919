use std::time::{Duration, SystemTime};

use crate::host_address::HostAddress;

/// What a host said it is during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyRole {
    Standalone,
    ReplicaSetMember {
        is_primary: bool,
        is_secondary: bool,
        set_name: String,
        /// The set's member list, as configured on the server.
        known_hosts: Vec<HostAddress>,
        /// The primary this member believes in, if any.
        reported_primary: Option<HostAddress>,
    },
    Router,
}

impl TopologyRole {
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            TopologyRole::ReplicaSetMember {
                is_primary: true,
                ..
            }
        )
    }

    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            TopologyRole::ReplicaSetMember {
                is_secondary: true,
                ..
            }
        )
    }

    pub fn is_router(&self) -> bool {
        matches!(self, TopologyRole::Router)
    }

    pub fn is_standalone(&self) -> bool {
        matches!(self, TopologyRole::Standalone)
    }

    pub fn set_name(&self) -> Option<&str> {
        match self {
            TopologyRole::ReplicaSetMember { set_name, .. } => Some(set_name),
            _ => None,
        }
    }

    /// Member list reported by a replica set member. Empty for other roles.
    pub fn known_hosts(&self) -> &[HostAddress] {
        match self {
            TopologyRole::ReplicaSetMember { known_hosts, .. } => known_hosts,
            _ => &[],
        }
    }
}

/// The outcome of one successful probe.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    address: HostAddress,
    role: TopologyRole,
    round_trip: Duration,
    observed_at: SystemTime,
}

impl ProbeResult {
    pub fn new(address: HostAddress, role: TopologyRole, round_trip: Duration) -> Self {
        Self {
            address,
            role,
            round_trip,
            observed_at: SystemTime::now(),
        }
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    pub fn role(&self) -> &TopologyRole {
        &self.role
    }

    pub fn round_trip(&self) -> Duration {
        self.round_trip
    }

    pub fn observed_at(&self) -> SystemTime {
        self.observed_at
    }
}
