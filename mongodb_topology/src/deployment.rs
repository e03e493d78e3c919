use crate::host_address::HostAddress;

/// Replica set name reported by members when none is configured.
pub const DEFAULT_SET_NAME: &str = "rs";

/// The role a host was configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfiguredRole {
    Standalone,
    Member,
    Router,
}

/// The set of addresses a client is allowed to talk to, grouped by configured role.
///
/// Connections are never attempted against an address that is not listed here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Deployment {
    standalones: Vec<HostAddress>,
    members: Vec<HostAddress>,
    routers: Vec<HostAddress>,
    set_name: Option<String>,
}

impl Deployment {
    pub fn new(
        standalones: Vec<HostAddress>,
        members: Vec<HostAddress>,
        routers: Vec<HostAddress>,
    ) -> Self {
        Self {
            standalones,
            members,
            routers,
            set_name: None,
        }
    }

    pub fn with_set_name(mut self, set_name: impl Into<String>) -> Self {
        self.set_name = Some(set_name.into());
        self
    }

    pub fn standalones(&self) -> &[HostAddress] {
        &self.standalones
    }

    /// Replica set members in configuration order.
    pub fn members(&self) -> &[HostAddress] {
        &self.members
    }

    pub fn routers(&self) -> &[HostAddress] {
        &self.routers
    }

    pub fn set_name(&self) -> &str {
        self.set_name.as_deref().unwrap_or(DEFAULT_SET_NAME)
    }

    pub fn is_empty(&self) -> bool {
        self.standalones.is_empty() && self.members.is_empty() && self.routers.is_empty()
    }

    /// Looks the address up in the standalone, member and router lists, in that order.
    pub fn role_of(&self, host: &HostAddress) -> Option<ConfiguredRole> {
        if self.standalones.contains(host) {
            Some(ConfiguredRole::Standalone)
        } else if self.members.contains(host) {
            Some(ConfiguredRole::Member)
        } else if self.routers.contains(host) {
            Some(ConfiguredRole::Router)
        } else {
            None
        }
    }

    pub fn contains(&self, host: &HostAddress) -> bool {
        self.role_of(host).is_some()
    }

    /// Every configured address, duplicates removed, in configuration order.
    pub fn all_hosts(&self) -> Vec<HostAddress> {
        let mut hosts: Vec<HostAddress> = Vec::new();
        for host in self
            .standalones
            .iter()
            .chain(&self.members)
            .chain(&self.routers)
        {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }
}
