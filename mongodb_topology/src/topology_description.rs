use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;

use crate::{host_address::HostAddress, probe_result::ProbeResult};

/// Which server an operation should be sent to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadPreference {
    /// The primary. Deployments without a replica set fall back to a standalone or a router.
    #[default]
    Primary,
    /// The primary if there is one, a secondary otherwise.
    PrimaryPreferred,
    /// A random secondary.
    Secondary,
    /// The server with the lowest round trip.
    Nearest,
}

/// A consistent view of the deployment built from one refresh cycle.
///
/// Descriptions are never modified after construction; the monitor publishes a new one on every
/// refresh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyDescription {
    servers: BTreeMap<HostAddress, ProbeResult>,
    primary: Option<HostAddress>,
    generation: u64,
}

impl TopologyDescription {
    /// Builds a description from the probes that succeeded during one refresh.
    ///
    /// The primary is the single replica set member claiming to be primary. If several members
    /// claim it at once the description records no primary until a later refresh settles it.
    pub fn from_probe_results(results: Vec<ProbeResult>, generation: u64) -> Self {
        let servers = results
            .into_iter()
            .map(|result| (result.address().clone(), result))
            .collect::<BTreeMap<_, _>>();

        let claimants = servers
            .values()
            .filter(|result| result.role().is_primary())
            .map(|result| result.address().clone())
            .collect::<Vec<_>>();

        let primary = match claimants.as_slice() {
            [] => None,
            [primary] => Some(primary.clone()),
            many => {
                tracing::warn!(
                    claimants = ?many,
                    "More than one member claims to be primary, leaving primary unset"
                );
                None
            }
        };

        Self {
            servers,
            primary,
            generation,
        }
    }

    pub fn primary(&self) -> Option<&HostAddress> {
        self.primary.as_ref()
    }

    /// Every host that answered the refresh that produced this description.
    pub fn members(&self) -> BTreeSet<HostAddress> {
        self.servers.keys().cloned().collect()
    }

    pub fn server(&self, host: &HostAddress) -> Option<&ProbeResult> {
        self.servers.get(host)
    }

    pub fn servers(&self) -> impl Iterator<Item = &ProbeResult> {
        self.servers.values()
    }

    pub fn contains(&self, host: &HostAddress) -> bool {
        self.servers.contains_key(host)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Number of refreshes published before this one, plus one. Zero for the initial description.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn secondaries(&self) -> Vec<&HostAddress> {
        self.addresses_where(|result| result.role().is_secondary())
    }

    pub fn routers(&self) -> Vec<&HostAddress> {
        self.addresses_where(|result| result.role().is_router())
    }

    pub fn standalones(&self) -> Vec<&HostAddress> {
        self.addresses_where(|result| result.role().is_standalone())
    }

    /// The replica set name, taken from the primary if there is one.
    pub fn set_name(&self) -> Option<&str> {
        self.primary
            .as_ref()
            .and_then(|primary| self.servers.get(primary))
            .or_else(|| self.servers.values().find(|r| r.role().set_name().is_some()))
            .and_then(|result| result.role().set_name())
    }

    /// Union of the member lists reported by replica set members.
    pub fn known_hosts(&self) -> BTreeSet<HostAddress> {
        self.servers
            .values()
            .flat_map(|result| result.role().known_hosts().iter().cloned())
            .collect()
    }

    pub fn select_server(&self, read_preference: ReadPreference) -> Option<HostAddress> {
        let selected = match read_preference {
            ReadPreference::Primary => self.primary.clone().or_else(|| self.writable_fallback()),
            ReadPreference::PrimaryPreferred => self
                .primary
                .clone()
                .or_else(|| self.random_secondary())
                .or_else(|| self.writable_fallback()),
            ReadPreference::Secondary => self.random_secondary(),
            ReadPreference::Nearest => self
                .servers
                .values()
                .min_by_key(|result| result.round_trip())
                .map(|result| result.address().clone()),
        };
        tracing::trace!(?read_preference, ?selected, "Server selected");
        selected
    }

    fn random_secondary(&self) -> Option<HostAddress> {
        self.secondaries()
            .choose(&mut rand::thread_rng())
            .map(|host| (*host).clone())
    }

    // Standalones and routers accept writes without being primaries.
    fn writable_fallback(&self) -> Option<HostAddress> {
        self.standalones()
            .first()
            .map(|host| (*host).clone())
            .or_else(|| {
                self.routers()
                    .choose(&mut rand::thread_rng())
                    .map(|host| (*host).clone())
            })
    }

    fn addresses_where<F>(&self, predicate: F) -> Vec<&HostAddress>
    where
        F: Fn(&ProbeResult) -> bool,
    {
        self.servers
            .values()
            .filter(|result| predicate(result))
            .map(|result| result.address())
            .collect()
    }
}
