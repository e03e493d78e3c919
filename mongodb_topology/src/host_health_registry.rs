use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::host_address::HostAddress;

/// Tracks hosts that have been administratively marked down.
///
/// A host that is not in the down set is assumed reachable. The set only changes through
/// [`mark_down`](Self::mark_down) and [`mark_up`](Self::mark_up); entries never expire on their
/// own. Cloning the registry is cheap and every clone shares the same set, so one instance can be
/// handed to the probe, the connection pool and a test harness at the same time.
#[derive(Clone, Debug, Default)]
pub struct HostHealthRegistry {
    down: Arc<RwLock<BTreeSet<HostAddress>>>,
}

impl HostHealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `host` as down. Marking an already down host does nothing.
    pub fn mark_down(&self, host: &HostAddress) {
        if self.write().insert(host.clone()) {
            tracing::info!(%host, "Host marked down");
        }
    }

    /// Marks `host` as reachable again. Hosts that are not down are left alone.
    pub fn mark_up(&self, host: &HostAddress) {
        if self.write().remove(host) {
            tracing::info!(%host, "Host marked up");
        }
    }

    pub fn is_down(&self, host: &HostAddress) -> bool {
        self.read().contains(host)
    }

    /// Fault injection alias for [`mark_down`](Self::mark_down).
    pub fn kill_host(&self, host: &HostAddress) {
        self.mark_down(host)
    }

    /// Fault injection alias for [`mark_up`](Self::mark_up).
    pub fn revive_host(&self, host: &HostAddress) {
        self.mark_up(host)
    }

    /// Snapshot of the hosts currently marked down, in address order.
    pub fn down_hosts(&self) -> Vec<HostAddress> {
        self.read().iter().cloned().collect()
    }

    // A poisoned lock still holds a valid set; inserts and removes can't leave it torn.
    fn read(&self) -> RwLockReadGuard<'_, BTreeSet<HostAddress>> {
        self.down.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeSet<HostAddress>> {
        self.down.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[test]
    fn unknown_hosts_are_reachable() {
        let registry = HostHealthRegistry::new();

        assert!(!registry.is_down(&host("a:1")));
        assert!(registry.down_hosts().is_empty());
    }

    #[test]
    fn mark_down_is_idempotent() {
        // Arrange
        let registry = HostHealthRegistry::new();

        // Act
        registry.mark_down(&host("a:1"));
        registry.mark_down(&host("a:1"));

        // Assert
        assert!(registry.is_down(&host("a:1")));
        assert_eq!(registry.down_hosts(), vec![host("a:1")]);
    }

    #[test]
    fn mark_up_on_reachable_host_is_a_no_op() {
        let registry = HostHealthRegistry::new();
        registry.mark_down(&host("b:2"));

        registry.mark_up(&host("a:1"));

        assert_eq!(registry.down_hosts(), vec![host("b:2")]);
    }

    #[test]
    fn revive_restores_a_killed_host() {
        let registry = HostHealthRegistry::new();

        registry.kill_host(&host("a:1"));
        assert!(registry.is_down(&host("a:1")));

        registry.revive_host(&host("a:1"));
        assert!(!registry.is_down(&host("a:1")));
    }

    #[test]
    fn clones_share_state() {
        let registry = HostHealthRegistry::new();
        let clone = registry.clone();

        clone.kill_host(&host("c:3"));

        assert!(registry.is_down(&host("c:3")));
    }
}
