use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{JoinHandle, JoinSet},
    time::{Interval, MissedTickBehavior},
};
use tracing::{instrument, Span};
use uuid::Uuid;

use crate::{
    handshake::HandshakeTransport, host_address::HostAddress, probe_result::ProbeResult,
    topology_description::TopologyDescription, topology_probe::ProbeError,
    topology_probe::TopologyProbe,
};

use super::{RefreshResult, TopologyMonitorError, TopologyMonitorMessage};

/// Owns the refresh cycle. Only one refresh runs at a time. A request arriving while one is in
/// flight shares its result when the running refresh covers every host it asked for, otherwise it
/// is queued for the refresh that follows.
pub(crate) struct TopologyMonitorActor<T> {
    probe: TopologyProbe<T>,
    receiver: mpsc::Receiver<TopologyMonitorMessage>,
    /// Allows the refresh task to report back to the actor.
    receiver_internal: mpsc::Receiver<TopologyMonitorMessage>,
    sender_internal: mpsc::Sender<TopologyMonitorMessage>,
    published: watch::Sender<Arc<TopologyDescription>>,
    /// Hosts probed by periodic refreshes.
    tracked_hosts: Vec<HostAddress>,
    /// Hosts a refresh reported as unknown. Discovered hosts in this list are not tracked again.
    rejected_hosts: Vec<HostAddress>,
    refresher: Option<JoinHandle<()>>,
    in_flight_hosts: Vec<HostAddress>,
    waiters: Vec<oneshot::Sender<RefreshResult>>,
    queued_hosts: Vec<HostAddress>,
    queued_waiters: Vec<oneshot::Sender<RefreshResult>>,
    heartbeat_interval: Option<Duration>,
    generation: u64,
}

impl<T: HandshakeTransport> TopologyMonitorActor<T> {
    pub(crate) fn new(
        receiver: mpsc::Receiver<TopologyMonitorMessage>,
        published: watch::Sender<Arc<TopologyDescription>>,
        probe: TopologyProbe<T>,
        seeds: Vec<HostAddress>,
        heartbeat_interval: Option<Duration>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let mut actor = Self {
            probe,
            receiver,
            receiver_internal: rx,
            sender_internal: tx,
            published,
            tracked_hosts: Vec::new(),
            rejected_hosts: Vec::new(),
            refresher: None,
            in_flight_hosts: Vec::new(),
            waiters: Vec::new(),
            queued_hosts: Vec::new(),
            queued_waiters: Vec::new(),
            heartbeat_interval,
            generation: 0,
        };
        actor.track(&seeds);
        actor
    }

    #[instrument(
        level = "debug",
        name = "TopologyMonitor Actor - Handle Message",
        skip(self, msg),
        fields(correlation_id)
    )]
    fn handle_message(&mut self, msg: TopologyMonitorMessage) {
        Span::current().record("correlation_id", Uuid::new_v4().to_string().as_str());
        match msg {
            TopologyMonitorMessage::Refresh { hosts, respond_to } => {
                let hosts = hosts.unwrap_or_else(|| self.tracked_hosts.clone());

                if self.refresher.is_none() {
                    self.waiters.extend(respond_to);
                    self.start_refresh(hosts);
                    return;
                }

                if hosts.iter().all(|host| self.in_flight_hosts.contains(host)) {
                    tracing::debug!("Refresh already in flight, waiting on it instead.");
                    self.waiters.extend(respond_to);
                } else {
                    tracing::debug!("Refresh in flight misses some hosts, queueing another.");
                    merge_hosts(&mut self.queued_hosts, &hosts);
                    self.queued_waiters.extend(respond_to);
                }
            }
            TopologyMonitorMessage::RefreshCompleted { result } => {
                self.refresher = None;
                let hosts = std::mem::take(&mut self.in_flight_hosts);
                let outcome = self.publish(&hosts, result);
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(outcome.clone());
                }

                if !self.queued_hosts.is_empty() {
                    self.waiters = std::mem::take(&mut self.queued_waiters);
                    let queued = std::mem::take(&mut self.queued_hosts);
                    self.start_refresh(queued);
                }
            }
        }
    }

    fn start_refresh(&mut self, hosts: Vec<HostAddress>) {
        tracing::debug!(hosts = hosts.len(), "Starting topology refresh");
        let probe = self.probe.clone();
        let sender_internal = self.sender_internal.clone();
        self.in_flight_hosts = hosts.clone();

        self.refresher = Some(tokio::spawn(async move {
            let result = probe_all(probe, hosts).await;
            if let Err(e) = sender_internal
                .send(TopologyMonitorMessage::RefreshCompleted { result })
                .await
            {
                tracing::error!(
                    "Could not report refresh results to the monitor. Caused by: {}",
                    e
                );
            }
        }));
    }

    /// Replaces the published description, or leaves it untouched when the refresh failed.
    ///
    /// The refreshed hosts are tracked only once a refresh over them completes. A host reported
    /// as unknown stops being tracked.
    fn publish(
        &mut self,
        hosts: &[HostAddress],
        result: Result<Vec<ProbeResult>, ProbeError>,
    ) -> RefreshResult {
        let results = match result {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Topology refresh aborted. Caused by: {}", e);
                if let ProbeError::UnknownHost(host) = &e {
                    self.reject(host);
                }
                return Err(TopologyMonitorError::Probe(e));
            }
        };

        self.generation += 1;
        let description = Arc::new(TopologyDescription::from_probe_results(
            results,
            self.generation,
        ));

        self.rejected_hosts.retain(|host| !hosts.contains(host));
        self.track(hosts);
        let discovered = description.known_hosts().into_iter().collect::<Vec<_>>();
        self.track(&discovered);

        self.published.send_replace(Arc::clone(&description));
        tracing::info!(
            generation = self.generation,
            primary = ?description.primary(),
            members = description.members().len(),
            "Topology description published"
        );
        Ok(description)
    }

    fn track(&mut self, hosts: &[HostAddress]) {
        for host in hosts {
            if !self.tracked_hosts.contains(host) && !self.rejected_hosts.contains(host) {
                tracing::trace!(%host, "Tracking host");
                self.tracked_hosts.push(host.clone());
            }
        }
    }

    fn reject(&mut self, host: &HostAddress) {
        tracing::debug!(%host, "No longer tracking unknown host");
        self.tracked_hosts.retain(|tracked| tracked != host);
        if !self.rejected_hosts.contains(host) {
            self.rejected_hosts.push(host.clone());
        }
    }
}

fn merge_hosts(into: &mut Vec<HostAddress>, hosts: &[HostAddress]) {
    for host in hosts {
        if !into.contains(host) {
            into.push(host.clone());
        }
    }
}

/// Probes every host concurrently.
///
/// Unreachable hosts and hosts with unusable replies are left out of the result. The first
/// [`ProbeError::UnknownHost`] cancels the probes still running and is returned instead.
#[instrument(level = "debug", name = "Probe All Hosts", skip(probe))]
async fn probe_all<T: HandshakeTransport>(
    probe: TopologyProbe<T>,
    hosts: Vec<HostAddress>,
) -> Result<Vec<ProbeResult>, ProbeError> {
    let mut probes = JoinSet::new();
    let mut seen = Vec::with_capacity(hosts.len());
    for host in hosts {
        if seen.contains(&host) {
            continue;
        }
        seen.push(host.clone());
        let probe = probe.clone();
        probes.spawn(async move { probe.probe(&host).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) if e.is_fatal() => {
                probes.abort_all();
                return Err(e);
            }
            Ok(Err(e)) => {
                tracing::debug!(host = %e.host(), "Excluding host from this refresh. Caused by: {}", e);
            }
            Err(e) => {
                tracing::error!("A probe task failed to complete. Caused by: {}", e);
            }
        }
    }
    Ok(results)
}

async fn heartbeat(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[instrument(level = "debug", name = "Running Topology Monitor Actor", skip(actor))]
pub(crate) async fn run_topology_monitor_actor<T: HandshakeTransport>(
    mut actor: TopologyMonitorActor<T>,
) {
    let mut heartbeat_timer = actor.heartbeat_interval.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = heartbeat(&mut heartbeat_timer) => {
                if actor.tracked_hosts.is_empty() {
                    continue;
                }
                tracing::debug!("Refreshing topology via heartbeat.");
                actor.handle_message(TopologyMonitorMessage::Refresh {
                    hosts: None,
                    respond_to: None,
                });
            },
            opt_msg = actor.receiver.recv() => {
                let msg = match opt_msg {
                    Some(msg) => msg,
                    None => break,
                };
                actor.handle_message(msg);
            },
            Some(msg) = actor.receiver_internal.recv() => {
                actor.handle_message(msg);
            }
        }
    }

    if let Some(refresher) = actor.refresher.take() {
        refresher.abort();
    }
    tracing::debug!("Topology monitor stopped");
}
