mod topology_monitor_actor;
mod topology_monitor_error;
mod topology_monitor_handle;

pub(crate) use topology_monitor_actor::TopologyMonitorActor;
pub use topology_monitor_error::TopologyMonitorError;
pub use topology_monitor_handle::TopologyMonitor;

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    host_address::HostAddress, probe_result::ProbeResult, topology_description::TopologyDescription,
    topology_probe::ProbeError,
};

pub(crate) type RefreshResult = Result<Arc<TopologyDescription>, TopologyMonitorError>;

pub(crate) enum TopologyMonitorMessage {
    /// Probe `hosts`, or every tracked host when `None`.
    Refresh {
        hosts: Option<Vec<HostAddress>>,
        respond_to: Option<oneshot::Sender<RefreshResult>>,
    },
    /// Sent by the refresh task back to the actor once every probe has finished.
    RefreshCompleted {
        result: Result<Vec<ProbeResult>, ProbeError>,
    },
}
