use crate::{error_chain_fmt, topology_probe::ProbeError};

#[derive(thiserror::Error, Clone)]
pub enum TopologyMonitorError {
    #[error("Topology refresh aborted")]
    Probe(#[from] ProbeError),
    #[error("The topology monitor has shut down")]
    MonitorShutDown,
}
impl std::fmt::Debug for TopologyMonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
