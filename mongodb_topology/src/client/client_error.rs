use crate::{
    command_executor::CommandError, error_chain_fmt, host_address::InvalidHostAddress,
    topology_description::ReadPreference, topology_monitor::TopologyMonitorError,
};

#[derive(thiserror::Error)]
pub enum ClientError {
    #[error("No hosts were supplied and a client can't exist without at least one")]
    MissingHostsError,
    #[error("Invalid host address")]
    InvalidHost(#[from] InvalidHostAddress),
    #[error("No server matches read preference {0:?}")]
    NoSuitableServer(ReadPreference),
    #[error("Failed to refresh the topology")]
    Topology(#[from] TopologyMonitorError),
    #[error("Command failed")]
    Command(#[from] CommandError),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
