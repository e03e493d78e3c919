use crate::{error_chain_fmt, host_address::HostAddress};

#[derive(thiserror::Error)]
pub enum ConnectionError {
    #[error("Host `{0}` is marked down")]
    InjectedTimeout(HostAddress),
    #[error("Timed out connecting to `{0}`")]
    Timeout(HostAddress),
    #[error("Host `{0}` is not a configured standalone, replica set member or router")]
    UnknownHost(HostAddress),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ConnectionError {
    /// Injected and real timeouts look the same to callers.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ConnectionError::InjectedTimeout(_) | ConnectionError::Timeout(_)
        )
    }
}
