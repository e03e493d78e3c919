use crate::{error_chain_fmt, host_address::HostAddress};

#[derive(thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Host `{host}` is unreachable: {reason}")]
    HostUnreachable { host: HostAddress, reason: String },
    #[error("Host `{0}` is not a configured standalone, replica set member or router")]
    UnknownHost(HostAddress),
    #[error("Host `{host}` sent an invalid handshake reply: {reason}")]
    InvalidReply { host: HostAddress, reason: String },
}
impl std::fmt::Debug for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ProbeError {
    pub fn host(&self) -> &HostAddress {
        match self {
            ProbeError::HostUnreachable { host, .. } => host,
            ProbeError::UnknownHost(host) => host,
            ProbeError::InvalidReply { host, .. } => host,
        }
    }

    /// Fatal errors abort a refresh; the others only exclude the host from it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::UnknownHost(_))
    }

    pub(crate) fn unreachable(host: &HostAddress, reason: impl Into<String>) -> Self {
        ProbeError::HostUnreachable {
            host: host.clone(),
            reason: reason.into(),
        }
    }
}
