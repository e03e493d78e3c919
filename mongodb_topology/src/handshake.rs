//! The `ismaster` handshake used to learn a server's role.
//!
//! How the handshake reaches the server is left to a [`HandshakeTransport`]. Production code plugs
//! in the driver's wire layer, tests plug in a scripted responder such as
//! [`MockCluster`](crate::MockCluster).

use std::{future::Future, time::Duration};

use serde::Deserialize;
use serde_json::json;

use crate::{error_chain_fmt, host_address::HostAddress, Document};

/// Database the handshake is sent to.
pub const HANDSHAKE_DATABASE: &str = "admin";
pub const HANDSHAKE_COMMAND_NAME: &str = "ismaster";
/// `msg` value routers answer the handshake with.
pub const ROUTER_MARKER: &str = "isdbgrid";

/// The `{ismaster: 1}` command document.
pub fn handshake_command() -> Document {
    json!({ HANDSHAKE_COMMAND_NAME: 1 })
}

/// Sends a handshake command to one host and returns the raw reply.
pub trait HandshakeTransport: Send + Sync + 'static {
    fn handshake(
        &self,
        host: &HostAddress,
        database: &str,
        command: &Document,
    ) -> impl Future<Output = Result<HandshakeReply, HandshakeError>> + Send;
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeReply {
    pub document: Document,
    /// Round trip reported by the transport. When `None` the probe measures it.
    pub round_trip: Option<Duration>,
}

#[derive(thiserror::Error)]
pub enum HandshakeError {
    #[error("Host `{0}` is not part of the configured deployment")]
    UnknownHost(HostAddress),
    #[error("Timed out waiting for `{0}`")]
    Timeout(HostAddress),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// The fields of a handshake reply this crate looks at.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IsMasterResponse {
    #[serde(default)]
    pub ismaster: bool,
    pub secondary: Option<bool>,
    pub set_name: Option<String>,
    pub hosts: Option<Vec<String>>,
    pub primary: Option<String>,
    pub msg: Option<String>,
}

impl IsMasterResponse {
    pub fn is_router(&self) -> bool {
        self.msg.as_deref() == Some(ROUTER_MARKER)
    }

    pub fn is_replica_set_member(&self) -> bool {
        self.set_name.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_reply_deserializes() {
        let document = json!({
            "ismaster": false,
            "secondary": true,
            "setName": "rs",
            "hosts": ["a:1", "b:2", "c:3"],
            "primary": "a:1",
        });

        let response: IsMasterResponse = serde_json::from_value(document).unwrap();

        assert!(!response.ismaster);
        assert_eq!(response.secondary, Some(true));
        assert_eq!(response.set_name.as_deref(), Some("rs"));
        assert_eq!(response.hosts.as_ref().map(Vec::len), Some(3));
        assert_eq!(response.primary.as_deref(), Some("a:1"));
        assert!(response.is_replica_set_member());
        assert!(!response.is_router());
    }

    #[test]
    fn router_reply_is_recognised() {
        let response: IsMasterResponse =
            serde_json::from_value(json!({"ismaster": true, "msg": "isdbgrid"})).unwrap();

        assert!(response.is_router());
        assert!(!response.is_replica_set_member());
    }

    #[test]
    fn handshake_command_is_ismaster_one() {
        assert_eq!(handshake_command(), json!({"ismaster": 1}));
    }
}
