use std::{future::Future, net::SocketAddr};

use anyhow::Context;
use tokio::net::TcpStream;

use crate::host_address::HostAddress;

/// Opens new connections for a [`ConnectionPool`](super::ConnectionPool).
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn connect(
        &self,
        host: &HostAddress,
    ) -> impl Future<Output = anyhow::Result<Self::Connection>> + Send;
}

/// Connects to the requested host over TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Connection = TcpStream;

    async fn connect(&self, host: &HostAddress) -> anyhow::Result<TcpStream> {
        TcpStream::connect((socket_host(host), host.port()))
            .await
            .with_context(|| format!("Failed to connect to {}", host))
    }
}

/// The host without the brackets IPv6 literals are written with.
fn socket_host(host: &HostAddress) -> &str {
    let name = host.host();
    name.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(name)
}

/// Opens every connection against one fixed server, whatever host was requested.
///
/// Lets a single local server stand in for a whole deployment. The pool still tags each
/// connection with the requested host.
#[derive(Clone, Copy, Debug)]
pub struct RedirectingConnector {
    target: SocketAddr,
}

impl RedirectingConnector {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Connector for RedirectingConnector {
    type Connection = TcpStream;

    async fn connect(&self, host: &HostAddress) -> anyhow::Result<TcpStream> {
        tracing::trace!(%host, target = %self.target, "Redirecting connection");
        TcpStream::connect(self.target)
            .await
            .with_context(|| format!("Failed to connect to {} on behalf of {}", self.target, host))
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn socket_host_strips_ipv6_brackets() {
        let v6: HostAddress = "[::1]:27017".parse().unwrap();
        let named: HostAddress = "db.example.com:27017".parse().unwrap();

        assert_eq!(socket_host(&v6), "::1");
        assert_eq!(socket_host(&named), "db.example.com");
    }

    #[tokio::test]
    async fn tcp_connector_reaches_an_ipv4_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let host: HostAddress = format!("127.0.0.1:{}", port).parse().unwrap();

        let stream = TcpConnector.connect(&host).await.unwrap();

        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn tcp_connector_reaches_an_ipv6_listener() {
        // Hosts without IPv6 loopback have nothing to test.
        let listener = match TcpListener::bind("[::1]:0").await {
            Ok(listener) => listener,
            Err(_) => return,
        };
        let port = listener.local_addr().unwrap().port();
        let host: HostAddress = format!("[::1]:{}", port).parse().unwrap();

        let stream = TcpConnector.connect(&host).await.unwrap();

        assert!(stream.peer_addr().unwrap().is_ipv6());
    }
}
