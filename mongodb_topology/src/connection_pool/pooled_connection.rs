use crate::host_address::HostAddress;

/// A connection handed out by a [`ConnectionPool`](super::ConnectionPool).
///
/// `address` is the logical address the connection was requested for. It is what command events
/// report, even when the underlying socket points somewhere else.
#[derive(Debug)]
pub struct PooledConnection<T> {
    id: u64,
    address: HostAddress,
    connection: T,
}

impl<T> PooledConnection<T> {
    pub(crate) fn new(id: u64, address: HostAddress, connection: T) -> Self {
        Self {
            id,
            address,
            connection,
        }
    }

    /// Unique within the pool that created the connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &HostAddress {
        &self.address
    }

    pub fn connection(&self) -> &T {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut T {
        &mut self.connection
    }

    pub fn into_inner(self) -> T {
        self.connection
    }
}
