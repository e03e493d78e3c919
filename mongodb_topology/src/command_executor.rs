use std::{future::Future, sync::Arc};

use tracing::instrument;

use crate::{
    connection_pool::{ConnectionError, ConnectionPool, Connector, PooledConnection},
    error_chain_fmt,
    events::{command_name_of, failure_document, EventBus},
    host_address::HostAddress,
    Document,
};

/// Sends one command over an established connection and returns the server's reply.
pub trait CommandTransport<T: Send>: Send + Sync + 'static {
    fn send_command(
        &self,
        connection: &mut PooledConnection<T>,
        database: &str,
        command: &Document,
    ) -> impl Future<Output = anyhow::Result<Document>> + Send;
}

#[derive(thiserror::Error)]
pub enum CommandError {
    #[error("Failed to get a connection")]
    Connection(#[from] ConnectionError),
    #[error("Command `{command_name}` failed on `{host}`: {errmsg}")]
    CommandFailed {
        host: HostAddress,
        command_name: String,
        errmsg: String,
        reply: Document,
    },
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Runs commands against a host and reports each one on the [`EventBus`].
///
/// Every command that reaches a connection gets a started event followed by exactly one
/// succeeded or failed event, all carrying the connection's logical address. Commands that never
/// get a connection publish nothing.
pub struct CommandExecutor<C: Connector, T> {
    pool: ConnectionPool<C>,
    transport: Arc<T>,
    bus: EventBus,
}

impl<C: Connector, T> Clone for CommandExecutor<C, T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            transport: Arc::clone(&self.transport),
            bus: self.bus.clone(),
        }
    }
}

impl<C: Connector, T> std::fmt::Debug for CommandExecutor<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("pool", &self.pool)
            .field("bus", &self.bus)
            .finish()
    }
}

impl<C, T> CommandExecutor<C, T>
where
    C: Connector,
    T: CommandTransport<C::Connection>,
{
    pub fn new(pool: ConnectionPool<C>, transport: Arc<T>, bus: EventBus) -> Self {
        Self {
            pool,
            transport,
            bus,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    #[instrument(
        level = "debug",
        name = "Command Executor - Run Command",
        skip(self, host, command),
        fields(%host)
    )]
    pub async fn run_command(
        &self,
        host: &HostAddress,
        database: &str,
        command: Document,
    ) -> Result<Document, CommandError> {
        let command_name = command_name_of(&command)
            .ok_or_else(|| anyhow::anyhow!("Command document has no command name"))?
            .to_string();

        let mut connection = self.pool.acquire(host).await?;

        let in_flight = self.bus.start_command(
            command_name.as_str(),
            database,
            command.clone(),
            connection.address().clone(),
        );
        tracing::trace!(request_id = in_flight.request_id(), %command_name, "Sending command");

        let reply = match self
            .transport
            .send_command(&mut connection, database, &command)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!("Command did not complete. Caused by: {}", e);
                in_flight.fail(failure_document(&e));
                return Err(CommandError::UnexpectedError(e));
            }
        };

        if reply_is_ok(&reply) {
            in_flight.succeed(reply.clone());
            self.pool.release(connection);
            return Ok(reply);
        }

        let errmsg = reply
            .get("errmsg")
            .and_then(Document::as_str)
            .unwrap_or("unknown error")
            .to_string();
        tracing::debug!(%errmsg, "Server reported command failure");
        in_flight.fail(reply.clone());
        self.pool.release(connection);
        Err(CommandError::CommandFailed {
            host: host.clone(),
            command_name,
            errmsg,
            reply,
        })
    }
}

/// `ok` is `1` on success. Servers send it as an integer, a double or a boolean.
fn reply_is_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(ok) => ok.as_f64() == Some(1.0) || ok.as_bool() == Some(true),
        None => false,
    }
}
