use serde::Serialize;
use serde_json::json;

use crate::{host_address::HostAddress, Document};

/// Published right before a command is handed to the server.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStartedEvent {
    pub request_id: i64,
    pub command_name: String,
    pub database_name: String,
    pub command: Document,
    #[serde(rename = "connectionId")]
    pub connection_address: HostAddress,
}

/// Published once the server replied with `ok: 1`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSucceededEvent {
    pub request_id: i64,
    pub command_name: String,
    pub duration_micros: u64,
    pub reply: Document,
    #[serde(rename = "connectionId")]
    pub connection_address: HostAddress,
}

/// Published when the command errored, either on the server or on the way there.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedEvent {
    pub request_id: i64,
    pub command_name: String,
    pub duration_micros: u64,
    pub failure: Document,
    #[serde(rename = "connectionId")]
    pub connection_address: HostAddress,
}

/// Any of the three command lifecycle events.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandEvent {
    Started(CommandStartedEvent),
    Succeeded(CommandSucceededEvent),
    Failed(CommandFailedEvent),
}

impl CommandEvent {
    pub fn request_id(&self) -> i64 {
        match self {
            CommandEvent::Started(e) => e.request_id,
            CommandEvent::Succeeded(e) => e.request_id,
            CommandEvent::Failed(e) => e.request_id,
        }
    }

    pub fn command_name(&self) -> &str {
        match self {
            CommandEvent::Started(e) => &e.command_name,
            CommandEvent::Succeeded(e) => &e.command_name,
            CommandEvent::Failed(e) => &e.command_name,
        }
    }

    pub fn connection_address(&self) -> &HostAddress {
        match self {
            CommandEvent::Started(e) => &e.connection_address,
            CommandEvent::Succeeded(e) => &e.connection_address,
            CommandEvent::Failed(e) => &e.connection_address,
        }
    }

    /// True for succeeded and failed events.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandEvent::Started(_))
    }
}

/// Builds the `{ok: 0, errmsg: ...}` document reported for client side failures.
pub fn failure_document(errmsg: impl std::fmt::Display) -> Document {
    json!({ "ok": 0, "errmsg": errmsg.to_string() })
}

/// Name of a command document: its first key.
pub fn command_name_of(command: &Document) -> Option<&str> {
    command
        .as_object()
        .and_then(|fields| fields.keys().next())
        .map(String::as_str)
}
