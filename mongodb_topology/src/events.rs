//! Command monitoring.
//!
//! Every command sent to a server produces exactly one [`CommandStartedEvent`] followed by exactly
//! one terminal event, either a [`CommandSucceededEvent`] or a [`CommandFailedEvent`], both carrying
//! the same request id. Events are handed to every [`CommandSubscriber`] registered on an
//! [`EventBus`] and are not retained afterwards.

mod command_event;
mod event_bus;
mod in_flight_command;
mod subscriber;

pub use command_event::*;
pub use event_bus::*;
pub use in_flight_command::*;
pub use subscriber::*;
