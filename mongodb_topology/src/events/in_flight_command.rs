use std::time::Instant;

use crate::{host_address::HostAddress, Document};

use super::{
    failure_document, CommandFailedEvent, CommandStartedEvent, CommandSucceededEvent,
    DeliveryReport, EventBus,
};

/// A command whose started event has been published and whose terminal event has not.
///
/// [`succeed`](Self::succeed) and [`fail`](Self::fail) consume the guard, so a command can only
/// finish once. A guard dropped without finishing publishes a failed event.
#[derive(Debug)]
pub struct InFlightCommand {
    bus: EventBus,
    request_id: i64,
    command_name: String,
    connection_address: HostAddress,
    started_at: Instant,
    started_report: Option<DeliveryReport>,
    finished: bool,
}

impl InFlightCommand {
    pub(crate) fn new(bus: EventBus, started: CommandStartedEvent, report: DeliveryReport) -> Self {
        Self {
            bus,
            request_id: started.request_id,
            command_name: started.command_name,
            connection_address: started.connection_address,
            started_at: Instant::now(),
            started_report: Some(report),
            finished: false,
        }
    }

    pub fn request_id(&self) -> i64 {
        self.request_id
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn connection_address(&self) -> &HostAddress {
        &self.connection_address
    }

    /// Publishes the succeeded event. The report covers both the started and succeeded deliveries.
    pub fn succeed(mut self, reply: Document) -> DeliveryReport {
        self.finished = true;
        let event = CommandSucceededEvent {
            request_id: self.request_id,
            command_name: self.command_name.clone(),
            duration_micros: self.duration_micros(),
            reply,
            connection_address: self.connection_address.clone(),
        };
        let mut report = self.started_report.take().unwrap_or_default();
        report.merge(self.bus.publish_succeeded(&event));
        report
    }

    /// Publishes the failed event. The report covers both the started and failed deliveries.
    pub fn fail(mut self, failure: Document) -> DeliveryReport {
        self.finished = true;
        let mut report = self.started_report.take().unwrap_or_default();
        report.merge(self.publish_failure(failure));
        report
    }

    fn publish_failure(&self, failure: Document) -> DeliveryReport {
        let event = CommandFailedEvent {
            request_id: self.request_id,
            command_name: self.command_name.clone(),
            duration_micros: self.duration_micros(),
            failure,
            connection_address: self.connection_address.clone(),
        };
        self.bus.publish_failed(&event)
    }

    fn duration_micros(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

impl Drop for InFlightCommand {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                request_id = self.request_id,
                command = %self.command_name,
                "Command dropped before completing, publishing failure"
            );
            let _ = self.publish_failure(failure_document("operation abandoned"));
        }
    }
}
