mod common;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use common::{addr, client_with_recorder, replica_set};
use mongodb_topology::{
    events::{CommandEvent, CommandStartedEvent, CommandSubscriber, SubscriberError},
    CommandError, MockCluster,
};
use proptest::prelude::*;
use serde_json::json;

#[tokio::test]
async fn events_serialize_with_the_monitoring_field_names() {
    // Arrange
    let cluster = replica_set();
    let (client, recorder) = client_with_recorder(&cluster);

    // Act
    client
        .run_command(&addr("b:2"), "admin", json!({"ping": 1}))
        .await
        .unwrap();

    // Assert
    let events = recorder.events();
    let started = serde_json::to_value(&events[0]).unwrap();
    let succeeded = serde_json::to_value(&events[1]).unwrap();
    assert_eq!(started["type"], json!("started"));
    assert_eq!(started["commandName"], json!("ping"));
    assert_eq!(started["databaseName"], json!("admin"));
    assert_eq!(started["command"], json!({"ping": 1}));
    assert_eq!(started["connectionId"], json!("b:2"));
    assert_eq!(succeeded["type"], json!("succeeded"));
    assert_eq!(succeeded["requestId"], started["requestId"]);
    assert_eq!(succeeded["reply"], json!({"ok": 1}));
    assert!(succeeded["durationMicros"].is_u64());
}

struct Panicking;
impl CommandSubscriber for Panicking {
    fn started(&self, _event: &CommandStartedEvent) -> Result<(), SubscriberError> {
        panic!("subscriber bug");
    }
}

struct Counting(AtomicUsize);
impl CommandSubscriber for Counting {
    fn started(&self, _event: &CommandStartedEvent) -> Result<(), SubscriberError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn panicking_subscriber_does_not_break_delivery_or_the_command() {
    // Arrange
    let cluster = replica_set();
    let (client, recorder) = client_with_recorder(&cluster);
    client.event_bus().subscribe(Arc::new(Panicking));
    let counting = Arc::new(Counting(AtomicUsize::new(0)));
    client.event_bus().subscribe(counting.clone());

    // Act
    let reply = client
        .run_command(&addr("a:1"), "admin", json!({"ping": 1}))
        .await;

    // Assert
    assert!(reply.is_ok());
    assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.started_events().len(), 1);
    assert_eq!(recorder.succeeded_events().len(), 1);
}

#[tokio::test]
async fn unsubscribed_subscribers_see_nothing_more() {
    let cluster = replica_set();
    let (client, recorder) = client_with_recorder(&cluster);
    let counting = Arc::new(Counting(AtomicUsize::new(0)));
    let id = client.event_bus().subscribe(counting.clone());

    client
        .run_command(&addr("a:1"), "admin", json!({"ping": 1}))
        .await
        .unwrap();
    assert!(client.event_bus().unsubscribe(id));
    client
        .run_command(&addr("a:1"), "admin", json!({"ping": 1}))
        .await
        .unwrap();

    assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.started_events().len(), 2);
}

#[tokio::test]
async fn failed_server_command_is_reported_with_its_reply() {
    let cluster = replica_set();
    cluster.script_reply(
        "insert",
        json!({"ok": 0, "errmsg": "not master", "code": 10107}),
    );
    let (client, recorder) = client_with_recorder(&cluster);

    let result = client
        .run_command(&addr("b:2"), "test", json!({"insert": "people"}))
        .await;

    assert!(matches!(result, Err(CommandError::CommandFailed { .. })));
    let failed = recorder.failed_events();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].failure["code"], json!(10107));
    assert_eq!(failed[0].connection_address, addr("b:2"));
}

#[derive(Clone, Debug)]
enum Step {
    Run { host: usize, command: usize },
    Kill(usize),
    Revive(usize),
}

const HOSTS: [&str; 4] = ["a:1", "b:2", "c:3", "z:9"];
const COMMANDS: [&str; 3] = ["ping", "insert", "frobnicate"];

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..HOSTS.len(), 0..COMMANDS.len())
            .prop_map(|(host, command)| Step::Run { host, command }),
        1 => (0..3usize).prop_map(Step::Kill),
        1 => (0..3usize).prop_map(Step::Revive),
    ]
}

async fn run_steps(cluster: MockCluster, steps: Vec<Step>) -> (Vec<CommandEvent>, usize) {
    let (client, recorder) = client_with_recorder(&cluster);
    cluster.script_reply("insert", json!({"ok": 1, "n": 1}));
    let mut reached_a_connection = 0;
    for step in steps {
        match step {
            Step::Run { host, command } => {
                let result = client
                    .run_command(&addr(HOSTS[host]), "test", json!({ COMMANDS[command]: 1 }))
                    .await;
                if !matches!(result, Err(CommandError::Connection(_))) {
                    reached_a_connection += 1;
                }
            }
            Step::Kill(host) => client.kill_host(&addr(HOSTS[host])),
            Step::Revive(host) => client.revive_host(&addr(HOSTS[host])),
        }
    }
    (recorder.events(), reached_a_connection)
}

proptest! {
    #[test]
    fn every_started_event_has_exactly_one_matching_terminal_event(
        steps in proptest::collection::vec(step(), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (events, reached_a_connection) = runtime.block_on(run_steps(replica_set(), steps));

        let mut open: HashMap<i64, CommandStartedEvent> = HashMap::new();
        let mut closed = 0;
        for event in &events {
            match event {
                CommandEvent::Started(started) => {
                    prop_assert!(open.insert(started.request_id, started.clone()).is_none());
                }
                terminal => {
                    let started = open.remove(&terminal.request_id());
                    prop_assert!(started.is_some(), "terminal event without a started event");
                    let started = started.unwrap();
                    prop_assert_eq!(&started.command_name, terminal.command_name());
                    prop_assert_eq!(&started.connection_address, terminal.connection_address());
                    closed += 1;
                }
            }
        }
        prop_assert!(open.is_empty());
        prop_assert_eq!(closed, reached_a_connection);
    }
}
