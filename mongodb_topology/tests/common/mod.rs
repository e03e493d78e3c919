#![allow(dead_code)]

use std::sync::Once;

use mongodb_topology::{
    events::CommandEventRecorder, ClientOptions, Deployment, HostAddress, MockClient, MockCluster,
};
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

static TRACING: Once = Once::new();

/// Installs a bunyan subscriber once per test binary when `TEST_LOG` is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_err() {
            return;
        }
        LogTracer::init().expect("Failed to set logger");
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let subscriber = Registry::default()
            .with(env_filter)
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new("test".into(), std::io::stdout));
        set_global_default(subscriber).expect("Failed to set subscriber");
    });
}

pub fn addr(s: &str) -> HostAddress {
    s.parse().unwrap()
}

/// Standalone `s:1`, members `a:1`, `b:2`, `c:3` and router `m:1`.
pub fn mixed_cluster() -> MockCluster {
    MockCluster::new(Deployment::new(
        vec![addr("s:1")],
        HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap(),
        vec![addr("m:1")],
    ))
}

pub fn replica_set() -> MockCluster {
    MockCluster::new(Deployment::new(
        vec![],
        HostAddress::parse_all(&["a:1", "b:2", "c:3"]).unwrap(),
        vec![],
    ))
}

/// A test client with a recorder already subscribed.
pub fn client_with_recorder(cluster: &MockCluster) -> (MockClient, CommandEventRecorder) {
    init_tracing();
    let client = cluster
        .client(ClientOptions::default_for_testing())
        .expect("Failed to build client");
    let recorder = CommandEventRecorder::new();
    client
        .event_bus()
        .subscribe(std::sync::Arc::new(recorder.clone()));
    (client, recorder)
}
