//! Walks a mock replica set through an outage and a failover while printing every command event.
//!
//! Run with `RUST_LOG=debug` to see the monitor's spans.

use std::sync::Arc;

use mongodb_topology::{
    events::{CommandFailedEvent, CommandStartedEvent, CommandSubscriber, SubscriberError},
    ClientOptions, Deployment, HostAddress, MockCluster, ReadPreference,
};
use serde_json::json;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

struct PrintingSubscriber;

impl CommandSubscriber for PrintingSubscriber {
    fn started(&self, event: &CommandStartedEvent) -> Result<(), SubscriberError> {
        println!(
            "-> #{} {} on {}",
            event.request_id, event.command_name, event.connection_address
        );
        Ok(())
    }

    fn failed(&self, event: &CommandFailedEvent) -> Result<(), SubscriberError> {
        println!(
            "<- #{} {} failed: {}",
            event.request_id, event.command_name, event.failure
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    let members = HostAddress::parse_all(&["a:1", "b:2", "c:3"])?;
    let cluster = MockCluster::new(Deployment::new(vec![], members, vec![]));
    let client = cluster.client(ClientOptions::default_for_testing())?;
    client
        .event_bus()
        .subscribe(Arc::new(PrintingSubscriber));

    client.refresh().await?;
    println!("primary: {:?}", client.current_primary());

    let a: HostAddress = "a:1".parse()?;
    let b: HostAddress = "b:2".parse()?;

    println!("killing {}", a);
    client.kill_host(&a);
    client.refresh().await?;
    println!(
        "primary: {:?}, members: {:?}",
        client.current_primary(),
        client.members()
    );

    println!("electing {}", b);
    cluster.set_primary(&b)?;
    client.refresh().await?;
    println!("primary: {:?}", client.current_primary());

    let reply = client
        .run_command_on(ReadPreference::Primary, "admin", json!({"ping": 1}))
        .await?;
    println!("ping: {}", reply);

    client.revive_host(&a);
    client.refresh().await?;
    println!("members after revive: {:?}", client.members());

    Ok(())
}

fn setup_tracing() {
    // Redirect all `log`'s events to the subscriber
    LogTracer::init().expect("Failed to set logger");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let formatting_layer = BunyanFormattingLayer::new("failover-demo".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    set_global_default(subscriber).expect("Failed to set subscriber");
}
