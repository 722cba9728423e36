//! Publisher driving the built-in outputs end to end

use std::str::FromStr;
use std::sync::Arc;

use beacon_config::Config;
use beacon_outputs::{ConsoleFactory, FileFactory, MemoryFactory, MemoryStore};
use beacon_publisher::{
    Event, Message, OutputRegistry, Publisher, PublisherError, SignalChannel, SignalOutcome,
    SignalState,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn registry(store: &Arc<MemoryStore>) -> OutputRegistry {
    let mut registry = OutputRegistry::new();
    registry.register("console", ConsoleFactory);
    registry.register("file", FileFactory);
    registry.register("memory", MemoryFactory::with_store(store.clone()));
    registry
}

fn config(dir: &TempDir, extra: &str) -> Config {
    let toml = format!(
        r#"
[shipper]
name = "edge-01"
tags = ["web"]
{extra}

[output.memory]
save_topology = true

[output.local]
type = "file"
path = {path:?}
"#,
        path = dir.path().display().to_string(),
    );
    Config::from_str(&toml).unwrap()
}

fn file_lines(dir: &TempDir, name: &str) -> Vec<Value> {
    std::fs::read_to_string(dir.path().join(name))
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_publish_to_every_output() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let config = config(&dir, "");

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    assert_eq!(publisher.outputs(), vec!["local", "memory"]);
    assert_eq!(publisher.topology_output(), Some("memory"));

    let client = publisher.connect();
    let (signal, done) = SignalChannel::new();
    let msg = Message::batch(vec![
        Event::new().with("message", "first"),
        Event::new().with("message", "second"),
    ])
    .with_signal(signal)
    .sync();
    assert!(client.publish(msg).await);
    assert_eq!(done.await.unwrap(), SignalOutcome::Completed);

    client.disconnect();
    publisher.stop().await;

    let events = store.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].get("message"), Some(&json!("first")));
    assert_eq!(events[0].get("tags"), Some(&json!(["web"])));

    let lines = file_lines(&dir, "beacon");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["message"], json!("second"));
    assert_eq!(lines[1]["beat"]["name"], json!("edge-01"));
}

#[tokio::test]
async fn test_topology_through_memory_store() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let config = config(&dir, "");

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    assert_eq!(store.topology_names(), vec!["edge-01"]);

    publisher
        .publish_topology(&["198.51.100.7".to_string()])
        .await
        .unwrap();
    assert_eq!(publisher.server_name("198.51.100.7").await, "edge-01");
    assert_eq!(publisher.server_name("198.51.100.8").await, "");
    assert_eq!(publisher.server_name("127.0.0.1").await, "edge-01");

    publisher.stop().await;
}

#[tokio::test]
async fn test_failing_output_fails_sync_publish() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let toml = format!(
        r#"
[output.memory]
fail_sends = true

[output.local]
type = "file"
path = {path:?}
"#,
        path = dir.path().display().to_string(),
    );
    let config = Config::from_str(&toml).unwrap();

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    let client = publisher.connect();

    assert!(!client.publish(Message::event(Event::new().with("n", 1)).guaranteed()).await);

    // the healthy output still got the event
    assert_eq!(file_lines(&dir, "beacon").len(), 1);
    assert!(store.is_empty());

    let metrics = publisher.worker_metrics();
    let memory = metrics.iter().find(|(name, _)| name == "memory").unwrap();
    assert_eq!(memory.1.send_failures, 1);

    drop(client);
    publisher.stop().await;
}

#[tokio::test]
async fn test_dry_run_keeps_only_file_output() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let config = config(&dir, "dry_run = true");

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    assert!(publisher.is_dry_run());
    assert_eq!(publisher.outputs(), vec!["local"]);
    assert_eq!(publisher.topology_output(), None);
    assert!(store.topology_names().is_empty());

    let client = publisher.connect();
    assert!(client.publish(Message::event(Event::new().with("n", 1)).sync()).await);
    client.disconnect();
    publisher.stop().await;

    assert!(store.is_empty());
    assert_eq!(file_lines(&dir, "beacon").len(), 1);
}

#[tokio::test]
async fn test_bulk_queue_coalesces_batches() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let config = config(&dir, "bulk_queue_size = 8");

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    let client = publisher.connect();

    for i in 0..4 {
        let events = vec![Event::new().with("n", i), Event::new().with("n", i + 100)];
        assert!(client.publish_events(events).await);
    }
    client.disconnect();
    publisher.stop().await;

    // every batch was either delivered or canceled by stop, never duplicated
    assert!(store.len() <= 8);
    assert_eq!(store.len() % 2, 0);
}

#[tokio::test]
async fn test_two_topology_outputs_rejected() {
    let store = MemoryStore::new();
    let config = Config::from_str(
        r#"
[output.first]
type = "memory"
save_topology = true

[output.second]
type = "memory"
save_topology = true
"#,
    )
    .unwrap();

    let err = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap_err();
    assert!(matches!(err, PublisherError::MultipleTopologyOutputs));
}

#[tokio::test]
async fn test_file_cannot_store_topology() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        r#"
[output.local]
type = "file"
path = {path:?}
save_topology = true
"#,
        path = dir.path().display().to_string(),
    );
    let config = Config::from_str(&toml).unwrap();

    let err = Publisher::new("beacon", &config.output, config.shipper, &registry(&MemoryStore::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, PublisherError::TopologyNotSupported { .. }));
}

#[tokio::test]
async fn test_stop_transitions_signals() {
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let config = config(&dir, "");

    let publisher = Publisher::new("beacon", &config.output, config.shipper, &registry(&store))
        .await
        .unwrap();
    let client = publisher.connect();
    client.disconnect();

    publisher.stop().await;
    assert_eq!(publisher.pipeline_state(), SignalState::Stopped);
    assert_eq!(publisher.output_state(), SignalState::Stopped);
}
