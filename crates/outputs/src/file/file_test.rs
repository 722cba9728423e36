//! Tests for the file output

use std::time::Duration;

use beacon_publisher::{Event, Message};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;

fn event(n: i64) -> Event {
    Event::new().with("n", n)
}

fn context<'a>(settings: &'a toml::Table) -> OutputContext<'a> {
    OutputContext {
        agent_name: "beacon",
        output_name: "local",
        settings,
        topology_expire: Duration::from_secs(15),
    }
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Size in bytes of the JSON line for `event(n)`
fn line_len(n: i64) -> u64 {
    serde_json::to_vec(&event(n)).unwrap().len() as u64 + 1
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults() {
    let settings: toml::Table = toml::from_str("path = \"/var/log/beacon\"").unwrap();
    let config = FileConfig::from_context(&context(&settings)).unwrap();

    assert_eq!(config.path, PathBuf::from("/var/log/beacon"));
    assert_eq!(config.filename, "beacon");
    assert_eq!(config.rotate_every_bytes, 10240 * 1024);
    assert_eq!(config.number_of_files, 7);
    assert_eq!(config.active_path(), PathBuf::from("/var/log/beacon/beacon"));
    assert_eq!(config.rotated_path(3), PathBuf::from("/var/log/beacon/beacon.3"));
}

#[test]
fn test_config_explicit() {
    let settings: toml::Table = toml::from_str(
        "path = \"/data\"\nfilename = \"events\"\nrotate_every_kb = 1\nnumber_of_files = 2",
    )
    .unwrap();
    let config = FileConfig::from_context(&context(&settings)).unwrap();

    assert_eq!(config, FileConfig::new("/data", "events").with_rotate_every_bytes(1024).with_number_of_files(2));
}

#[test]
fn test_config_path_required() {
    let settings = toml::Table::new();
    let err = FileConfig::from_context(&context(&settings)).unwrap_err();
    assert!(matches!(err, OutputError::Config(_)));
    assert!(err.to_string().contains("path"));
}

#[test]
fn test_config_number_of_files_bounds() {
    for files in [0, 1, 1025] {
        let settings: toml::Table =
            toml::from_str(&format!("path = \"/data\"\nnumber_of_files = {files}")).unwrap();
        let err = FileConfig::from_context(&context(&settings)).unwrap_err();
        assert!(err.to_string().contains("number_of_files"), "{files}: {err}");
        assert!(err.to_string().contains("local"));
    }
}

#[test]
fn test_config_rejects_zero_size_and_separator() {
    assert!(FileConfig::new("/data", "events").with_rotate_every_bytes(0).validate().is_err());
    assert!(FileConfig::new("/data", "a/b").validate().is_err());
    assert!(FileConfig::new("", "events").validate().is_err());
}

// ============================================================================
// Output
// ============================================================================

#[tokio::test]
async fn test_appends_json_lines() {
    let dir = TempDir::new().unwrap();
    let output = FileOutput::new(FileConfig::new(dir.path(), "beacon")).unwrap();

    output
        .send(&[Message::event(event(1)), Message::batch(vec![event(2), event(3)])])
        .await
        .unwrap();
    output.send(&[Message::event(event(4))]).await.unwrap();

    let lines = read_lines(&dir.path().join("beacon"));
    assert_eq!(lines, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3}), json!({"n": 4})]);
    assert_eq!(output.metrics().lines_written(), 4);
    assert_eq!(output.metrics().rotations(), 0);
}

#[tokio::test]
async fn test_creates_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let output = FileOutput::new(FileConfig::new(&nested, "beacon")).unwrap();

    output.send(&[Message::event(event(1))]).await.unwrap();
    assert!(nested.join("beacon").is_file());
}

#[tokio::test]
async fn test_appends_to_existing_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("beacon"), "{\"n\":0}\n").unwrap();

    let output = FileOutput::new(FileConfig::new(dir.path(), "beacon")).unwrap();
    output.send(&[Message::event(event(1))]).await.unwrap();

    let lines = read_lines(&dir.path().join("beacon"));
    assert_eq!(lines, vec![json!({"n": 0}), json!({"n": 1})]);
}

#[tokio::test]
async fn test_rotation() {
    let dir = TempDir::new().unwrap();
    // room for exactly two lines per file
    let config = FileConfig::new(dir.path(), "beacon")
        .with_rotate_every_bytes(line_len(0) * 2)
        .with_number_of_files(3);
    let output = FileOutput::new(config).unwrap();

    for n in 0..7 {
        output.send(&[Message::event(event(n))]).await.unwrap();
    }

    // 7 lines over files of 2: [0,1] [2,3] [4,5] [6]; the oldest pair is gone
    assert_eq!(read_lines(&dir.path().join("beacon")), vec![json!({"n": 6})]);
    assert_eq!(
        read_lines(&dir.path().join("beacon.1")),
        vec![json!({"n": 4}), json!({"n": 5})]
    );
    assert_eq!(
        read_lines(&dir.path().join("beacon.2")),
        vec![json!({"n": 2}), json!({"n": 3})]
    );
    assert!(!dir.path().join("beacon.3").exists());
    assert_eq!(output.metrics().rotations(), 3);
}

#[tokio::test]
async fn test_oversized_line_goes_to_fresh_file() {
    let dir = TempDir::new().unwrap();
    let config = FileConfig::new(dir.path(), "beacon").with_rotate_every_bytes(4);
    let output = FileOutput::new(config).unwrap();

    output.send(&[Message::event(event(1))]).await.unwrap();
    output.send(&[Message::event(event(2))]).await.unwrap();

    assert_eq!(read_lines(&dir.path().join("beacon")), vec![json!({"n": 2})]);
    assert_eq!(read_lines(&dir.path().join("beacon.1")), vec![json!({"n": 1})]);
}

#[tokio::test]
async fn test_close_flushes_and_reopens() {
    let dir = TempDir::new().unwrap();
    let output = FileOutput::new(FileConfig::new(dir.path(), "beacon")).unwrap();

    output.send(&[Message::event(event(1))]).await.unwrap();
    output.close().await.unwrap();
    assert_eq!(read_lines(&dir.path().join("beacon")).len(), 1);

    // a write after close reopens the file in append mode
    output.send(&[Message::event(event(2))]).await.unwrap();
    assert_eq!(read_lines(&dir.path().join("beacon")).len(), 2);
}

// ============================================================================
// Factory
// ============================================================================

#[test]
fn test_factory() {
    let dir = TempDir::new().unwrap();
    let settings: toml::Table =
        toml::from_str(&format!("path = {:?}", dir.path().display().to_string())).unwrap();

    assert_eq!(FileFactory.name(), "file");
    assert!(FileFactory.dry_run_exempt());
    let output = FileFactory.create(&context(&settings)).unwrap();
    assert!(output.topology().is_none());
}
