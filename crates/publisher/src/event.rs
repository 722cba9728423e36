//! Event model
//!
//! An [`Event`] is one structured record (a log line, a metric sample): an
//! unordered mapping of field name to JSON value.

use beacon_config::EventMetadata;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the event timestamp
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Field holding the publishing agent's identity
pub const BEAT_FIELD: &str = "beat";

/// Field holding tags
pub const TAGS_FIELD: &str = "tags";

/// Field holding user-defined fields when not placed at the root
pub const FIELDS_FIELD: &str = "fields";

/// One structured record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Create an empty event
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Check if a field is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the event has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying map
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Event {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Event {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Identity of the publishing agent, stamped under `beat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatInfo {
    /// Node name (configured name or host name)
    pub name: String,
    /// Host name as reported by the operating system
    pub hostname: String,
}

/// Stamp timestamp, agent identity and global metadata onto an event
///
/// Existing `@timestamp` and `beat` values are kept. Tags are appended without
/// duplicates. Fields go under `fields` (merged with what is there) or, with
/// `fields_under_root`, to the root where they overwrite.
pub fn annotate(event: &mut Event, beat: &BeatInfo, metadata: &EventMetadata) {
    let map = &mut event.0;

    if !map.contains_key(TIMESTAMP_FIELD) {
        map.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    if !map.contains_key(BEAT_FIELD) {
        let mut info = Map::new();
        info.insert("name".to_string(), Value::String(beat.name.clone()));
        info.insert("hostname".to_string(), Value::String(beat.hostname.clone()));
        map.insert(BEAT_FIELD.to_string(), Value::Object(info));
    }

    if !metadata.tags.is_empty() {
        let tags = map
            .entry(TAGS_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = tags {
            for tag in &metadata.tags {
                let tag = Value::String(tag.clone());
                if !list.contains(&tag) {
                    list.push(tag);
                }
            }
        }
    }

    if metadata.fields.is_empty() {
        return;
    }

    if metadata.fields_under_root {
        for (key, value) in &metadata.fields {
            map.insert(key.clone(), value.clone());
        }
        return;
    }

    let fields = map
        .entry(FIELDS_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(obj) = fields {
        for (key, value) in &metadata.fields {
            obj.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn beat() -> BeatInfo {
        BeatInfo {
            name: "edge-01".into(),
            hostname: "host-a".into(),
        }
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new().with("message", "hello").with("count", 3);
        assert_eq!(event.len(), 2);
        assert_eq!(event.get("message"), Some(&json!("hello")));
        assert_eq!(event.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_event_serializes_as_plain_object() {
        let event = Event::new().with("a", 1);
        assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_annotate_adds_timestamp_and_beat() {
        let mut event = Event::new().with("message", "x");
        annotate(&mut event, &beat(), &EventMetadata::default());

        assert!(event.contains_key(TIMESTAMP_FIELD));
        assert_eq!(
            event.get(BEAT_FIELD),
            Some(&json!({"name": "edge-01", "hostname": "host-a"}))
        );
        assert!(!event.contains_key(TAGS_FIELD));
        assert!(!event.contains_key(FIELDS_FIELD));
    }

    #[test]
    fn test_annotate_keeps_existing_timestamp() {
        let mut event = Event::new().with(TIMESTAMP_FIELD, "2020-01-01T00:00:00.000Z");
        annotate(&mut event, &beat(), &EventMetadata::default());
        assert_eq!(
            event.get(TIMESTAMP_FIELD),
            Some(&json!("2020-01-01T00:00:00.000Z"))
        );
    }

    #[test]
    fn test_annotate_tags_deduplicated() {
        let metadata = EventMetadata {
            tags: vec!["web".into(), "eu".into()],
            ..Default::default()
        };
        let mut event = Event::new().with(TAGS_FIELD, json!(["web"]));
        annotate(&mut event, &beat(), &metadata);
        assert_eq!(event.get(TAGS_FIELD), Some(&json!(["web", "eu"])));
    }

    #[test]
    fn test_annotate_fields_nested() {
        let mut fields = Map::new();
        fields.insert("env".into(), json!("prod"));
        let metadata = EventMetadata {
            fields,
            ..Default::default()
        };

        let mut event = Event::new().with(FIELDS_FIELD, json!({"env": "dev", "team": "core"}));
        annotate(&mut event, &beat(), &metadata);
        // event-level fields win when nested
        assert_eq!(
            event.get(FIELDS_FIELD),
            Some(&json!({"env": "dev", "team": "core"}))
        );

        let mut bare = Event::new();
        annotate(&mut bare, &beat(), &metadata);
        assert_eq!(bare.get(FIELDS_FIELD), Some(&json!({"env": "prod"})));
    }

    #[test]
    fn test_annotate_fields_under_root() {
        let mut fields = Map::new();
        fields.insert("env".into(), json!("prod"));
        let metadata = EventMetadata {
            fields,
            fields_under_root: true,
            tags: Vec::new(),
        };

        let mut event = Event::new().with("env", "dev");
        annotate(&mut event, &beat(), &metadata);
        assert_eq!(event.get("env"), Some(&json!("prod")));
        assert!(!event.contains_key(FIELDS_FIELD));
    }
}
