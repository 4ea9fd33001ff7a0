//! Fluent API for building invocation events

use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Builder for scheduler invocation events
#[derive(Debug, Clone)]
pub struct EventBuilder {
    fields: Map<String, Value>,
}

impl EventBuilder {
    /// Event with the required fields and no tag filters
    pub fn new(period: &str, period_format: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("period_label".to_string(), json!(period));
        fields.insert("period_format".to_string(), json!(period_format));
        fields.insert("region_name".to_string(), json!("ap-southeast-2"));
        fields.insert("keep_count".to_string(), json!(3));
        Self { fields }
    }

    /// The usual daily schedule, suffix is weekday + hour
    pub fn daily() -> Self {
        Self::new("day", "%a%H")
    }

    pub fn weekly() -> Self {
        Self::new("week", "%U")
    }

    pub fn region(self, region: &str) -> Self {
        self.field("region_name", json!(region))
    }

    pub fn keep(self, keep_count: u32) -> Self {
        self.field("keep_count", json!(keep_count))
    }

    pub fn ec2_tag(self, name: &str, value: &str) -> Self {
        self.field("ec2_tag_name", json!(name))
            .field("ec2_tag_value", json!(value))
    }

    pub fn rds_tag(self, name: &str, value: &str) -> Self {
        self.field("rds_tag_name", json!(name))
            .field("rds_tag_value", json!(value))
    }

    pub fn success_topic(self, arn: &str) -> Self {
        self.field("arn", json!(arn))
    }

    pub fn error_topic(self, arn: &str) -> Self {
        self.field("error_arn", json!(arn))
    }

    /// Set any field, including ones the rotator does not know about
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }

    /// Write the event as JSON into `dir` and return the file path
    pub fn write_to(self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let contents =
            serde_json::to_string_pretty(&self.build()).expect("Failed to serialize event");
        fs::write(&path, contents).expect("Failed to write event file");
        path
    }
}
