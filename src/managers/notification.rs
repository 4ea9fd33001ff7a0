//! SNS notification manager
//!
//! Publishes the run transcript to the success topic and resource errors to
//! the error topic. Topics come from the invocation event; a failed publish
//! is logged and never fails the run.

use crate::adapters::ResourceKind;
use crate::managers::rotation::RunReport;
use crate::utils::aws::{AwsContext, AwsError};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// SNS rejects messages above 256 KiB
pub const MAX_MESSAGE_BYTES: usize = 256 * 1024;

const TRUNCATION_MARKER: &str = "\n[message truncated]";

pub const ERROR_SUBJECT: &str = "Error with AWS Snapshot";

/// Abstraction over the notification channel
pub trait Publisher: Send + Sync {
    fn publish(&self, topic_arn: &str, subject: &str, message: &str) -> Result<()>;
}

/// Publisher backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    context: Arc<AwsContext>,
}

impl SnsPublisher {
    pub fn new(context: Arc<AwsContext>) -> Self {
        let client = aws_sdk_sns::Client::new(context.sdk_config());
        Self { client, context }
    }
}

impl Publisher for SnsPublisher {
    fn publish(&self, topic_arn: &str, subject: &str, message: &str) -> Result<()> {
        let output = self
            .context
            .block_on(
                self.client
                    .publish()
                    .topic_arn(topic_arn)
                    .subject(subject)
                    .message(message)
                    .send(),
            )
            .map_err(|e| AwsError::sdk("Publish", e))?;

        debug!(
            "Published message {} to {}",
            output.message_id().unwrap_or("<unknown>"),
            topic_arn
        );
        Ok(())
    }
}

/// Subject of the success summary for a resource type
pub fn success_subject(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Volume => "Finished AWS EC2 snapshotting",
        ResourceKind::Database => "Finished AWS RDS snapshotting",
    }
}

/// Lead-in of the error summary for a resource type
pub fn error_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Volume => "Error in processing volumes: ",
        ResourceKind::Database => "Error in processing RDS: ",
    }
}

/// Cut a message down to `limit` bytes on a char boundary
pub fn truncate_message(message: &str, limit: usize) -> String {
    if message.len() <= limit {
        return message.to_string();
    }

    let mut end = limit.saturating_sub(TRUNCATION_MARKER.len());
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}{}", &message[..end], TRUNCATION_MARKER)
}

pub struct NotificationManager<P: Publisher> {
    publisher: P,
    success_topic: Option<String>,
    error_topic: Option<String>,
}

impl<P: Publisher> NotificationManager<P> {
    pub fn new(publisher: P, success_topic: Option<String>, error_topic: Option<String>) -> Self {
        Self {
            publisher,
            success_topic,
            error_topic,
        }
    }

    /// Publish the outcome of a completed pass: errors first, then the transcript
    pub fn send_report(&self, kind: ResourceKind, report: &RunReport) {
        if report.has_errors() {
            if let Some(topic) = &self.error_topic {
                let message = format!("{}{}", error_prefix(kind), report.error_transcript);
                self.publish(topic, ERROR_SUBJECT, &message);
            }
        }

        if let Some(topic) = &self.success_topic {
            self.publish(topic, success_subject(kind), &report.transcript);
        }
    }

    /// Publish a pass that could not run at all
    pub fn send_run_failure(&self, kind: ResourceKind, error: &anyhow::Error) {
        if let Some(topic) = &self.error_topic {
            let message = format!("{}{:#}", error_prefix(kind), error);
            self.publish(topic, ERROR_SUBJECT, &message);
        }
    }

    fn publish(&self, topic: &str, subject: &str, message: &str) {
        let message = truncate_message(message, MAX_MESSAGE_BYTES);
        match self.publisher.publish(topic, subject, &message) {
            Ok(()) => info!("Sent '{}' notification to {}", subject, topic),
            Err(e) => warn!("Failed to send '{}' notification to {}: {:#}", subject, topic, e),
        }
    }
}

/// Mock implementation for testing
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct Published {
        pub topic: String,
        pub subject: String,
        pub message: String,
    }

    #[derive(Clone, Default)]
    pub struct MockPublisher {
        pub published: Arc<Mutex<Vec<Published>>>,
        pub should_fail: Arc<Mutex<bool>>,
    }

    impl MockPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_failure(self) -> Self {
            *self.should_fail.lock().unwrap() = true;
            self
        }

        pub fn messages(&self) -> Vec<Published> {
            self.published.lock().unwrap().clone()
        }
    }

    impl Publisher for MockPublisher {
        fn publish(&self, topic_arn: &str, subject: &str, message: &str) -> Result<()> {
            if *self.should_fail.lock().unwrap() {
                anyhow::bail!("Mock publish failure");
            }
            self.published.lock().unwrap().push(Published {
                topic: topic_arn.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            });
            Ok(())
        }
    }
}
