//! Shared AWS plumbing
//!
//! The SDK clients are async. Rotation is strictly sequential, so every
//! provider call is driven to completion on a single current-thread runtime
//! owned by [`AwsContext`], giving the rest of the crate a blocking API.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ec2::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// User tags of a resource or snapshot, ordered by key
pub type TagSet = BTreeMap<String, String>;

/// Tag namespace reserved by the provider
pub const RESERVED_TAG_PREFIX: &str = "aws:";

#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Failed to start AWS runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("{operation} failed: {message}")]
    Sdk {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl AwsError {
    /// Wrap an SDK error, keeping the whole source chain in the message
    pub fn sdk<E: std::error::Error>(operation: &'static str, err: E) -> Self {
        Self::Sdk {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

/// Region-bound SDK configuration plus the runtime that drives it
pub struct AwsContext {
    runtime: Runtime,
    sdk_config: SdkConfig,
    region: String,
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsContext {
    /// Load the default credential chain for `region`
    pub fn connect(region: &str, endpoint_url: Option<&str>) -> Result<Self, AwsError> {
        info!("Connecting to AWS in region {}", region);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()));

        if let Some(url) = endpoint_url {
            debug!("Using custom AWS endpoint: {}", url);
            loader = loader.endpoint_url(url);
        }

        let sdk_config = runtime.block_on(loader.load());

        Ok(Self {
            runtime,
            sdk_config,
            region: region.to_string(),
        })
    }

    /// Run one SDK future to completion
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Convert an SDK timestamp, dropping values chrono cannot represent
pub fn to_utc(timestamp: &aws_sdk_ec2::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

/// Keep user tags only, dropping the provider-reserved namespace
pub fn user_tags<I, K, V>(tags: I) -> TagSet
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    tags.into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, _)| !k.starts_with(RESERVED_TAG_PREFIX))
        .collect()
}
