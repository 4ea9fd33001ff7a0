//! Run coordinator - turns one invocation event into rotation passes
//!
//! Resolves which resource types the event enables, drives one engine pass
//! per type (volumes first, then databases), merges the results into the
//! output payload and publishes notifications. A pass that cannot run is
//! recorded in the output and does not stop the other type.

use crate::adapters::{DatabaseAdapter, ResourceAdapter, ResourceKind, VolumeAdapter};
use crate::config::{parse_event, resolve_plan, BackupPlan, BackupRun};
use crate::managers::notification::{NotificationManager, Publisher, SnsPublisher};
use crate::managers::rotation::{EngineOptions, RetentionEngine, RunMetrics, RunReport};
use crate::utils::aws::AwsContext;
use crate::utils::ec2::{Ec2Operations, RealEc2Ops};
use crate::utils::rds::{RdsOperations, RealRdsOps};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Output key holding the merged counters
pub const METRICS_KEY: &str = "metrics";

/// Builds provider clients for a region
pub trait ProviderFactory {
    type Ec2: Ec2Operations;
    type Rds: RdsOperations;
    type Publisher: Publisher;

    fn ec2(&self, region: &str) -> Result<Self::Ec2>;

    fn rds(&self, region: &str) -> Result<Self::Rds>;

    fn publisher(&self, region: &str) -> Result<Self::Publisher>;
}

/// Factory backed by the AWS SDK. The SDK configuration is loaded on first
/// use, so a run with nothing to do never touches the credential chain.
pub struct AwsProviderFactory {
    endpoint_url: Option<String>,
    context: Mutex<Option<Arc<AwsContext>>>,
}

impl AwsProviderFactory {
    pub fn new(endpoint_url: Option<String>) -> Self {
        Self {
            endpoint_url,
            context: Mutex::new(None),
        }
    }

    fn context(&self, region: &str) -> Result<Arc<AwsContext>> {
        let mut cached = self
            .context
            .lock()
            .map_err(|_| anyhow::anyhow!("AWS context cache poisoned"))?;

        if let Some(context) = cached.as_ref().filter(|c| c.region() == region) {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(
            AwsContext::connect(region, self.endpoint_url.as_deref())
                .context("Failed to initialise AWS SDK")?,
        );
        *cached = Some(Arc::clone(&context));
        Ok(context)
    }
}

impl ProviderFactory for AwsProviderFactory {
    type Ec2 = RealEc2Ops;
    type Rds = RealRdsOps;
    type Publisher = SnsPublisher;

    fn ec2(&self, region: &str) -> Result<RealEc2Ops> {
        Ok(RealEc2Ops::new(self.context(region)?))
    }

    fn rds(&self, region: &str) -> Result<RealRdsOps> {
        Ok(RealRdsOps::new(self.context(region)?))
    }

    fn publisher(&self, region: &str) -> Result<SnsPublisher> {
        Ok(SnsPublisher::new(self.context(region)?))
    }
}

/// Process-wide settings that shape every pass
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub share_account: Option<String>,
    pub engine: EngineOptions,
    pub notifications_enabled: bool,
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOutcome {
    /// Input payload enriched with metrics and transcripts
    pub output: Value,
    /// Resource types whose pass could not run
    pub failures: Vec<ResourceKind>,
}

impl CoordinatorOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RunCoordinator<F: ProviderFactory> {
    factory: F,
    settings: RunSettings,
    now: fn() -> DateTime<Utc>,
}

impl<F: ProviderFactory> RunCoordinator<F> {
    pub fn new(factory: F, settings: RunSettings) -> Self {
        Self {
            factory,
            settings,
            now: Utc::now,
        }
    }

    /// Replace the wall clock used for the date suffix and transcripts
    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Parse, resolve and execute a raw event
    pub fn execute(&self, payload: Value) -> Result<CoordinatorOutcome> {
        let event = parse_event(&payload).context("Invalid invocation event")?;
        let plan = resolve_plan(&event, (self.now)()).context("Invalid invocation event")?;
        self.execute_plan(payload, &plan)
    }

    /// Execute an already resolved plan, writing results into `payload`
    pub fn execute_plan(&self, payload: Value, plan: &BackupPlan) -> Result<CoordinatorOutcome> {
        if plan.is_noop() {
            info!("No tag filter configured, nothing to do");
            return Ok(CoordinatorOutcome {
                output: payload,
                failures: Vec::new(),
            });
        }

        let Value::Object(mut output) = payload else {
            anyhow::bail!("Invocation event must be a JSON object");
        };

        let notifier = self.notifier(plan);
        let mut metrics = RunMetrics::default();
        let mut failures = Vec::new();

        if let Some(filter) = &plan.volume_filter {
            let run = plan.run_for(filter);
            let result = self
                .factory
                .ec2(&plan.region)
                .context("Failed to create EC2 client")
                .and_then(|ops| {
                    self.run_pass(&run, &VolumeAdapter::new(ops, self.settings.share_account.clone()))
                });
            self.record(ResourceKind::Volume, result, &mut output, &mut metrics, &mut failures, notifier.as_ref());
        }

        if let Some(filter) = &plan.database_filter {
            let run = plan.run_for(filter);
            let result = self
                .factory
                .rds(&plan.region)
                .context("Failed to create RDS client")
                .and_then(|ops| {
                    self.run_pass(&run, &DatabaseAdapter::new(ops, self.settings.share_account.clone()))
                });
            self.record(ResourceKind::Database, result, &mut output, &mut metrics, &mut failures, notifier.as_ref());
        }

        output.insert(
            METRICS_KEY.to_string(),
            serde_json::to_value(metrics).context("Failed to serialize metrics")?,
        );

        Ok(CoordinatorOutcome {
            output: Value::Object(output),
            failures,
        })
    }

    fn run_pass<A: ResourceAdapter>(&self, run: &BackupRun, adapter: &A) -> Result<RunReport> {
        RetentionEngine::new(run, self.settings.engine)
            .with_clock(self.now)
            .run(adapter)
    }

    /// Notification manager for the plan's topics, if any are usable
    fn notifier(&self, plan: &BackupPlan) -> Option<NotificationManager<F::Publisher>> {
        if plan.success_topic.is_none() && plan.error_topic.is_none() {
            return None;
        }

        if !self.settings.notifications_enabled {
            info!("Notifications disabled in configuration");
            return None;
        }

        if self.settings.engine.dry_run {
            info!("Dry run: notifications will not be sent");
            return None;
        }

        match self.factory.publisher(&plan.region) {
            Ok(publisher) => Some(NotificationManager::new(
                publisher,
                plan.success_topic.clone(),
                plan.error_topic.clone(),
            )),
            Err(e) => {
                warn!("Failed to create SNS client, notifications disabled: {:#}", e);
                None
            }
        }
    }

    fn record(
        &self,
        kind: ResourceKind,
        result: Result<RunReport>,
        output: &mut Map<String, Value>,
        metrics: &mut RunMetrics,
        failures: &mut Vec<ResourceKind>,
        notifier: Option<&NotificationManager<F::Publisher>>,
    ) {
        match result {
            Ok(report) => {
                metrics.merge(&report.metrics);
                if let Some(notifier) = notifier {
                    notifier.send_report(kind, &report);
                }
                output.insert(
                    format!("{}_backup_result", kind.output_prefix()),
                    Value::String(report.transcript),
                );
            }
            Err(e) => {
                error!("{} rotation failed: {:#}", kind, e);
                if let Some(notifier) = notifier {
                    notifier.send_run_failure(kind, &e);
                }
                output.insert(
                    format!("{}_backup_error", kind.output_prefix()),
                    Value::String(format!("{:#}", e)),
                );
                failures.push(kind);
            }
        }
    }
}
