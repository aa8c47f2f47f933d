use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chart_version::ChartVersionResolver;
use crate::exposition::encode_samples;
use crate::registry::NamespaceClientRegistry;
use crate::release::{ListError, ReleaseClient};
use crate::types::*;

/// Per-scrape collection settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub info_metric: bool,
    pub timestamp_metric: bool,
    pub list_timeout: Duration,
    pub resolver_timeout: Duration,
    pub concurrency: usize,
}

impl From<&Config> for CollectorOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            info_metric: cfg.info_metric,
            timestamp_metric: cfg.timestamp_metric,
            list_timeout: cfg.list_timeout,
            resolver_timeout: cfg.resolver_timeout,
            concurrency: cfg.collect_concurrency.max(1),
        }
    }
}

/// Builds the release metrics on demand, one full pass per scrape.
pub struct MetricsCollector {
    registry: NamespaceClientRegistry,
    resolver: Option<Arc<dyn ChartVersionResolver>>,
    options: CollectorOptions,
}

impl MetricsCollector {
    pub fn new(
        registry: NamespaceClientRegistry,
        options: CollectorOptions,
        resolver: Option<Arc<dyn ChartVersionResolver>>,
    ) -> Self {
        Self { registry, resolver, options }
    }

    /// Collect samples for every namespace in the current registry snapshot.
    ///
    /// Namespaces are listed concurrently; one namespace failing only drops
    /// that namespace's samples.
    pub async fn collect(&self) -> Vec<MetricSample> {
        let snapshot = self.registry.snapshot();
        debug!(namespaces = snapshot.len(), "collecting helm release metrics");

        // Futures are built up front so the scrape future stays Send for axum.
        let mut pending: Vec<BoxFuture<'_, Vec<MetricSample>>> = Vec::with_capacity(snapshot.len());
        for (namespace, client) in snapshot {
            pending.push(self.collect_namespace(namespace, client).boxed());
        }

        let per_namespace: Vec<Vec<MetricSample>> = stream::iter(pending)
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        per_namespace.into_iter().flatten().collect()
    }

    /// Collect and render in the Prometheus text format.
    pub async fn render(&self) -> prometheus::Result<String> {
        encode_samples(&self.collect().await)
    }

    async fn collect_namespace(&self, namespace: String, client: Arc<dyn ReleaseClient>) -> Vec<MetricSample> {
        let releases = match self.list_with_timeout(&namespace, client.as_ref()).await {
            Ok(releases) => releases,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "got error while listing releases");
                return Vec::new();
            }
        };

        let mut samples = Vec::with_capacity(releases.len() * 3);
        for mut release in releases {
            release.latest_version = self.latest_version(&release.chart).await;
            samples.extend(self.release_samples(&release));
        }
        samples
    }

    async fn list_with_timeout(&self, namespace: &str, client: &dyn ReleaseClient) -> Result<Vec<Release>, ListError> {
        match tokio::time::timeout(self.options.list_timeout, client.list_releases()).await {
            Ok(result) => result,
            Err(_) => Err(ListError::Timeout {
                namespace: namespace.to_string(),
                timeout: self.options.list_timeout,
            }),
        }
    }

    async fn latest_version(&self, chart: &str) -> String {
        let Some(resolver) = &self.resolver else {
            return String::new();
        };
        match tokio::time::timeout(self.options.resolver_timeout, resolver.latest_version(chart)).await {
            Ok(version) => version,
            Err(_) => {
                debug!(chart, "latest chart version lookup timed out");
                String::new()
            }
        }
    }

    /// Samples for a single release, honouring the metric switches.
    pub fn release_samples(&self, release: &Release) -> Vec<MetricSample> {
        let mut samples = vec![MetricSample {
            metric: ReleaseMetric::Revisions,
            value: release.revision as f64,
            labels: vec![
                release.chart.clone(),
                release.name.clone(),
                release.namespace.clone(),
            ],
        }];

        if !self.options.info_metric && !self.options.timestamp_metric {
            return samples;
        }

        let labels = vec![
            release.chart.clone(),
            release.name.clone(),
            release.version.clone(),
            release.app_version.clone(),
            release.last_deployed_millis.to_string(),
            release.namespace.clone(),
            release.latest_version.clone(),
        ];

        if self.options.info_metric {
            samples.push(MetricSample {
                metric: ReleaseMetric::Info,
                value: status_code(&release.status),
                labels: labels.clone(),
            });
        }
        if self.options.timestamp_metric {
            samples.push(MetricSample {
                metric: ReleaseMetric::Timestamp,
                value: release.last_deployed_seconds() as f64,
                labels,
            });
        }
        samples
    }
}
