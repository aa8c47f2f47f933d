//! Latest published chart versions from configured chart registries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::Config;

pub const DEFAULT_ARTIFACT_HUB_URL: &str = "https://artifacthub.io";

/// Looks up the newest available version of a chart.
///
/// Implementations never fail: anything that goes wrong yields `""`.
#[async_trait]
pub trait ChartVersionResolver: Send + Sync {
    async fn latest_version(&self, chart: &str) -> String;
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RegistryConfig {
    #[serde(rename = "helmRegistries", default)]
    pub helm_registries: HelmRegistries,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmRegistries {
    #[serde(default)]
    pub override_chart_names: HashMap<String, String>,
    #[serde(default, rename = "override")]
    pub overrides: Vec<OverrideRegistry>,
    #[serde(default)]
    pub registry_names: Vec<String>,
    #[serde(default)]
    pub artifact_hub_url: Option<String>,
}

/// A classic Helm repository serving `index.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRegistry {
    pub registry: RegistryEndpoint,
    #[serde(default)]
    pub charts: Vec<String>,
    #[serde(default)]
    pub allow_all_releases: bool,
}

impl OverrideRegistry {
    fn serves(&self, chart: &str) -> bool {
        self.allow_all_releases || self.charts.iter().any(|c| c == chart)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RegistryEndpoint {
    pub url: String,
}

impl RegistryConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes to unit, not an empty mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read registry config {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("failed to parse registry config {}", path.display()))
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid repository index: {0}")]
    Index(#[from] serde_yaml::Error),
}

#[derive(Debug, Deserialize)]
struct RepoIndex {
    #[serde(default)]
    entries: HashMap<String, Vec<IndexEntry>>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactHubPackage {
    #[serde(default)]
    version: Option<String>,
}

/// Highest version in `versions`, stable releases ahead of pre-releases.
/// Strings that are not semver (after dropping a leading `v`) are ignored.
pub fn pick_latest<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<String> {
    versions
        .into_iter()
        .filter_map(|raw| {
            let parsed = Version::parse(raw.trim().trim_start_matches('v')).ok()?;
            Some((parsed.pre.is_empty(), parsed, raw))
        })
        .max_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
        .map(|(_, _, raw)| raw.to_string())
}

/// Resolver backed by `index.yaml` repositories and Artifact Hub.
pub struct RegistryResolver {
    http: reqwest::Client,
    registries: HelmRegistries,
    timeout: Duration,
}

impl RegistryResolver {
    pub fn new(config: RegistryConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build chart registry HTTP client")?;
        Ok(Self {
            http,
            registries: config.helm_registries,
            timeout,
        })
    }

    fn artifact_hub_url(&self) -> &str {
        self.registries
            .artifact_hub_url
            .as_deref()
            .unwrap_or(DEFAULT_ARTIFACT_HUB_URL)
            .trim_end_matches('/')
    }

    async fn from_index(&self, base_url: &str, chart: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/index.yaml", base_url.trim_end_matches('/'));
        let body = self.http.get(&url).send().await?.error_for_status()?.text().await?;
        let index: RepoIndex = serde_yaml::from_str(&body)?;
        Ok(index
            .entries
            .get(chart)
            .and_then(|entries| pick_latest(entries.iter().map(|e| e.version.as_str()))))
    }

    async fn from_artifact_hub(&self, repo: &str, chart: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/api/v1/packages/helm/{}/{}", self.artifact_hub_url(), repo, chart);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let package: ArtifactHubPackage = response.error_for_status()?.json().await?;
        Ok(package.version.filter(|v| !v.is_empty()))
    }

    async fn lookup(&self, chart: &str) -> Option<String> {
        let name = self.registries
            .override_chart_names
            .get(chart)
            .map(String::as_str)
            .unwrap_or(chart);

        for registry in self.registries.overrides.iter().filter(|r| r.serves(name)) {
            match self.from_index(&registry.registry.url, name).await {
                Ok(Some(version)) => return Some(version),
                Ok(None) => {}
                Err(e) => debug!(chart = name, registry = %registry.registry.url, error = %e, "chart index lookup failed"),
            }
        }

        for repo in &self.registries.registry_names {
            match self.from_artifact_hub(repo, name).await {
                Ok(Some(version)) => return Some(version),
                Ok(None) => {}
                Err(e) => debug!(chart = name, repo = %repo, error = %e, "artifact hub lookup failed"),
            }
        }
        None
    }
}

#[async_trait]
impl ChartVersionResolver for RegistryResolver {
    async fn latest_version(&self, chart: &str) -> String {
        let version = match tokio::time::timeout(self.timeout, self.lookup(chart)).await {
            Ok(found) => found.unwrap_or_default(),
            Err(_) => {
                debug!(chart, timeout = ?self.timeout, "latest chart version lookup timed out");
                String::new()
            }
        };
        debug!(chart, latest = %version, "last chart repo version");
        version
    }
}

/// Build the resolver the configuration asks for, if any.
pub fn resolver_from_config(cfg: &Config) -> Result<Option<Arc<dyn ChartVersionResolver>>> {
    if !cfg.latest_chart_version {
        return Ok(None);
    }
    let registries = match &cfg.config_file {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::default(),
    };
    let resolver = RegistryResolver::new(registries, cfg.resolver_timeout)?;
    Ok(Some(Arc::new(resolver)))
}
