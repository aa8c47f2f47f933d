use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Port the exporter has always listened on.
pub const DEFAULT_PORT: u16 = 9571;

/// Code reported for statuses outside the fixed table.
pub const DEFAULT_STATUS_CODE: f64 = 0.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// Static namespace list. Empty means every namespace is watched.
    pub namespaces: Vec<String>,
    pub config_file: Option<PathBuf>,
    pub info_metric: bool,
    pub timestamp_metric: bool,
    pub latest_chart_version: bool,
    pub helm_driver: String,
    pub listen_address: SocketAddr,
    pub list_timeout: Duration,
    pub resolver_timeout: Duration,
    pub collect_concurrency: usize,
}

impl Config {
    pub fn is_dynamic(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespaces: Vec::new(),
            config_file: None,
            info_metric: true,
            timestamp_metric: true,
            latest_chart_version: true,
            helm_driver: "secret".to_string(),
            listen_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            list_timeout: Duration::from_secs(10),
            resolver_timeout: Duration::from_secs(5),
            collect_concurrency: 8,
        }
    }
}

/// Lifecycle states a Helm release can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "deployed" => Some(Self::Deployed),
            "uninstalled" => Some(Self::Uninstalled),
            "superseded" => Some(Self::Superseded),
            "failed" => Some(Self::Failed),
            "uninstalling" => Some(Self::Uninstalling),
            "pending-install" => Some(Self::PendingInstall),
            "pending-upgrade" => Some(Self::PendingUpgrade),
            "pending-rollback" => Some(Self::PendingRollback),
            _ => None,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Deployed => 1.0,
            Self::Uninstalled => 2.0,
            Self::Superseded => 3.0,
            Self::Failed => -1.0,
            Self::Uninstalling => 5.0,
            Self::PendingInstall => 6.0,
            Self::PendingUpgrade => 7.0,
            Self::PendingRollback => 8.0,
        }
    }
}

/// Numeric code for a raw status string, falling back to [`DEFAULT_STATUS_CODE`].
pub fn status_code(status: &str) -> f64 {
    ReleaseStatus::parse(status)
        .map(ReleaseStatus::code)
        .unwrap_or(DEFAULT_STATUS_CODE)
}

/// A Helm release as read from cluster storage on a single scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Release {
    pub chart: String,
    pub name: String,
    pub version: String,
    pub app_version: String,
    pub status: String,
    pub namespace: String,
    pub revision: i64,
    pub last_deployed_millis: i64,
    pub latest_version: String,
}

impl Release {
    pub fn last_deployed_seconds(&self) -> i64 {
        self.last_deployed_millis.div_euclid(1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseMetric {
    Revisions,
    Info,
    Timestamp,
}

impl ReleaseMetric {
    pub fn name(self) -> &'static str {
        match self {
            Self::Revisions => "helm_chart_all_releases_total",
            Self::Info => "helm_chart_info",
            Self::Timestamp => "helm_chart_timestamp",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Self::Revisions => "Total Number of all Helm releases",
            Self::Info => "Information on helm releases",
            Self::Timestamp => "Timestamps of helm releases",
        }
    }

    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Self::Revisions => &["chart", "release", "namespace"],
            Self::Info | Self::Timestamp => &[
                "chart",
                "release",
                "version",
                "appVersion",
                "updated",
                "namespace",
                "latestVersion",
            ],
        }
    }
}

/// One observation; label values follow [`ReleaseMetric::label_names`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric: ReleaseMetric,
    pub value: f64,
    pub labels: Vec<String>,
}

impl MetricSample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric
            .label_names()
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}
