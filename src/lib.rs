// Public modules
pub mod types;
pub mod config;
pub mod storage;
pub mod release;
pub mod registry;
pub mod kubernetes;
pub mod watcher;
pub mod chart_version;
pub mod collector;
pub mod exposition;
pub mod server;

// Re-export commonly used items
pub use types::*;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use storage::{decode_release, encode_payload, latest_revisions, DecodeError};
pub use release::{ConnectError, ListError, ReleaseClient, ReleaseClientFactory, KubeReleaseClientFactory, StorageDriver};
pub use registry::NamespaceClientRegistry;
pub use kubernetes::ensure_namespace_watch;
pub use watcher::{NamespaceEvent, NamespaceTracker, NamespaceWatcher, spawn_namespace_feed, EVENT_BUFFER};
pub use chart_version::{resolver_from_config, ChartVersionResolver, RegistryConfig, RegistryResolver};
pub use collector::{CollectorOptions, MetricsCollector};
pub use exposition::encode_samples;
