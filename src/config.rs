use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use crate::types::Config;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let defaults = Config::default();

    let namespaces: Vec<String> = env.get_var("NAMESPACES")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let config_file = env.get_var("CONFIG_FILE")
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    let helm_driver = env.get_var("HELM_DRIVER")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or(defaults.helm_driver);

    let listen_address: SocketAddr = match env.get_var("LISTEN_ADDRESS") {
        Some(addr) => addr.trim().parse().context("Invalid LISTEN_ADDRESS")?,
        None => defaults.listen_address,
    };

    let list_timeout = parse_seconds(env, "LIST_TIMEOUT_SECONDS", defaults.list_timeout)?;
    let resolver_timeout = parse_seconds(env, "RESOLVER_TIMEOUT_SECONDS", defaults.resolver_timeout)?;

    let collect_concurrency: usize = env.get_var("COLLECT_CONCURRENCY")
        .map(|v| v.trim().parse::<usize>())
        .transpose()
        .context("Invalid COLLECT_CONCURRENCY")?
        .unwrap_or(defaults.collect_concurrency);
    if collect_concurrency == 0 {
        return Err(anyhow!("COLLECT_CONCURRENCY must be at least 1"));
    }

    Ok(Config {
        namespaces,
        config_file,
        info_metric: parse_flag(env, "INFO_METRIC"),
        timestamp_metric: parse_flag(env, "TIMESTAMP_METRIC"),
        latest_chart_version: parse_flag(env, "LATEST_CHART_VERSION"),
        helm_driver,
        listen_address,
        list_timeout,
        resolver_timeout,
        collect_concurrency,
    })
}

// Feature switches all default to enabled.
fn parse_flag<E: EnvironmentProvider>(env: &E, key: &str) -> bool {
    env.get_var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(true)
}

fn parse_seconds<E: EnvironmentProvider>(env: &E, key: &str, default: Duration) -> Result<Duration> {
    let Some(raw) = env.get_var(key) else {
        return Ok(default);
    };
    let secs: u64 = raw.trim()
        .parse()
        .with_context(|| format!("Invalid {}", key))?;
    if secs == 0 {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(Duration::from_secs(secs))
}
