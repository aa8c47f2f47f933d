use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ListParams;
use kube::{Api, Client};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::{decode_release, latest_revisions, DecodeError, HELM_OWNER_SELECTOR, RELEASE_DATA_KEY};
use crate::types::Release;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot reach helm storage backend for namespace {namespace}: {source}")]
    BackendUnreachable {
        namespace: String,
        #[source]
        source: kube::Error,
    },
    #[error("namespace {namespace} is not usable for helm release listing: {reason}")]
    NamespaceUnusable { namespace: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("failed to list helm release records in namespace {namespace}: {source}")]
    Api {
        namespace: String,
        #[source]
        source: kube::Error,
    },
    #[error("listing releases in namespace {namespace} timed out after {timeout:?}")]
    Timeout { namespace: String, timeout: Duration },
}

/// Lists the Helm releases of a single namespace.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    async fn list_releases(&self) -> Result<Vec<Release>, ListError>;
}

/// Builds namespace-scoped [`ReleaseClient`]s.
#[async_trait]
pub trait ReleaseClientFactory: Send + Sync {
    async fn connect(&self, namespace: &str) -> Result<Arc<dyn ReleaseClient>, ConnectError>;
}

/// Kubernetes object kind Helm stores release records in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriver {
    Secrets,
    ConfigMaps,
}

impl StorageDriver {
    /// Map a `HELM_DRIVER` value to a driver. `memory` and `sql` are not
    /// readable from here.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "secret" | "secrets" => Some(Self::Secrets),
            "configmap" | "configmaps" => Some(Self::ConfigMaps),
            _ => None,
        }
    }
}

/// Reads release records straight from the Helm storage objects.
pub struct HelmStorageClient {
    client: Client,
    namespace: String,
    driver: StorageDriver,
}

impl HelmStorageClient {
    pub fn new(client: Client, namespace: impl Into<String>, driver: StorageDriver) -> Self {
        Self { client, namespace: namespace.into(), driver }
    }

    fn decode_records<'a>(&self, payloads: impl Iterator<Item = (Option<&'a str>, Option<&'a [u8]>)>) -> Vec<Release> {
        let mut releases = Vec::new();
        for (object, payload) in payloads {
            let decoded = payload
                .ok_or(DecodeError::MissingPayload)
                .and_then(decode_release);
            match decoded {
                Ok(mut release) => {
                    if release.namespace.is_empty() {
                        release.namespace = self.namespace.clone();
                    }
                    releases.push(release);
                }
                Err(e) => warn!(
                    namespace = %self.namespace,
                    object = object.unwrap_or("<unnamed>"),
                    error = %e,
                    "skipping undecodable helm release record"
                ),
            }
        }
        latest_revisions(releases)
    }
}

#[async_trait]
impl ReleaseClient for HelmStorageClient {
    async fn list_releases(&self) -> Result<Vec<Release>, ListError> {
        let lp = ListParams::default().labels(HELM_OWNER_SELECTOR);
        let to_list_error = |source| ListError::Api { namespace: self.namespace.clone(), source };

        let releases = match self.driver {
            StorageDriver::Secrets => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
                let secrets = list_records(&api, &lp).await.map_err(to_list_error)?;
                self.decode_records(secrets.iter().map(|s| {
                    let payload = s.data.as_ref()
                        .and_then(|d| d.get(RELEASE_DATA_KEY))
                        .map(|b| b.0.as_slice());
                    (s.metadata.name.as_deref(), payload)
                }))
            }
            StorageDriver::ConfigMaps => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
                let maps = list_records(&api, &lp).await.map_err(to_list_error)?;
                self.decode_records(maps.iter().map(|m| {
                    let payload = m.data.as_ref()
                        .and_then(|d| d.get(RELEASE_DATA_KEY))
                        .map(|s| s.as_bytes());
                    (m.metadata.name.as_deref(), payload)
                }))
            }
        };

        debug!(namespace = %self.namespace, count = releases.len(), "listed helm releases");
        Ok(releases)
    }
}

async fn list_records<K>(api: &Api<K>, lp: &ListParams) -> Result<Vec<K>, kube::Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    Ok(api.list(lp).await?.items)
}

/// Connects namespaces against the cluster's Helm storage.
pub struct KubeReleaseClientFactory {
    client: Client,
    driver: Option<StorageDriver>,
    driver_name: String,
}

impl KubeReleaseClientFactory {
    pub fn new(client: Client, helm_driver: &str) -> Self {
        Self {
            client,
            driver: StorageDriver::parse(helm_driver),
            driver_name: helm_driver.to_string(),
        }
    }

    // Cheap list so that RBAC or API failures surface at connect time.
    async fn probe(&self, namespace: &str, driver: StorageDriver) -> Result<(), kube::Error> {
        let lp = ListParams::default().labels(HELM_OWNER_SELECTOR).limit(1);
        match driver {
            StorageDriver::Secrets => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                list_records(&api, &lp).await.map(|_| ())
            }
            StorageDriver::ConfigMaps => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                list_records(&api, &lp).await.map(|_| ())
            }
        }
    }
}

#[async_trait]
impl ReleaseClientFactory for KubeReleaseClientFactory {
    async fn connect(&self, namespace: &str) -> Result<Arc<dyn ReleaseClient>, ConnectError> {
        if namespace.trim().is_empty() {
            return Err(ConnectError::NamespaceUnusable {
                namespace: namespace.to_string(),
                reason: "empty namespace name".to_string(),
            });
        }
        let driver = self.driver.ok_or_else(|| ConnectError::NamespaceUnusable {
            namespace: namespace.to_string(),
            reason: format!("unsupported helm storage driver {:?}", self.driver_name),
        })?;

        self.probe(namespace, driver)
            .await
            .map_err(|e| classify_connect_error(namespace, e))?;

        Ok(Arc::new(HelmStorageClient::new(self.client.clone(), namespace, driver)))
    }
}

/// Permission and not-found answers mean the namespace itself is unusable;
/// everything else is a backend problem.
pub fn classify_connect_error(namespace: &str, error: kube::Error) -> ConnectError {
    match error {
        kube::Error::Api(resp) if resp.code == 403 || resp.code == 404 => ConnectError::NamespaceUnusable {
            namespace: namespace.to_string(),
            reason: resp.message,
        },
        other => ConnectError::BackendUnreachable {
            namespace: namespace.to_string(),
            source: other,
        },
    }
}
