use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::{api::ListParams, Api, Client};

pub fn namespace_api(client: &Client) -> Api<Namespace> {
    Api::all(client.clone())
}

/// Fail fast when the cluster cannot be asked about namespaces at all.
/// Watching every namespace is impossible without this permission.
pub async fn ensure_namespace_watch(client: &Client) -> Result<()> {
    namespace_api(client)
        .list(&ListParams::default().limit(1))
        .await
        .context("cannot list namespaces; watching all namespaces requires list/watch on namespaces")?;
    Ok(())
}
