use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use helm_release_exporter::{
    ensure_namespace_watch, load_config, resolver_from_config, server, spawn_namespace_feed,
    CollectorOptions, KubeReleaseClientFactory, MetricsCollector, NamespaceClientRegistry,
    NamespaceWatcher, ReleaseClientFactory, EVENT_BUFFER,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!("namespaces = {:?}", cfg.namespaces);

    let client = Client::try_default()
        .await
        .context("failed to build kubernetes client")?;

    let registry = NamespaceClientRegistry::new();
    let factory: Arc<dyn ReleaseClientFactory> =
        Arc::new(KubeReleaseClientFactory::new(client.clone(), &cfg.helm_driver));
    let watcher = Arc::new(NamespaceWatcher::new(registry.clone(), factory));
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    if cfg.is_dynamic() {
        // Without the namespace watch there is nothing to export
        ensure_namespace_watch(&client).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tasks.push(spawn_namespace_feed(&client, tx, cancel.clone()));
        let watcher = watcher.clone();
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move { watcher.run(rx, token).await }));
    } else {
        watcher.connect_static(&cfg.namespaces).await;
    }

    let resolver = resolver_from_config(&cfg)?;
    let collector = Arc::new(MetricsCollector::new(
        registry,
        CollectorOptions::from(&cfg),
        resolver,
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    let served = server::serve(cfg.listen_address, server::router(collector), cancel.clone()).await;
    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task did not shut down cleanly");
        }
    }
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
