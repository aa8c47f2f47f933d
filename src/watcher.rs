//! Keeps the namespace registry in step with the cluster.
//!
//! The Kubernetes watch stream is turned into [`NamespaceEvent`]s by a feed
//! task, and [`NamespaceWatcher::run`] applies them one at a time. Both
//! stop when their [`CancellationToken`] is cancelled. Dropping the watch
//! stream closes the underlying HTTP watch connection.

use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::kubernetes::namespace_api;
use crate::registry::NamespaceClientRegistry;
use crate::release::ReleaseClientFactory;

/// Buffer between the watch feed and the apply loop.
pub const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceEvent {
    Added(String),
    Removed(String),
}

pub struct NamespaceWatcher {
    registry: NamespaceClientRegistry,
    factory: Arc<dyn ReleaseClientFactory>,
}

impl NamespaceWatcher {
    pub fn new(registry: NamespaceClientRegistry, factory: Arc<dyn ReleaseClientFactory>) -> Self {
        Self { registry, factory }
    }

    /// Try to connect `namespace` and install it. Returns whether it is now watched.
    pub async fn connect(&self, namespace: &str) -> bool {
        match self.factory.connect(namespace).await {
            Ok(client) => {
                self.registry.set(namespace, client);
                info!(namespace, "watching namespace");
                true
            }
            Err(e) => {
                warn!(namespace, error = %e, "failed to connect to namespace");
                false
            }
        }
    }

    pub async fn apply(&self, event: NamespaceEvent) {
        match event {
            // Re-adding a known namespace replaces its client.
            NamespaceEvent::Added(ns) => {
                self.connect(&ns).await;
            }
            NamespaceEvent::Removed(ns) => {
                info!(namespace = %ns, "removing namespace");
                self.registry.remove(&ns);
            }
        }
    }

    /// Apply events until the channel closes or `cancel` fires.
    pub async fn run(&self, mut events: mpsc::Receiver<NamespaceEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("namespace watcher cancelled");
                    break;
                }
                next = events.recv() => match next {
                    Some(event) => {
                        // A connect stuck on the API server must not hold up shutdown.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                debug!("namespace watcher cancelled while applying an event");
                                break;
                            }
                            _ = self.apply(event) => {}
                        }
                    }
                    None => {
                        debug!("namespace event feed closed");
                        break;
                    }
                },
            }
        }
    }

    /// One connection attempt per configured namespace; failures are final.
    pub async fn connect_static(&self, namespaces: &[String]) -> usize {
        let mut connected = 0;
        for ns in namespaces {
            if self.connect(ns).await {
                connected += 1;
            }
        }
        info!(connected, configured = namespaces.len(), "static namespaces connected");
        connected
    }
}

/// Turns raw watch events into add/remove notifications.
///
/// A namespace update arrives as another `Applied`; only the first sighting
/// of a name is reported as `Added`.
#[derive(Debug, Default)]
pub struct NamespaceTracker {
    seen: HashSet<String>,
}

impl NamespaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, event: watcher::Event<Namespace>) -> Vec<NamespaceEvent> {
        match event {
            watcher::Event::Applied(ns) => {
                let name = ns.name_any();
                if self.seen.insert(name.clone()) {
                    vec![NamespaceEvent::Added(name)]
                } else {
                    Vec::new()
                }
            }
            watcher::Event::Deleted(ns) => {
                let name = ns.name_any();
                self.seen.remove(&name);
                vec![NamespaceEvent::Removed(name)]
            }
            watcher::Event::Restarted(list) => {
                let current: HashSet<String> = list.iter().map(|ns| ns.name_any()).collect();
                let mut events: Vec<NamespaceEvent> = self.seen
                    .difference(&current)
                    .map(|name| NamespaceEvent::Removed(name.clone()))
                    .collect();
                events.extend(
                    current
                        .difference(&self.seen)
                        .map(|name| NamespaceEvent::Added(name.clone())),
                );
                self.seen = current;
                events
            }
        }
    }
}

/// Forward namespace changes from `api` into `tx` until cancelled.
pub async fn feed_namespace_events(
    api: Api<Namespace>,
    tx: mpsc::Sender<NamespaceEvent>,
    cancel: CancellationToken,
) {
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    pin_mut!(stream);
    let mut tracker = NamespaceTracker::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("namespace watch cancelled");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    for ns_event in tracker.translate(event) {
                        if tx.send(ns_event).await.is_err() {
                            debug!("namespace watcher gone, stopping feed");
                            return;
                        }
                    }
                }
                Some(Err(e)) => warn!(error = %e, "namespace watch error"),
                None => {
                    warn!("namespace watch stream ended");
                    break;
                }
            },
        }
    }
}

pub fn spawn_namespace_feed(
    client: &Client,
    tx: mpsc::Sender<NamespaceEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(feed_namespace_events(namespace_api(client), tx, cancel))
}
