use dashmap::DashMap;
use std::sync::Arc;

use crate::release::ReleaseClient;

/// Shared map of namespace name to its connected release client.
///
/// Clones are handles onto the same map, so the watcher and the collector
/// can each hold one. No operation requires an external lock.
#[derive(Clone, Default)]
pub struct NamespaceClientRegistry {
    clients: Arc<DashMap<String, Arc<dyn ReleaseClient>>>,
}

impl NamespaceClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the client for `namespace`. Last writer wins.
    pub fn set(&self, namespace: impl Into<String>, client: Arc<dyn ReleaseClient>) {
        self.clients.insert(namespace.into(), client);
    }

    pub fn remove(&self, namespace: &str) {
        self.clients.remove(namespace);
    }

    /// Point-in-time copy of every entry. Later `set`/`remove` calls do not
    /// affect the returned list.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn ReleaseClient>)> {
        self.clients
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.clients.contains_key(namespace)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for NamespaceClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut namespaces: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        namespaces.sort();
        f.debug_struct("NamespaceClientRegistry")
            .field("namespaces", &namespaces)
            .finish()
    }
}
