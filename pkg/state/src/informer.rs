use pkg_types::daemonset::DaemonSet;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

use crate::cache::{ClusterCache, Object};
use crate::client::StateStore;
use crate::watch::{EventType, ResourceKind, WatchEvent};

/// Mirrors the persistent store into a [`ClusterCache`].
///
/// Performs a full listing, marks the cache synced, then follows the store's
/// event log. Falls back to a relist whenever it lags past the retained tail.
pub struct Informer {
    store: StateStore,
    cache: Arc<ClusterCache>,
}

impl Informer {
    pub fn new(store: StateStore, cache: Arc<ClusterCache>) -> Self {
        Self { store, cache }
    }

    /// Start syncing as a background task. Stops when `shutdown` flips to true.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            // Subscribe before listing so nothing written in between is missed
            let mut events = BroadcastStream::new(self.store.event_log.subscribe());
            let mut last_seq = loop {
                match self.relist().await {
                    Ok(seq) => break seq,
                    Err(e) => {
                        warn!("Informer initial list failed: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
                            _ = shutdown.changed() => return,
                        }
                    }
                }
            };
            self.cache.mark_synced();
            info!("Informer synced at seq={}", last_seq);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    next = events.next() => match next {
                        Some(Ok(event)) => {
                            if event.seq > last_seq {
                                last_seq = event.seq;
                                self.handle(&event);
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                            warn!("Informer lagged by {} events, catching up", n);
                            last_seq = self.catch_up(last_seq).await;
                        }
                        None => break,
                    }
                }
            }
            info!("Informer stopped");
        })
    }

    /// Replay retained events after `last_seq`, relisting if some are gone.
    async fn catch_up(&self, last_seq: u64) -> u64 {
        match self.store.event_log.events_since(last_seq).await {
            Some(missed) => {
                let mut seq = last_seq;
                for event in missed {
                    seq = event.seq;
                    self.handle(&event);
                }
                seq
            }
            None => match self.relist().await {
                Ok(seq) => seq,
                Err(e) => {
                    warn!("Informer relist failed: {}", e);
                    last_seq
                }
            },
        }
    }

    /// Load every object from the store and drop cached keys that no longer
    /// exist. Returns the event sequence the listing is consistent with.
    async fn relist(&self) -> anyhow::Result<u64> {
        let seq = self.store.event_log.current_seq().await;
        for kind in ResourceKind::ALL {
            let entries = self.store.list_prefix(kind.prefix()).await?;
            let mut seen = HashSet::with_capacity(entries.len());
            for (key, value) in entries {
                if let Some(object) = decode(kind, &key, &value) {
                    seen.insert(object.key());
                    self.cache.apply(object);
                }
            }
            for stale in self.cache.keys(kind) {
                if !seen.contains(&stale) {
                    self.cache.remove(kind, &stale);
                }
            }
        }
        Ok(seq)
    }

    fn handle(&self, event: &WatchEvent) {
        let Some((kind, object_key)) = ResourceKind::parse_key(&event.key) else {
            return;
        };
        match event.event_type {
            EventType::Put => {
                let Some(value) = &event.value else {
                    return;
                };
                if let Some(object) = decode(kind, &event.key, value) {
                    self.cache.apply(object);
                }
            }
            EventType::Delete => {
                self.cache.remove(kind, object_key);
            }
        }
    }
}

fn decode(kind: ResourceKind, key: &str, value: &[u8]) -> Option<Object> {
    let decoded = match kind {
        ResourceKind::Node => serde_json::from_slice::<Node>(value).map(Object::Node),
        ResourceKind::Pod => serde_json::from_slice::<Pod>(value).map(Object::Pod),
        ResourceKind::DaemonSet => serde_json::from_slice::<DaemonSet>(value).map(Object::DaemonSet),
    };
    match decoded {
        Ok(object) => Some(object),
        Err(e) => {
            debug!("Skipping undecodable object at {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::{NodeLister, PodLister};
    use chrono::Utc;
    use pkg_types::meta::object_key;
    use pkg_types::pod::{PodPhase, PodSpec};
    use pkg_types::selector::LabelSelector;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn temp_store() -> StateStore {
        let dir = std::env::temp_dir().join(format!("fleetset-informer-{}", uuid::Uuid::new_v4()));
        StateStore::new(dir.to_str().unwrap()).await.unwrap()
    }

    fn node(name: &str) -> Node {
        Node {
            id: format!("{}-id", name),
            name: name.to_string(),
            labels: HashMap::new(),
            conditions: vec![],
            allocatable: Default::default(),
            registered_at: Utc::now(),
        }
    }

    fn pod(name: &str) -> Pod {
        Pod {
            id: format!("{}-id", name),
            name: name.to_string(),
            namespace: "default".to_string(),
            spec: PodSpec::default(),
            phase: PodPhase::Pending,
            conditions: vec![],
            node_name: Some("node-0".to_string()),
            labels: HashMap::new(),
            owner_ref: None,
            created_at: Utc::now(),
            deletion_timestamp: None,
        }
    }

    async fn eventually<F: Fn() -> bool>(check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn lists_then_follows_store() {
        let store = temp_store().await;
        store
            .put_json(&ResourceKind::Node.registry_key("node-0"), &node("node-0"))
            .await
            .unwrap();
        // Garbage under a known prefix is skipped
        store.put("/registry/nodes/broken", b"not json").await.unwrap();

        let cache = Arc::new(ClusterCache::new());
        let (tx, rx) = watch::channel(false);
        let handle = Informer::new(store.clone(), cache.clone()).start(rx);

        eventually(|| NodeLister::has_synced(cache.as_ref())).await;
        assert_eq!(cache.list_nodes().len(), 1);

        let p = pod("agent-1");
        let key = ResourceKind::Pod.registry_key(&object_key(&p.namespace, &p.name));
        store.put_json(&key, &p).await.unwrap();
        eventually(|| cache.list_pods(Some("default"), &LabelSelector::everything()).len() == 1)
            .await;

        store.delete(&key).await.unwrap();
        eventually(|| cache.list_pods(None, &LabelSelector::everything()).is_empty()).await;

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
