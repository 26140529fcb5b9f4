use dashmap::DashMap;
use pkg_constants::state::CACHE_EVENT_CHANNEL_CAPACITY;
use pkg_types::daemonset::DaemonSet;
use pkg_types::meta::object_key;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::selector::LabelSelector;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use crate::lister::{DaemonSetLister, NodeLister, PodLister};
use crate::watch::ResourceKind;

/// Any object the cache holds.
#[derive(Debug, Clone)]
pub enum Object {
    Node(Node),
    Pod(Pod),
    DaemonSet(DaemonSet),
}

impl Object {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Object::Node(_) => ResourceKind::Node,
            Object::Pod(_) => ResourceKind::Pod,
            Object::DaemonSet(_) => ResourceKind::DaemonSet,
        }
    }

    /// Cache key: node name, or `<namespace>/<name>`.
    pub fn key(&self) -> String {
        match self {
            Object::Node(n) => n.name.clone(),
            Object::Pod(p) => object_key(&p.namespace, &p.name),
            Object::DaemonSet(ds) => ds.key(),
        }
    }
}

/// Change notification published after the cache has been updated.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    Added(Object),
    Updated { old: Object, new: Object },
    Deleted(Object),
}

/// In-memory, eventually consistent snapshot of nodes, pods and DaemonSets.
///
/// Reads never block on I/O. Writers are the informer (and tests); the
/// controller only reads.
pub struct ClusterCache {
    nodes: DashMap<String, Node>,
    pods: DashMap<String, Pod>,
    pods_by_namespace: DashMap<String, HashSet<String>>,
    daemon_sets: DashMap<String, DaemonSet>,
    synced: AtomicBool,
    events: broadcast::Sender<CacheEvent>,
}

impl ClusterCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CACHE_EVENT_CHANNEL_CAPACITY);
        Self {
            nodes: DashMap::new(),
            pods: DashMap::new(),
            pods_by_namespace: DashMap::new(),
            daemon_sets: DashMap::new(),
            synced: AtomicBool::new(false),
            events,
        }
    }

    /// Receive add/update/delete notifications for every object kind.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Insert or replace an object and publish the matching notification.
    pub fn apply(&self, object: Object) {
        let key = object.key();
        let old = match &object {
            Object::Node(n) => self.nodes.insert(key, n.clone()).map(Object::Node),
            Object::Pod(p) => {
                self.pods_by_namespace
                    .entry(p.namespace.clone())
                    .or_default()
                    .insert(key.clone());
                self.pods.insert(key, p.clone()).map(Object::Pod)
            }
            Object::DaemonSet(ds) => self.daemon_sets.insert(key, ds.clone()).map(Object::DaemonSet),
        };
        self.notify(match old {
            Some(old) => CacheEvent::Updated { old, new: object },
            None => CacheEvent::Added(object),
        });
    }

    /// Remove an object by kind and cache key. Returns the removed object.
    pub fn remove(&self, kind: ResourceKind, key: &str) -> Option<Object> {
        let removed = match kind {
            ResourceKind::Node => self.nodes.remove(key).map(|(_, n)| Object::Node(n)),
            ResourceKind::Pod => {
                let removed = self.pods.remove(key).map(|(_, p)| p);
                if let Some(pod) = &removed {
                    self.pods_by_namespace.remove_if_mut(&pod.namespace, |_, keys| {
                        keys.remove(key);
                        keys.is_empty()
                    });
                }
                removed.map(Object::Pod)
            }
            ResourceKind::DaemonSet => self
                .daemon_sets
                .remove(key)
                .map(|(_, ds)| Object::DaemonSet(ds)),
        };
        if let Some(object) = &removed {
            self.notify(CacheEvent::Deleted(object.clone()));
        }
        removed
    }

    /// Cache keys currently held for `kind`.
    pub fn keys(&self, kind: ResourceKind) -> Vec<String> {
        match kind {
            ResourceKind::Node => self.nodes.iter().map(|e| e.key().clone()).collect(),
            ResourceKind::Pod => self.pods.iter().map(|e| e.key().clone()).collect(),
            ResourceKind::DaemonSet => self.daemon_sets.iter().map(|e| e.key().clone()).collect(),
        }
    }

    fn notify(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for ClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeLister for ClusterCache {
    fn list_nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(|e| e.value().clone()).collect()
    }

    fn has_synced(&self) -> bool {
        self.is_synced()
    }
}

impl PodLister for ClusterCache {
    fn list_pods(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Pod> {
        match namespace {
            Some(ns) => {
                let keys: Vec<String> = self
                    .pods_by_namespace
                    .get(ns)
                    .map(|keys| keys.iter().cloned().collect())
                    .unwrap_or_default();
                keys.iter()
                    .filter_map(|k| self.pods.get(k).map(|p| p.value().clone()))
                    .filter(|p| selector.matches(&p.labels))
                    .collect()
            }
            None => self
                .pods
                .iter()
                .filter(|e| selector.matches(&e.value().labels))
                .map(|e| e.value().clone())
                .collect(),
        }
    }

    fn has_synced(&self) -> bool {
        self.is_synced()
    }
}

impl DaemonSetLister for ClusterCache {
    fn get_daemon_set(&self, key: &str) -> Option<DaemonSet> {
        self.daemon_sets.get(key).map(|ds| ds.value().clone())
    }

    fn list_daemon_sets(&self) -> Vec<DaemonSet> {
        self.daemon_sets.iter().map(|e| e.value().clone()).collect()
    }

    fn has_synced(&self) -> bool {
        self.is_synced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pkg_types::pod::{PodPhase, PodSpec};
    use std::collections::HashMap;

    fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            id: format!("{}-id", name),
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec: PodSpec::default(),
            phase: PodPhase::Running,
            conditions: vec![],
            node_name: None,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            owner_ref: None,
            created_at: Utc::now(),
            deletion_timestamp: None,
        }
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

    #[test]
    fn lists_pods_by_namespace_and_selector() {
        let cache = ClusterCache::new();
        cache.apply(Object::Pod(pod("default", "a", &[("app", "agent")])));
        cache.apply(Object::Pod(pod("default", "b", &[("app", "web")])));
        cache.apply(Object::Pod(pod("kube-system", "c", &[("app", "agent")])));

        let selector = LabelSelector::from_labels([("app".to_string(), "agent".to_string())].into());
        let mut names: Vec<String> = cache
            .list_pods(None, &selector)
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "c"]);

        let in_default = cache.list_pods(Some("default"), &LabelSelector::everything());
        assert_eq!(in_default.len(), 2);
        assert!(cache.list_pods(Some("missing"), &LabelSelector::everything()).is_empty());
    }

    #[test]
    fn remove_updates_namespace_index() {
        let cache = ClusterCache::new();
        cache.apply(Object::Pod(pod("default", "a", &[])));
        assert!(cache.remove(ResourceKind::Pod, "default/a").is_some());
        assert!(cache.remove(ResourceKind::Pod, "default/a").is_none());
        assert!(cache.list_pods(Some("default"), &LabelSelector::everything()).is_empty());
    }

    #[test]
    fn empty_namespaces_leave_the_index() {
        let cache = ClusterCache::new();
        cache.apply(Object::Pod(pod("team-a", "x", &[])));
        cache.apply(Object::Pod(pod("team-a", "y", &[])));
        cache.apply(Object::Pod(pod("team-b", "z", &[])));

        cache.remove(ResourceKind::Pod, "team-a/x");
        assert!(cache.pods_by_namespace.contains_key("team-a"));
        cache.remove(ResourceKind::Pod, "team-a/y");
        assert!(!cache.pods_by_namespace.contains_key("team-a"));
        assert!(cache.pods_by_namespace.contains_key("team-b"));

        cache.apply(Object::Pod(pod("team-a", "x", &[])));
        assert_eq!(cache.list_pods(Some("team-a"), &LabelSelector::everything()).len(), 1);
    }

    #[test]
    fn synced_flag() {
        let cache = ClusterCache::new();
        assert!(!NodeLister::has_synced(&cache));
        cache.mark_synced();
        assert!(NodeLister::has_synced(&cache));
        assert!(PodLister::has_synced(&cache));
    }

    #[tokio::test]
    async fn publishes_add_update_delete() {
        let cache = ClusterCache::new();
        let mut rx = cache.subscribe();

        cache.apply(Object::Node(node("node-0")));
        let mut relabeled = node("node-0");
        relabeled.labels.insert("color".to_string(), "blue".to_string());
        cache.apply(Object::Node(relabeled));
        cache.remove(ResourceKind::Node, "node-0");

        assert!(matches!(rx.recv().await.unwrap(), CacheEvent::Added(Object::Node(_))));
        match rx.recv().await.unwrap() {
            CacheEvent::Updated {
                old: Object::Node(old),
                new: Object::Node(new),
            } => {
                assert!(old.labels.is_empty());
                assert_eq!(new.labels.get("color").map(String::as_str), Some("blue"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), CacheEvent::Deleted(Object::Node(_))));
        assert!(cache.list_nodes().is_empty());
    }
}
