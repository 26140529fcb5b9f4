//! Read-only views over cached cluster state.
//!
//! Controllers depend on these traits, never on a concrete store, so tests
//! and alternative caches can be injected.

use pkg_types::daemonset::DaemonSet;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::selector::LabelSelector;

pub trait NodeLister: Send + Sync {
    fn list_nodes(&self) -> Vec<Node>;

    /// True once the initial listing has been loaded.
    fn has_synced(&self) -> bool {
        true
    }
}

pub trait PodLister: Send + Sync {
    /// Pods matching `selector`, restricted to `namespace` when given.
    fn list_pods(&self, namespace: Option<&str>, selector: &LabelSelector) -> Vec<Pod>;

    fn has_synced(&self) -> bool {
        true
    }
}

pub trait DaemonSetLister: Send + Sync {
    /// Look up a DaemonSet by its `<namespace>/<name>` key.
    fn get_daemon_set(&self, key: &str) -> Option<DaemonSet>;

    fn list_daemon_sets(&self) -> Vec<DaemonSet>;

    fn has_synced(&self) -> bool {
        true
    }
}
