use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{OwnerReference, object_key};
use crate::pod::{Pod, PodTemplateSpec};
use crate::selector::LabelSelector;

// --- DaemonSet status ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonSetStatus {
    /// Nodes that should run a daemon pod
    pub desired_number_scheduled: u32,
    /// Nodes that should run a daemon pod and do
    pub current_number_scheduled: u32,
    /// Nodes running a daemon pod they should not run
    pub number_misscheduled: u32,
    /// Nodes whose daemon pod is ready
    pub number_ready: u32,
    /// Nodes whose daemon pod has been ready for at least `min_ready_seconds`
    #[serde(default)]
    pub number_available: u32,
    /// Nodes whose daemon pod was created from the current generation
    #[serde(default)]
    pub updated_number_scheduled: u32,
    #[serde(default)]
    pub observed_generation: u64,
}

// --- DaemonSet spec ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSetSpec {
    /// Selects the pods this DaemonSet manages
    pub selector: LabelSelector,
    pub template: PodTemplateSpec,
    #[serde(default)]
    pub min_ready_seconds: u32,
}

// --- DaemonSet ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSet {
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Bumped by the control plane on every spec change
    #[serde(default)]
    pub generation: u64,
    pub spec: DaemonSetSpec,
    #[serde(default)]
    pub status: DaemonSetStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl DaemonSet {
    /// Work queue / cache key, `<namespace>/<name>`.
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Controller reference stamped onto pods created for this DaemonSet.
    pub fn owner_reference(&self, kind: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            name: self.name.clone(),
            uid: self.id.clone(),
            controller: true,
        }
    }

    /// Whether `pod` belongs to this DaemonSet.
    ///
    /// A controller reference decides on its own. Pods without one are
    /// claimed by label match within the namespace; an empty selector
    /// claims nothing.
    pub fn owns(&self, pod: &Pod) -> bool {
        match pod.controller_ref() {
            Some(owner) => owner.uid == self.id,
            None => {
                pod.namespace == self.namespace
                    && !self.spec.selector.is_empty()
                    && self.spec.selector.matches(&pod.labels)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{PodPhase, PodSpec};
    use std::collections::HashMap;

    fn daemon_set() -> DaemonSet {
        let labels: HashMap<String, String> =
            [("name".to_string(), "simple-daemon".to_string())].into();
        DaemonSet {
            id: "ds-uid".to_string(),
            name: "foo".to_string(),
            namespace: "default".to_string(),
            generation: 1,
            spec: DaemonSetSpec {
                selector: LabelSelector::from_labels(labels.clone()),
                template: PodTemplateSpec {
                    labels,
                    spec: PodSpec::default(),
                },
                min_ready_seconds: 0,
            },
            status: DaemonSetStatus::default(),
            created_at: Utc::now(),
            deletion_timestamp: None,
        }
    }

    fn pod(namespace: &str, labels: &[(&str, &str)], owner: Option<OwnerReference>) -> Pod {
        Pod {
            id: "p-id".to_string(),
            name: "p".to_string(),
            namespace: namespace.to_string(),
            spec: PodSpec::default(),
            phase: PodPhase::Running,
            conditions: vec![],
            node_name: None,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            owner_ref: owner,
            created_at: Utc::now(),
            deletion_timestamp: None,
        }
    }

    #[test]
    fn owner_reference_wins_over_labels() {
        let ds = daemon_set();
        let mine = ds.owner_reference("DaemonSet");
        let other = OwnerReference {
            uid: "other-uid".to_string(),
            ..mine.clone()
        };
        assert!(ds.owns(&pod("default", &[], Some(mine))));
        assert!(!ds.owns(&pod("default", &[("name", "simple-daemon")], Some(other))));
    }

    #[test]
    fn label_fallback_is_namespaced() {
        let ds = daemon_set();
        assert!(ds.owns(&pod("default", &[("name", "simple-daemon")], None)));
        assert!(!ds.owns(&pod("kube-system", &[("name", "simple-daemon")], None)));
        assert!(!ds.owns(&pod("default", &[("name", "other")], None)));
    }

    #[test]
    fn non_controller_owner_falls_back_to_labels() {
        let ds = daemon_set();
        let weak = OwnerReference {
            kind: "ConfigMap".to_string(),
            name: "cfg".to_string(),
            uid: "cfg-uid".to_string(),
            controller: false,
        };
        assert!(ds.owns(&pod("default", &[("name", "simple-daemon")], Some(weak))));
    }

    #[test]
    fn empty_selector_claims_nothing() {
        let mut ds = daemon_set();
        ds.spec.selector = LabelSelector::everything();
        assert!(!ds.owns(&pod("default", &[("bang", "boom")], None)));
    }
}
