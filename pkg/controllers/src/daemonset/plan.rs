use pkg_scheduler::{PlacementReason, evaluate};
use pkg_types::daemonset::DaemonSet;
use pkg_types::node::Node;
use pkg_types::pod::{Pod, PodPhase};
use std::collections::HashMap;

/// A daemon pod scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodDeletion {
    pub namespace: String,
    pub name: String,
    pub node_name: String,
}

impl PodDeletion {
    fn of(pod: &Pod, node_name: &str) -> Self {
        Self {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            node_name: node_name.to_string(),
        }
    }
}

/// What one sync should do for a DaemonSet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Nodes that get a new daemon pod.
    pub creates: Vec<String>,
    pub deletes: Vec<PodDeletion>,
    /// Nodes running a daemon pod they should not run.
    pub misscheduled: Vec<String>,
    /// Nodes that want a daemon pod but cannot take one now.
    pub failed_placements: Vec<(String, Vec<PlacementReason>)>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty()
    }
}

/// Pods bound to each node, in any namespace.
pub(crate) fn pods_by_node(pods: &[Pod]) -> HashMap<&str, Vec<&Pod>> {
    let mut by_node: HashMap<&str, Vec<&Pod>> = HashMap::new();
    for pod in pods {
        if let Some(node) = pod.node_name.as_deref() {
            by_node.entry(node).or_default().push(pod);
        }
    }
    by_node
}

/// Daemon pods of `ds` on one node, oldest first.
pub(crate) fn daemon_pods<'a>(ds: &DaemonSet, on_node: &[&'a Pod]) -> Vec<&'a Pod> {
    let mut owned: Vec<&Pod> = on_node.iter().copied().filter(|p| ds.owns(p)).collect();
    owned.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    owned
}

/// Compute creates and deletes for `ds` against the given snapshot.
///
/// Nodes are visited in name order so the plan is deterministic. Pods bound
/// to nodes that are not in `nodes` are left alone.
pub fn plan(ds: &DaemonSet, nodes: &[Node], pods: &[Pod]) -> Plan {
    let by_node = pods_by_node(pods);
    let mut sorted: Vec<&Node> = nodes.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut plan = Plan::default();
    for node in sorted {
        let on_node = by_node.get(node.name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let decision = evaluate(node, ds, on_node);
        let daemon = daemon_pods(ds, on_node);

        for failed in daemon.iter().filter(|p| p.phase == PodPhase::Failed) {
            if !failed.is_being_deleted() {
                plan.deletes.push(PodDeletion::of(failed, &node.name));
            }
        }

        let active: Vec<&Pod> = daemon.into_iter().filter(|p| p.is_active()).collect();
        if !decision.should_continue_running {
            if !active.is_empty() {
                plan.misscheduled.push(node.name.clone());
                plan.deletes.extend(
                    active
                        .iter()
                        .filter(|p| !p.is_being_deleted())
                        .map(|p| PodDeletion::of(p, &node.name)),
                );
            }
        } else if active.len() > 1 {
            // Keep the oldest live pod; terminating copies are never the survivor
            let keep = active.iter().position(|p| !p.is_being_deleted());
            plan.deletes.extend(
                active
                    .iter()
                    .enumerate()
                    .filter(|(i, p)| Some(*i) != keep && !p.is_being_deleted())
                    .map(|(_, p)| PodDeletion::of(p, &node.name)),
            );
        }

        if active.is_empty() {
            if decision.should_schedule {
                plan.creates.push(node.name.clone());
            } else if decision.want_to_run {
                plan.failed_placements
                    .push((node.name.clone(), decision.reasons));
            }
        }
    }
    plan
}
