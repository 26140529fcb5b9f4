//! Node eligibility for daemon pods.
//!
//! [`evaluate`] decides, for one node and one DaemonSet, whether a daemon pod
//! should exist there, whether a new one can be placed right now, and whether
//! an existing one may keep running. It has no side effects.

pub mod predicates;

use pkg_types::daemonset::DaemonSet;
use pkg_types::node::Node;
use pkg_types::pod::Pod;

/// Why a node was not (fully) eligible for a daemon pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementReason {
    NodeNameMismatch,
    NodeSelectorMismatch,
    NodeAffinityMismatch,
    NodeNotReady,
    NodeOutOfDisk,
    NodeDiskPressure,
    NodeMemoryPressure,
    TooManyPods,
    InsufficientCpu,
    InsufficientMemory,
    HostPortConflict(u16),
}

impl std::fmt::Display for PlacementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementReason::NodeNameMismatch => write!(f, "node name does not match"),
            PlacementReason::NodeSelectorMismatch => write!(f, "node selector does not match"),
            PlacementReason::NodeAffinityMismatch => write!(f, "node affinity does not match"),
            PlacementReason::NodeNotReady => write!(f, "node is not ready"),
            PlacementReason::NodeOutOfDisk => write!(f, "node is out of disk"),
            PlacementReason::NodeDiskPressure => write!(f, "node has disk pressure"),
            PlacementReason::NodeMemoryPressure => write!(f, "node has memory pressure"),
            PlacementReason::TooManyPods => write!(f, "node pod capacity exhausted"),
            PlacementReason::InsufficientCpu => write!(f, "insufficient cpu"),
            PlacementReason::InsufficientMemory => write!(f, "insufficient memory"),
            PlacementReason::HostPortConflict(port) => write!(f, "host port {} in use", port),
        }
    }
}

/// Outcome of evaluating one node for one DaemonSet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeDecision {
    /// Name, selector, affinity and readiness all allow a daemon pod here.
    pub want_to_run: bool,
    /// A new daemon pod may be placed here now.
    pub should_schedule: bool,
    /// An existing daemon pod may stay here.
    pub should_continue_running: bool,
    pub reasons: Vec<PlacementReason>,
}

impl NodeDecision {
    fn rejected(reason: PlacementReason) -> Self {
        Self {
            reasons: vec![reason],
            ..Default::default()
        }
    }

    /// Same placement outcome, ignoring the reasons.
    pub fn same_outcome(&self, other: &NodeDecision) -> bool {
        self.want_to_run == other.want_to_run
            && self.should_schedule == other.should_schedule
            && self.should_continue_running == other.should_continue_running
    }
}

/// Evaluate `node` for `ds`.
///
/// `pods_on_node` are the pods bound to the node. Terminal pods and pods
/// owned by `ds` are left out of the capacity and host-port checks, so the
/// daemon pod already running on the node never blocks itself.
pub fn evaluate(node: &Node, ds: &DaemonSet, pods_on_node: &[&Pod]) -> NodeDecision {
    let template = &ds.spec.template.spec;

    if let Some(reason) = predicates::check_node_name(node, template)
        .or_else(|| predicates::check_node_labels(node, template))
        .or_else(|| predicates::check_node_conditions(node, template))
    {
        return NodeDecision::rejected(reason);
    }

    let occupants: Vec<&Pod> = pods_on_node
        .iter()
        .copied()
        .filter(|p| p.node_name.as_deref() == Some(node.name.as_str()))
        .filter(|p| p.is_active() && !ds.owns(p))
        .collect();

    let mut reasons = predicates::check_resources(node, template, &occupants);
    reasons.extend(predicates::check_host_ports(template, &occupants));

    NodeDecision {
        want_to_run: true,
        should_schedule: reasons.is_empty(),
        should_continue_running: true,
        reasons,
    }
}
