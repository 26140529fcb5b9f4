//! Individual placement checks. Each returns the reasons it rejects a node
//! for; an empty result means the check passed.

use pkg_types::node::{Node, NodeConditionType};
use pkg_types::pod::{Pod, PodSpec, ResourceRequirements};
use std::collections::HashSet;

use crate::PlacementReason;

/// The template's explicit node name, if any, must be this node.
pub fn check_node_name(node: &Node, template: &PodSpec) -> Option<PlacementReason> {
    match &template.node_name {
        Some(name) if name != &node.name => Some(PlacementReason::NodeNameMismatch),
        _ => None,
    }
}

/// Node selector labels must all be present and equal, and the required
/// node affinity (if any) must match.
pub fn check_node_labels(node: &Node, template: &PodSpec) -> Option<PlacementReason> {
    let selector_matches = template
        .node_selector
        .iter()
        .all(|(k, v)| node.labels.get(k).is_some_and(|nv| nv == v));
    if !selector_matches {
        return Some(PlacementReason::NodeSelectorMismatch);
    }
    if let Some(affinity) = &template.affinity
        && !affinity.matches(&node.labels)
    {
        return Some(PlacementReason::NodeAffinityMismatch);
    }
    None
}

/// Ready must be true; disk pressure and out-of-disk reject every pod;
/// memory pressure rejects best-effort pods only.
pub fn check_node_conditions(node: &Node, template: &PodSpec) -> Option<PlacementReason> {
    if !node.is_ready() {
        return Some(PlacementReason::NodeNotReady);
    }
    if node.has_condition(NodeConditionType::OutOfDisk) {
        return Some(PlacementReason::NodeOutOfDisk);
    }
    if node.has_condition(NodeConditionType::DiskPressure) {
        return Some(PlacementReason::NodeDiskPressure);
    }
    if node.has_condition(NodeConditionType::MemoryPressure)
        && template.resource_requests().is_zero()
    {
        return Some(PlacementReason::NodeMemoryPressure);
    }
    None
}

/// Would the candidate fit next to `occupants` within the node's allocatable?
///
/// A candidate requesting no CPU and no memory is only subject to the pod
/// count ceiling.
pub fn check_resources(node: &Node, candidate: &PodSpec, occupants: &[&Pod]) -> Vec<PlacementReason> {
    let mut reasons = Vec::new();
    let allocatable = node.allocatable;

    if allocatable.pods > 0 && occupants.len() + 1 > allocatable.pods as usize {
        reasons.push(PlacementReason::TooManyPods);
    }

    let request = candidate.resource_requests();
    if request.is_zero() {
        return reasons;
    }

    let total = occupants
        .iter()
        .fold(ResourceRequirements::default(), |acc, p| {
            acc.saturating_add(p.spec.resource_requests())
        })
        .saturating_add(request);

    if allocatable.cpu_millis > 0 && total.cpu_millis > allocatable.cpu_millis {
        reasons.push(PlacementReason::InsufficientCpu);
    }
    if allocatable.memory_bytes > 0 && total.memory_bytes > allocatable.memory_bytes {
        reasons.push(PlacementReason::InsufficientMemory);
    }
    reasons
}

/// Host ports of the candidate already bound by one of `occupants`.
pub fn check_host_ports(candidate: &PodSpec, occupants: &[&Pod]) -> Vec<PlacementReason> {
    let used: HashSet<u16> = occupants.iter().flat_map(|p| p.spec.host_ports()).collect();
    let mut conflicts: Vec<u16> = candidate
        .host_ports()
        .filter(|port| used.contains(port))
        .collect();
    conflicts.sort_unstable();
    conflicts.dedup();
    conflicts
        .into_iter()
        .map(PlacementReason::HostPortConflict)
        .collect()
}
