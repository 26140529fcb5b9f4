use chrono::{DateTime, Utc};
use pkg_constants::controller::TEMPLATE_GENERATION_LABEL;
use pkg_scheduler::evaluate;
use pkg_types::daemonset::{DaemonSet, DaemonSetStatus};
use pkg_types::node::Node;
use pkg_types::pod::Pod;

use super::plan::{daemon_pods, pods_by_node};

/// Status counts for `ds` as of `now`, derived only from the snapshot.
pub fn compute_status(ds: &DaemonSet, nodes: &[Node], pods: &[Pod], now: DateTime<Utc>) -> DaemonSetStatus {
    let by_node = pods_by_node(pods);
    let generation = ds.generation.to_string();
    let mut status = DaemonSetStatus {
        observed_generation: ds.generation,
        ..Default::default()
    };

    for node in nodes {
        let on_node = by_node.get(node.name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let decision = evaluate(node, ds, on_node);
        let active: Vec<&Pod> = daemon_pods(ds, on_node)
            .into_iter()
            .filter(|p| p.is_active())
            .collect();

        if !decision.want_to_run {
            if !active.is_empty() {
                status.number_misscheduled += 1;
            }
            continue;
        }
        status.desired_number_scheduled += 1;
        let Some(kept) = active
            .iter()
            .find(|p| !p.is_being_deleted())
            .or_else(|| active.first())
        else {
            continue;
        };
        status.current_number_scheduled += 1;
        if kept.is_ready() {
            status.number_ready += 1;
        }
        if kept.is_available(ds.spec.min_ready_seconds, now) {
            status.number_available += 1;
        }
        if kept.labels.get(TEMPLATE_GENERATION_LABEL) == Some(&generation) {
            status.updated_number_scheduled += 1;
        }
    }
    status
}
