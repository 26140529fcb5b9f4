use futures_util::stream::{self, StreamExt};
use pkg_constants::controller::{DAEMONSET_KIND, TEMPLATE_GENERATION_LABEL};
use pkg_types::daemonset::DaemonSet;
use tracing::{info, warn};

use super::plan::Plan;
use crate::control::PodControl;
use crate::events::{EventReason, EventRecorder, EventType};

/// Result of executing a plan.
#[derive(Debug, Default)]
pub struct Outcome {
    pub total: usize,
    pub errors: Vec<String>,
}

/// Run every create, then every delete, in `plan`.
///
/// At most `concurrency` calls are in flight. A failed call does not stop
/// the others; its error is collected in the outcome.
pub async fn converge(
    control: &dyn PodControl,
    recorder: &dyn EventRecorder,
    ds: &DaemonSet,
    plan: &Plan,
    concurrency: usize,
) -> Outcome {
    let key = ds.key();
    let concurrency = concurrency.max(1);
    let mut template = ds.spec.template.clone();
    template
        .labels
        .insert(TEMPLATE_GENERATION_LABEL.to_string(), ds.generation.to_string());
    let owner = ds.owner_reference(DAEMONSET_KIND);

    let mut outcome = Outcome {
        total: plan.creates.len() + plan.deletes.len(),
        errors: Vec::new(),
    };

    let create_calls: Vec<_> = plan
        .creates
        .iter()
        .map(|node| {
            let node = node.clone();
            let (namespace, template, owner) = (&ds.namespace, &template, &owner);
            async move {
                match control.create_pod(namespace, template, &node, owner).await {
                    Ok(()) => Ok(node),
                    Err(e) => Err(format!("create on {}: {:#}", node, e)),
                }
            }
        })
        .collect();
    let creates: Vec<Result<String, String>> = stream::iter(create_calls)
        .buffer_unordered(concurrency)
        .collect()
        .await;
    for result in creates {
        match result {
            Ok(node) => {
                info!("DaemonSet {}: created pod on node {}", key, node);
                recorder.record(
                    &key,
                    EventType::Normal,
                    EventReason::SuccessfulCreate,
                    format!("Created pod on node {}", node),
                );
            }
            Err(e) => {
                warn!("DaemonSet {}: {}", key, e);
                recorder.record(&key, EventType::Warning, EventReason::FailedCreate, e.clone());
                outcome.errors.push(e);
            }
        }
    }

    let delete_calls: Vec<_> = plan
        .deletes
        .iter()
        .cloned()
        .map(|pod| async move {
            match control.delete_pod(&pod.namespace, &pod.name).await {
                Ok(()) => Ok(format!("{} from node {}", pod.name, pod.node_name)),
                Err(e) => Err(format!("delete {}/{}: {:#}", pod.namespace, pod.name, e)),
            }
        })
        .collect();
    let deletes: Vec<Result<String, String>> = stream::iter(delete_calls)
        .buffer_unordered(concurrency)
        .collect()
        .await;
    for result in deletes {
        match result {
            Ok(what) => {
                info!("DaemonSet {}: deleted pod {}", key, what);
                recorder.record(
                    &key,
                    EventType::Normal,
                    EventReason::SuccessfulDelete,
                    format!("Deleted pod {}", what),
                );
            }
            Err(e) => {
                warn!("DaemonSet {}: {}", key, e);
                recorder.record(&key, EventType::Warning, EventReason::FailedDelete, e.clone());
                outcome.errors.push(e);
            }
        }
    }

    outcome
}
