//! DaemonSet controller: keeps exactly one daemon pod on every eligible node.
//!
//! Cache notifications are mapped to DaemonSet keys and fed through a
//! [`WorkQueue`]. Each sync plans against the cache snapshot, converges
//! through [`PodControl`] and writes status back when it changed.

pub mod converge;
pub mod plan;
pub mod status;


use chrono::Utc;
use pkg_constants::controller::{
    CACHE_SYNC_POLL_MILLIS, DAEMONSET_KIND, DEFAULT_BACKOFF_BASE_MILLIS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_OPERATION_CONCURRENCY, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKERS,
};
use pkg_scheduler::evaluate;
use pkg_state::cache::{CacheEvent, Object};
use pkg_state::lister::{DaemonSetLister, NodeLister, PodLister};
use pkg_types::daemonset::DaemonSet;
use pkg_types::meta::{object_key, split_object_key};
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::selector::LabelSelector;
use pkg_types::validate::validate_daemon_set;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::time::Interval;
use tracing::{debug, info, warn};

use crate::control::PodControl;
use crate::error::{ErrorKind, SyncError};
use crate::events::{EventReason, EventRecorder, EventType, TracingRecorder};
use crate::queue::WorkQueue;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub workers: usize,
    pub resync_interval: Duration,
    pub operation_concurrency: usize,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            operation_concurrency: DEFAULT_OPERATION_CONCURRENCY,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MILLIS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        }
    }
}

pub struct DaemonSetController {
    daemon_sets: Arc<dyn DaemonSetLister>,
    pods: Arc<dyn PodLister>,
    nodes: Arc<dyn NodeLister>,
    control: Arc<dyn PodControl>,
    recorder: Arc<dyn EventRecorder>,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
}

impl DaemonSetController {
    pub fn new(
        daemon_sets: Arc<dyn DaemonSetLister>,
        pods: Arc<dyn PodLister>,
        nodes: Arc<dyn NodeLister>,
        control: Arc<dyn PodControl>,
        config: ControllerConfig,
    ) -> Self {
        let queue = WorkQueue::new(config.backoff_base, config.backoff_max);
        Self {
            daemon_sets,
            pods,
            nodes,
            control,
            recorder: Arc::new(TracingRecorder),
            queue,
            config,
        }
    }

    /// Replace the default log-only event recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Reconcile the DaemonSet stored under `key` once.
    pub async fn sync(&self, key: &str) -> Result<(), SyncError> {
        if split_object_key(key).is_none() {
            return Err(SyncError::InvalidKey(key.to_string()));
        }
        let Some(ds) = self.daemon_sets.get_daemon_set(key) else {
            debug!("DaemonSet {} has been deleted", key);
            return Ok(());
        };
        if ds.is_being_deleted() {
            debug!("DaemonSet {} is being deleted, skipping", key);
            return Ok(());
        }
        if ds.spec.selector.is_empty() {
            self.recorder.record(
                key,
                EventType::Warning,
                EventReason::SelectingAll,
                "This DaemonSet is selecting all pods. A non-empty selector is required.".to_string(),
            );
            return Ok(());
        }
        if let Err(e) = validate_daemon_set(&ds) {
            self.recorder.record(
                key,
                EventType::Warning,
                EventReason::InvalidConfiguration,
                format!("{:#}", e),
            );
            return Ok(());
        }

        let nodes = self.nodes.list_nodes();
        let pods = self.pods.list_pods(None, &LabelSelector::everything());
        let plan = plan::plan(&ds, &nodes, &pods);
        for (node, reasons) in &plan.failed_placements {
            let reasons: Vec<String> = reasons.iter().map(ToString::to_string).collect();
            self.recorder.record(
                key,
                EventType::Warning,
                EventReason::FailedPlacement,
                format!("Failed to place pod on {}: {}", node, reasons.join(", ")),
            );
        }
        if !plan.misscheduled.is_empty() {
            debug!(
                "DaemonSet {}: misscheduled on {}",
                key,
                plan.misscheduled.join(", ")
            );
        }

        let outcome = converge::converge(
            self.control.as_ref(),
            self.recorder.as_ref(),
            &ds,
            &plan,
            self.config.operation_concurrency,
        )
        .await;

        let pods = self.pods.list_pods(None, &LabelSelector::everything());
        let status = status::compute_status(&ds, &nodes, &pods, Utc::now());
        let status_result = if status != ds.status {
            self.control
                .update_daemon_set_status(&ds, &status)
                .await
                .map_err(SyncError::StatusUpdate)
        } else {
            Ok(())
        };

        if !outcome.errors.is_empty() {
            return Err(SyncError::Convergence {
                failed: outcome.errors.len(),
                total: outcome.total,
                errors: outcome.errors,
            });
        }
        status_result
    }

    /// Enqueue every DaemonSet the cache change may affect.
    pub async fn handle_event(&self, event: CacheEvent) {
        let keys: BTreeSet<String> = match event {
            CacheEvent::Added(Object::DaemonSet(ds))
            | CacheEvent::Deleted(Object::DaemonSet(ds))
            | CacheEvent::Updated {
                new: Object::DaemonSet(ds),
                ..
            } => [ds.key()].into(),
            CacheEvent::Added(Object::Pod(pod)) | CacheEvent::Deleted(Object::Pod(pod)) => {
                self.daemon_sets_for_pod(&pod)
            }
            CacheEvent::Updated {
                old: Object::Pod(old),
                new: Object::Pod(new),
            } => {
                let mut keys = self.daemon_sets_for_pod(&old);
                keys.extend(self.daemon_sets_for_pod(&new));
                keys
            }
            CacheEvent::Added(Object::Node(node)) => {
                let on_node = self.pods_on_node(&node.name);
                let on_node: Vec<&Pod> = on_node.iter().collect();
                self.daemon_sets
                    .list_daemon_sets()
                    .iter()
                    .filter(|ds| evaluate(&node, ds, &on_node).want_to_run)
                    .map(DaemonSet::key)
                    .collect()
            }
            CacheEvent::Updated {
                old: Object::Node(old),
                new: Object::Node(new),
            } => self.daemon_sets_for_node_change(&old, &new),
            CacheEvent::Deleted(Object::Node(node)) => {
                let on_node = self.pods_on_node(&node.name);
                self.daemon_sets
                    .list_daemon_sets()
                    .iter()
                    .filter(|ds| on_node.iter().any(|p| ds.owns(p)))
                    .map(DaemonSet::key)
                    .collect()
            }
            CacheEvent::Updated { .. } => BTreeSet::new(),
        };
        for key in keys {
            self.queue.add(&key).await;
        }
    }

    /// DaemonSets that manage `pod`: the one its controller reference names,
    /// otherwise every DaemonSet in its namespace whose selector matches it.
    fn daemon_sets_for_pod(&self, pod: &Pod) -> BTreeSet<String> {
        if let Some(owner) = pod.controller_ref() {
            if owner.kind != DAEMONSET_KIND {
                return BTreeSet::new();
            }
            let key = object_key(&pod.namespace, &owner.name);
            return match self.daemon_sets.get_daemon_set(&key) {
                Some(ds) if ds.id == owner.uid => [key].into(),
                _ => BTreeSet::new(),
            };
        }
        self.daemon_sets
            .list_daemon_sets()
            .iter()
            .filter(|ds| ds.owns(pod))
            .map(DaemonSet::key)
            .collect()
    }

    fn daemon_sets_for_node_change(&self, old: &Node, new: &Node) -> BTreeSet<String> {
        let on_node = self.pods_on_node(&new.name);
        let on_node: Vec<&Pod> = on_node.iter().collect();
        self.daemon_sets
            .list_daemon_sets()
            .iter()
            .filter(|ds| {
                !evaluate(old, ds, &on_node).same_outcome(&evaluate(new, ds, &on_node))
            })
            .map(DaemonSet::key)
            .collect()
    }

    fn pods_on_node(&self, node_name: &str) -> Vec<Pod> {
        self.pods
            .list_pods(None, &LabelSelector::everything())
            .into_iter()
            .filter(|p| p.node_name.as_deref() == Some(node_name))
            .collect()
    }

    async fn enqueue_all(&self) {
        for ds in self.daemon_sets.list_daemon_sets() {
            self.queue.add(&ds.key()).await;
        }
    }

    fn caches_synced(&self) -> bool {
        self.daemon_sets.has_synced() && self.pods.has_synced() && self.nodes.has_synced()
    }

    /// Run until `shutdown` flips to true: translate cache `events` into
    /// queue keys, resync every `config.resync_interval` (never when zero)
    /// and drain the queue with `config.workers` workers. Returns after every worker has exited.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<CacheEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "DaemonSetController starting (workers={}, resync={:?})",
            self.config.workers, self.config.resync_interval
        );

        while !self.caches_synced() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(CACHE_SYNC_POLL_MILLIS)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.queue.shut_down().await;
                        info!("DaemonSetController stopped before caches synced");
                        return;
                    }
                }
            }
        }
        debug!("DaemonSetController caches synced");
        self.enqueue_all().await;

        let workers: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| {
                let controller = self.clone();
                tokio::spawn(async move { controller.worker(id).await })
            })
            .collect();

        // A zero interval disables periodic resync
        let mut resync = if self.config.resync_interval.is_zero() {
            None
        } else {
            let mut interval = tokio::time::interval(self.config.resync_interval);
            // First tick fires immediately; everything was just enqueued
            interval.tick().await;
            Some(interval)
        };

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = next_resync(&mut resync) => self.enqueue_all().await,
                result = events.recv() => match result {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("DaemonSetController missed {} cache events, resyncing", n);
                        self.enqueue_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        info!("DaemonSetController shutting down");
        self.queue.shut_down().await;
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("DaemonSetController worker panicked: {}", e);
            }
        }
        info!("DaemonSetController stopped");
    }

    async fn worker(&self, id: usize) {
        debug!("DaemonSetController worker {} started", id);
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key).await;
        }
        debug!("DaemonSetController worker {} exiting", id);
    }

    async fn process(&self, key: &str) {
        let started = Instant::now();
        match self.sync(key).await {
            Ok(()) => {
                self.queue.forget(key).await;
                debug!("Finished syncing DaemonSet {} ({:?})", key, started.elapsed());
            }
            Err(e) => match e.kind() {
                ErrorKind::Transient => {
                    let delay = self.queue.add_rate_limited(key).await;
                    warn!("Error syncing DaemonSet {}: {}; retrying in {:?}", key, e, delay);
                }
                ErrorKind::Permanent => {
                    self.queue.forget(key).await;
                    warn!("Dropping DaemonSet {}: {}", key, e);
                }
            },
        }
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
