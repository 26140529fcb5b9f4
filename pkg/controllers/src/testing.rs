//! In-memory doubles for controller tests.

use async_trait::async_trait;
use pkg_state::cache::{ClusterCache, Object};
use pkg_state::lister::DaemonSetLister;
use pkg_state::watch::ResourceKind;
use pkg_types::daemonset::{DaemonSet, DaemonSetStatus};
use pkg_types::meta::{OwnerReference, object_key};
use pkg_types::pod::PodTemplateSpec;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::control::{PodControl, pod_from_template};
use crate::events::{EventReason, EventRecorder, EventType};

#[derive(Debug, Clone)]
pub struct CreateCall {
    pub namespace: String,
    pub node_name: String,
    pub template: PodTemplateSpec,
    pub owner: OwnerReference,
}

/// Records every call. When built with a cache, successful calls are also
/// applied to it so a following sync sees their effect.
#[derive(Default)]
pub struct FakePodControl {
    pub creates: Mutex<Vec<CreateCall>>,
    pub deletes: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<DaemonSetStatus>>,
    fail_creates_on: Mutex<HashSet<String>>,
    fail_status: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    cache: Option<Arc<ClusterCache>>,
}

impl FakePodControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applying_to(cache: Arc<ClusterCache>) -> Self {
        Self {
            cache: Some(cache),
            ..Default::default()
        }
    }

    pub fn fail_creates_on(&self, node_name: &str) {
        self.fail_creates_on
            .lock()
            .unwrap()
            .insert(node_name.to_string());
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    pub fn last_status(&self) -> Option<DaemonSetStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    /// Most pod calls that were ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Count one call as running, then give the other calls a chance to start.
    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.creates.lock().unwrap().clear();
        self.deletes.lock().unwrap().clear();
        self.statuses.lock().unwrap().clear();
    }
}

#[async_trait]
impl PodControl for FakePodControl {
    async fn create_pod(
        &self,
        namespace: &str,
        template: &PodTemplateSpec,
        node_name: &str,
        owner: &OwnerReference,
    ) -> anyhow::Result<()> {
        self.enter().await;
        self.exit();
        self.creates.lock().unwrap().push(CreateCall {
            namespace: namespace.to_string(),
            node_name: node_name.to_string(),
            template: template.clone(),
            owner: owner.clone(),
        });
        if self.fail_creates_on.lock().unwrap().contains(node_name) {
            anyhow::bail!("injected create failure on {}", node_name);
        }
        if let Some(cache) = &self.cache {
            cache.apply(Object::Pod(pod_from_template(namespace, template, node_name, owner)));
        }
        Ok(())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        self.enter().await;
        self.exit();
        let key = object_key(namespace, name);
        self.deletes.lock().unwrap().push(key.clone());
        if let Some(cache) = &self.cache {
            cache.remove(ResourceKind::Pod, &key);
        }
        Ok(())
    }

    async fn update_daemon_set_status(
        &self,
        daemon_set: &DaemonSet,
        status: &DaemonSetStatus,
    ) -> anyhow::Result<()> {
        if self.fail_status.load(Ordering::SeqCst) {
            anyhow::bail!("injected status failure");
        }
        self.statuses.lock().unwrap().push(status.clone());
        if let Some(cache) = &self.cache
            && let Some(mut stored) = cache.get_daemon_set(&daemon_set.key())
        {
            stored.status = status.clone();
            cache.apply(Object::DaemonSet(stored));
        }
        Ok(())
    }
}

/// Keeps every recorded event.
#[derive(Default)]
pub struct RecordingRecorder {
    pub events: Mutex<Vec<(String, EventType, EventReason, String)>>,
}

impl RecordingRecorder {
    pub fn reasons(&self) -> Vec<EventReason> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, reason, _)| *reason)
            .collect()
    }
}

impl EventRecorder for RecordingRecorder {
    fn record(&self, object_key: &str, event_type: EventType, reason: EventReason, message: String) {
        self.events
            .lock()
            .unwrap()
            .push((object_key.to_string(), event_type, reason, message));
    }
}
