use async_trait::async_trait;
use chrono::Utc;
use pkg_state::client::StateStore;
use pkg_state::watch::ResourceKind;
use pkg_types::daemonset::{DaemonSet, DaemonSetStatus};
use pkg_types::meta::{OwnerReference, object_key};
use pkg_types::pod::{Pod, PodPhase, PodTemplateSpec};
use tracing::debug;
use uuid::Uuid;

/// Writes issued by the controller. Every call is independent; callers may
/// run many of them concurrently.
#[async_trait]
pub trait PodControl: Send + Sync {
    /// Create a pod from `template` bound to `node_name`, owned by `owner`.
    async fn create_pod(
        &self,
        namespace: &str,
        template: &PodTemplateSpec,
        node_name: &str,
        owner: &OwnerReference,
    ) -> anyhow::Result<()>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()>;

    async fn update_daemon_set_status(
        &self,
        daemon_set: &DaemonSet,
        status: &DaemonSetStatus,
    ) -> anyhow::Result<()>;
}

/// [`PodControl`] that writes straight into the state store.
#[derive(Clone)]
pub struct StorePodControl {
    store: StateStore,
}

impl StorePodControl {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

/// Build the pod object for a create request. The name is the owner's name
/// plus a random suffix.
pub fn pod_from_template(
    namespace: &str,
    template: &PodTemplateSpec,
    node_name: &str,
    owner: &OwnerReference,
) -> Pod {
    let id = Uuid::new_v4().to_string();
    let suffix: String = id.chars().filter(|c| *c != '-').take(5).collect();
    let mut spec = template.spec.clone();
    spec.node_name = Some(node_name.to_string());
    Pod {
        name: format!("{}-{}", owner.name, suffix),
        id,
        namespace: namespace.to_string(),
        spec,
        phase: PodPhase::Pending,
        conditions: vec![],
        node_name: Some(node_name.to_string()),
        labels: template.labels.clone(),
        owner_ref: Some(owner.clone()),
        created_at: Utc::now(),
        deletion_timestamp: None,
    }
}

#[async_trait]
impl PodControl for StorePodControl {
    async fn create_pod(
        &self,
        namespace: &str,
        template: &PodTemplateSpec,
        node_name: &str,
        owner: &OwnerReference,
    ) -> anyhow::Result<()> {
        let pod = pod_from_template(namespace, template, node_name, owner);
        let key = ResourceKind::Pod.registry_key(&object_key(namespace, &pod.name));
        self.store.put_json(&key, &pod).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        let key = ResourceKind::Pod.registry_key(&object_key(namespace, name));
        self.store.delete(&key).await
    }

    async fn update_daemon_set_status(
        &self,
        daemon_set: &DaemonSet,
        status: &DaemonSetStatus,
    ) -> anyhow::Result<()> {
        let key = ResourceKind::DaemonSet.registry_key(&daemon_set.key());
        let Some(mut stored) = self.store.get_json::<DaemonSet>(&key).await? else {
            debug!("DaemonSet {} gone before status update", daemon_set.key());
            return Ok(());
        };
        if stored.id != daemon_set.id {
            anyhow::bail!(
                "DaemonSet {} was replaced (uid {} != {})",
                daemon_set.key(),
                stored.id,
                daemon_set.id
            );
        }
        if stored.generation != daemon_set.generation {
            anyhow::bail!(
                "DaemonSet {} changed during sync (generation {} != {})",
                daemon_set.key(),
                stored.generation,
                daemon_set.generation
            );
        }
        stored.status = status.clone();
        self.store.put_json(&key, &stored).await
    }
}
