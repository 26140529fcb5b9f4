use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::meta::OwnerReference;
use crate::selector::NodeAffinity;

// --- Resource requirements ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResourceRequirements {
    /// CPU in millicores (1000 = 1 core)
    #[serde(default)]
    pub cpu_millis: u64,
    /// Memory in bytes
    #[serde(default)]
    pub memory_bytes: u64,
}

impl ResourceRequirements {
    pub fn is_zero(&self) -> bool {
        self.cpu_millis == 0 && self.memory_bytes == 0
    }

    pub fn saturating_add(self, other: ResourceRequirements) -> ResourceRequirements {
        ResourceRequirements {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }
}

// --- Container spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerPort {
    #[serde(default)]
    pub name: Option<String>,
    pub container_port: u16,
    /// Port bound on the node itself. Two pods on one node cannot share it.
    #[serde(default)]
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

// --- Pod phase ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Succeeded and Failed pods hold no node resources and never come back.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
            PodPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

// --- Pod conditions ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PodConditionType {
    PodScheduled,
    Initialized,
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: PodConditionType,
    pub status: bool,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
}

// --- Pod spec ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodSpec {
    pub containers: Vec<ContainerSpec>,
    /// Pins the pod to the node with this name.
    #[serde(default)]
    pub node_name: Option<String>,
    /// Only run on nodes carrying all of these labels
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
    #[serde(default)]
    pub affinity: Option<NodeAffinity>,
}

impl PodSpec {
    /// Sum of the resource requests of all containers.
    pub fn resource_requests(&self) -> ResourceRequirements {
        self.containers
            .iter()
            .fold(ResourceRequirements::default(), |acc, c| {
                acc.saturating_add(c.resources)
            })
    }

    /// Host ports bound by any container of the pod.
    pub fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.containers
            .iter()
            .flat_map(|c| c.ports.iter())
            .filter_map(|p| p.host_port)
            .filter(|p| *p != 0)
    }
}

/// Labels and spec stamped onto every pod created from a workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub spec: PodSpec,
}

// --- Pod ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub spec: PodSpec,
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
    /// The node this pod is bound to
    #[serde(default)]
    pub node_name: Option<String>,
    /// Labels for selector-based matching
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Controller that manages this pod, if any
    #[serde(default)]
    pub owner_ref: Option<OwnerReference>,
    pub created_at: DateTime<Utc>,
    /// Set once deletion of the pod has been requested.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl Pod {
    /// Active pods occupy their node; terminal ones do not.
    pub fn is_active(&self) -> bool {
        !self.phase.is_terminal()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    fn ready_condition(&self) -> Option<&PodCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == PodConditionType::Ready)
    }

    pub fn is_ready(&self) -> bool {
        self.ready_condition().is_some_and(|c| c.status)
    }

    /// True when the pod has been ready for at least `min_ready_seconds` at `now`.
    /// A ready condition without a transition time counts as ready since forever.
    pub fn is_available(&self, min_ready_seconds: u32, now: DateTime<Utc>) -> bool {
        let Some(ready) = self.ready_condition().filter(|c| c.status) else {
            return false;
        };
        if min_ready_seconds == 0 {
            return true;
        }
        ready.last_transition_time.is_none_or(|since| {
            now.signed_duration_since(since)
                >= chrono::Duration::seconds(i64::from(min_ready_seconds))
        })
    }

    /// Owner reference of the managing controller, ignoring non-controller owners.
    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_ref.as_ref().filter(|r| r.controller)
    }
}
