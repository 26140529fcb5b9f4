use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Node conditions ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeConditionType {
    Ready,
    OutOfDisk,
    MemoryPressure,
    DiskPressure,
}

impl std::fmt::Display for NodeConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeConditionType::Ready => write!(f, "Ready"),
            NodeConditionType::OutOfDisk => write!(f, "OutOfDisk"),
            NodeConditionType::MemoryPressure => write!(f, "MemoryPressure"),
            NodeConditionType::DiskPressure => write!(f, "DiskPressure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub condition_type: NodeConditionType,
    pub status: bool,
}

// --- Allocatable capacity ---

/// Resources a node offers to pods. A zero value means "not reported"
/// and is not enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NodeResources {
    #[serde(default)]
    pub cpu_millis: u64,
    #[serde(default)]
    pub memory_bytes: u64,
    /// Maximum number of pods the node accepts
    #[serde(default)]
    pub pods: u32,
}

// --- Persisted Node object ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
    #[serde(default)]
    pub allocatable: NodeResources,
    pub registered_at: DateTime<Utc>,
}

impl Node {
    /// Status of the condition of the given type, if the node reports it.
    pub fn condition(&self, condition_type: NodeConditionType) -> Option<bool> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
            .map(|c| c.status)
    }

    /// A node is ready only when it reports `Ready=true`.
    pub fn is_ready(&self) -> bool {
        self.condition(NodeConditionType::Ready) == Some(true)
    }

    /// True when the node reports the condition and it is set.
    pub fn has_condition(&self, condition_type: NodeConditionType) -> bool {
        self.condition(condition_type) == Some(true)
    }
}
