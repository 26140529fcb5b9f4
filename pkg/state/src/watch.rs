use pkg_constants::state::{DAEMONSETS_PREFIX, NODES_PREFIX, PODS_PREFIX, WATCH_CHANNEL_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

/// Object kinds kept under `/registry/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Node,
    Pod,
    DaemonSet,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Node, ResourceKind::Pod, ResourceKind::DaemonSet];

    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::Node => NODES_PREFIX,
            ResourceKind::Pod => PODS_PREFIX,
            ResourceKind::DaemonSet => DAEMONSETS_PREFIX,
        }
    }

    /// Split a registry key into its kind and cache key
    /// (`<name>` for nodes, `<namespace>/<name>` otherwise).
    pub fn parse_key(key: &str) -> Option<(ResourceKind, &str)> {
        Self::ALL.into_iter().find_map(|kind| {
            key.strip_prefix(kind.prefix())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (kind, rest))
        })
    }

    /// Registry key for the object with the given cache key.
    pub fn registry_key(&self, object_key: &str) -> String {
        format!("{}{}", self.prefix(), object_key)
    }
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub seq: u64,
    pub event_type: EventType,
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

/// In-memory event log that tracks all state mutations with monotonic sequence numbers.
/// Subscribers receive every event; a bounded tail is kept for catching up after lag.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

struct EventLogInner {
    seq: u64,
    events: VecDeque<WatchEvent>,
    max_events: usize,
}

impl EventLog {
    /// Create a new event log retaining at most `max_events` recent events.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events,
            })),
            sender,
        }
    }

    /// Record a new event. Called by StateStore on put/delete.
    pub async fn emit(&self, event_type: EventType, key: String, value: Option<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let event = WatchEvent {
            seq: inner.seq,
            event_type,
            key,
            value,
        };
        if inner.events.len() >= inner.max_events {
            inner.events.pop_front();
        }
        inner.events.push_back(event.clone());
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// All retained events after `from_seq`, or `None` when some of them
    /// have already been dropped from the tail.
    pub async fn events_since(&self, from_seq: u64) -> Option<Vec<WatchEvent>> {
        let inner = self.inner.read().await;
        if let Some(oldest) = inner.events.front()
            && oldest.seq > from_seq + 1
        {
            return None;
        }
        Some(
            inner
                .events
                .iter()
                .filter(|e| e.seq > from_seq)
                .cloned()
                .collect(),
        )
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_keys() {
        assert_eq!(
            ResourceKind::parse_key("/registry/nodes/node-1"),
            Some((ResourceKind::Node, "node-1"))
        );
        assert_eq!(
            ResourceKind::parse_key("/registry/pods/default/fluentd-x1"),
            Some((ResourceKind::Pod, "default/fluentd-x1"))
        );
        assert_eq!(
            ResourceKind::parse_key("/registry/daemonsets/kube-system/fluentd"),
            Some((ResourceKind::DaemonSet, "kube-system/fluentd"))
        );
        assert_eq!(ResourceKind::parse_key("/registry/leases/x"), None);
        assert_eq!(ResourceKind::parse_key("/registry/nodes/"), None);
        assert_eq!(
            ResourceKind::Pod.registry_key("default/p"),
            "/registry/pods/default/p"
        );
    }

    #[tokio::test]
    async fn events_are_sequenced_and_broadcast() {
        let log = EventLog::new(8);
        let mut rx = log.subscribe();
        log.emit(EventType::Put, "/registry/nodes/a".to_string(), Some(b"{}".to_vec()))
            .await;
        log.emit(EventType::Delete, "/registry/nodes/a".to_string(), None)
            .await;

        assert_eq!(log.current_seq().await, 2);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(first.event_type, EventType::Put);
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::Delete);
    }

    #[tokio::test]
    async fn events_since_detects_gaps() {
        let log = EventLog::new(2);
        for i in 0..4 {
            log.emit(EventType::Put, format!("/registry/nodes/{}", i), None)
                .await;
        }
        // Retained: seq 3 and 4
        assert!(log.events_since(0).await.is_none());
        let tail = log.events_since(2).await.unwrap();
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);
        assert!(log.events_since(4).await.unwrap().is_empty());
    }
}
