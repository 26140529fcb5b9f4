//! Events recorded against DaemonSets while syncing.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReason {
    /// The selector has no criteria and would claim every pod.
    SelectingAll,
    /// Malformed selector or node affinity expression.
    InvalidConfiguration,
    /// The node wants a daemon pod but cannot fit one right now.
    FailedPlacement,
    SuccessfulCreate,
    FailedCreate,
    SuccessfulDelete,
    FailedDelete,
}

impl std::fmt::Display for EventReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventReason::SelectingAll => "SelectingAll",
            EventReason::InvalidConfiguration => "InvalidConfiguration",
            EventReason::FailedPlacement => "FailedPlacement",
            EventReason::SuccessfulCreate => "SuccessfulCreate",
            EventReason::FailedCreate => "FailedCreate",
            EventReason::SuccessfulDelete => "SuccessfulDelete",
            EventReason::FailedDelete => "FailedDelete",
        };
        f.write_str(s)
    }
}

pub trait EventRecorder: Send + Sync {
    fn record(&self, object_key: &str, event_type: EventType, reason: EventReason, message: String);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, object_key: &str, event_type: EventType, reason: EventReason, message: String) {
        match event_type {
            EventType::Normal => info!(daemonset = %object_key, %reason, "{}", message),
            EventType::Warning => warn!(daemonset = %object_key, %reason, "{}", message),
        }
    }
}
