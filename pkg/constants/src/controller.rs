//! DaemonSet controller constants.

/// Number of workers draining the DaemonSet work queue.
pub const DEFAULT_WORKERS: usize = 2;

/// Every known DaemonSet is re-enqueued at this interval, in seconds.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

/// Upper bound on create/delete calls in flight during a single sync.
pub const DEFAULT_OPERATION_CONCURRENCY: usize = 16;

/// First retry delay for a failing DaemonSet key, in milliseconds.
/// Doubles on every consecutive failure.
pub const DEFAULT_BACKOFF_BASE_MILLIS: u64 = 5;

/// Retry delay ceiling for a failing DaemonSet key, in seconds.
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// How often workers poll the listers while waiting for the initial sync, in milliseconds.
pub const CACHE_SYNC_POLL_MILLIS: u64 = 100;

/// Label stamped on every daemon pod with the DaemonSet generation it was created from.
pub const TEMPLATE_GENERATION_LABEL: &str = "pod-template-generation";

/// Owner reference kind used for pods created by the controller.
pub const DAEMONSET_KIND: &str = "DaemonSet";
