//! State store / cache constants.

/// Key prefix under which Node objects are stored: `/registry/nodes/<name>`.
pub const NODES_PREFIX: &str = "/registry/nodes/";

/// Key prefix under which Pod objects are stored: `/registry/pods/<ns>/<name>`.
pub const PODS_PREFIX: &str = "/registry/pods/";

/// Key prefix under which DaemonSet objects are stored:
/// `/registry/daemonsets/<ns>/<name>`.
pub const DAEMONSETS_PREFIX: &str = "/registry/daemonsets/";

/// Number of recent watch events retained by the in-memory event log.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Buffer size of the broadcast channel carrying store watch events.
pub const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Buffer size of the broadcast channel carrying cache notifications.
pub const CACHE_EVENT_CHANNEL_CAPACITY: usize = 1024;
