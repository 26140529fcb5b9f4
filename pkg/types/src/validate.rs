use anyhow::{Context, Result};

use crate::daemonset::DaemonSet;

/// Check the parts of a DaemonSet the controller relies on to place pods:
/// selector expressions and the template's node affinity must be well formed.
///
/// An empty selector is not rejected here; callers treat "selects everything"
/// as its own misconfiguration.
pub fn validate_daemon_set(ds: &DaemonSet) -> Result<()> {
    ds.spec
        .selector
        .validate()
        .with_context(|| format!("invalid selector on DaemonSet {}", ds.key()))?;
    if let Some(affinity) = &ds.spec.template.spec.affinity {
        affinity
            .validate()
            .with_context(|| format!("invalid node affinity on DaemonSet {}", ds.key()))?;
    }
    Ok(())
}
