//! Prometheus recorder setup.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for the Session Controller
//! - `_total` suffix for counters
//!
//! The individual metrics are emitted where the events happen (actor
//! metrics, escalation engine, broadcast router); this module only
//! installs the recorder and describes the metric families.

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder and return the handle for
/// serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g., already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))?;

    describe_gauge!("sc_sessions_active", "Current live sessions");
    describe_gauge!("sc_participants_connected", "Current connected participants");
    describe_gauge!("sc_actor_mailbox_depth", "Actor mailbox depth by actor type");
    describe_counter!(
        "sc_moderation_analyses_total",
        "Completed moderation analyses by verdict severity"
    );
    describe_counter!(
        "sc_escalations_total",
        "Escalation dispatches by action"
    );
    describe_counter!(
        "sc_crisis_sequences_total",
        "Crisis-intervention sequences fired"
    );
    describe_counter!("sc_emergency_alerts_total", "Emergency reports filed");
    describe_counter!("sc_actor_panics_total", "Panicked actor tasks by actor type");

    Ok(handle)
}
