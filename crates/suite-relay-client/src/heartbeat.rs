//! Session keep-alive.

use suite_relay_core::Remote;

/// Heartbeat period in milliseconds for a remote idle timeout in seconds.
///
/// The heartbeat fires one second before the remote would reap the session.
/// No heartbeat is needed when there is no finite timeout of at least one
/// second.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn heartbeat_interval(idle_timeout: Option<f64>) -> Option<u64> {
    match idle_timeout {
        Some(secs) if secs.is_finite() && secs >= 1.0 => Some(((secs - 1.0) * 1000.0).round() as u64),
        _ => None,
    }
}

/// Disable the remote heartbeat, logging failures.
pub async fn stop_heartbeat(remote: &dyn Remote) {
    if let Err(e) = remote.set_heartbeat_interval(0).await {
        tracing::warn!(session_id = remote.session_id(), "Failed to stop heartbeat: {e}");
    }
}
