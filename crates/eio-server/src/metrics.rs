//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Sessions opened total (counter, labels: transport).
pub const SESSIONS_OPENED_TOTAL: &str = "eio_sessions_opened_total";
/// Sessions closed total (counter).
pub const SESSIONS_CLOSED_TOTAL: &str = "eio_sessions_closed_total";
/// Open sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "eio_sessions_active";
/// Completed polling → websocket upgrades (counter).
pub const UPGRADES_TOTAL: &str = "eio_upgrades_total";
/// Discarded upgrade attempts (counter).
pub const UPGRADE_FAILURES_TOTAL: &str = "eio_upgrade_failures_total";
/// Malformed client packets or bodies (counter).
pub const DECODE_ERRORS_TOTAL: &str = "eio_decode_errors_total";
/// Packets handed to a transport (counter).
pub const PACKETS_SENT_TOTAL: &str = "eio_packets_sent_total";
/// Packets received from clients (counter).
pub const PACKETS_RECEIVED_TOTAL: &str = "eio_packets_received_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SESSIONS_OPENED_TOTAL,
            SESSIONS_CLOSED_TOTAL,
            SESSIONS_ACTIVE,
            UPGRADES_TOTAL,
            UPGRADE_FAILURES_TOTAL,
            DECODE_ERRORS_TOTAL,
            PACKETS_SENT_TOTAL,
            PACKETS_RECEIVED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
            assert!(name.starts_with("eio_"), "metric name '{name}' must be prefixed");
        }
    }
}
