//! Prometheus metrics for scoreline-server.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// Metric names as constants for consistency
const MUTATIONS_TOTAL: &str = "scoreline_mutations_total";
const IDEMPOTENT_REPLAYS_TOTAL: &str = "scoreline_idempotent_replays_total";
const VALIDATION_FAILURES_TOTAL: &str = "scoreline_validation_failures_total";
const GAMES_STORED: &str = "scoreline_games_stored";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record an applied game mutation.
///
/// # Arguments
///
/// * `operation` - Mutation name (e.g., "create_game", "append_event")
/// * `success` - Whether the mutation was applied
pub fn record_mutation(operation: &str, success: bool) {
    counter!(
        MUTATIONS_TOTAL,
        "operation" => operation.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

/// Record a mutation that was skipped because its idempotency key was
/// already applied. A high rate here means clients are replaying after
/// connectivity gaps, which is expected; a sudden spike is worth a look.
pub fn record_idempotent_replay(operation: &str) {
    counter!(
        IDEMPOTENT_REPLAYS_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `field` - The field that failed validation
pub fn record_validation_failure(field: &str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "field" => field.to_string()
    )
    .increment(1);
}

/// Update the stored game count gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_games_stored(count: usize) {
    gauge!(GAMES_STORED).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording against an uninstalled recorder is a no-op; these just
    // exercise the label plumbing.
    #[test]
    fn test_record_functions_do_not_panic() {
        record_mutation("create_game", true);
        record_mutation("append_event", false);
        record_idempotent_replay("create_game");
        record_validation_failure("home_team");
        set_games_stored(3);
    }
}
