//! Prometheus exporter setup
//!
//! The metric names themselves live in `session_refresh::metrics`; this only
//! decides how they are exposed.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use session_refresh::metrics::REQUEST_DURATION_SECONDS;

/// Bucket boundaries for call durations, 5ms up to the 60s upper end of the
/// configurable request timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Exporter builder with the call-duration histogram rendered as a real
/// Prometheus histogram (`_bucket` lines) instead of the default summary.
pub fn exporter() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
        DURATION_BUCKETS,
    )
}
