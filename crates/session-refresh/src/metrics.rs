//! Refresh coordination metrics
//!
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_refresh_waiters_total` (counter): callers that joined an open window
//! - `session_stream_deferred_total` (counter): stream connections held for a refresh
//! - `session_replays_total` (counter): calls replayed after a refresh
//! - `session_request_duration_seconds` (histogram): label `status`

/// Name of the per-call duration histogram.
pub const REQUEST_DURATION_SECONDS: &str = "session_request_duration_seconds";

/// Record a settled refresh window.
pub fn record_refresh(outcome: &str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a caller that waited on someone else's refresh.
pub fn record_waiter() {
    metrics::counter!("session_refresh_waiters_total").increment(1);
}

/// Record a stream connection deferred until a refresh settles.
pub fn record_stream_deferred() {
    metrics::counter!("session_stream_deferred_total").increment(1);
}

/// Record a call replayed after a successful refresh.
pub fn record_replay() {
    metrics::counter!("session_replays_total").increment(1);
}

/// Record one dispatched call, timed from its dispatch timestamp.
pub fn record_request(status: u16, duration_secs: f64) {
    metrics::histogram!(REQUEST_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{RefreshCoordinator, RefreshOutcome};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    /// Isolated recorder so tests don't fight over the global one.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_refresh("success");
        record_waiter();
        record_stream_deferred();
        record_replay();
        record_request(200, 0.01);
    }

    #[test]
    fn settled_window_is_counted_by_outcome() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let coordinator = RefreshCoordinator::new();
        assert!(coordinator.begin());
        let _waiter = coordinator.enqueue_continuation().unwrap();
        coordinator.finish(RefreshOutcome::Success);
        assert!(coordinator.begin());
        coordinator.finish(RefreshOutcome::Failure("revoked".into()));

        let output = handle.render();
        assert!(output.contains("session_refresh_total"), "got: {output}");
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"failure\""));
        assert!(output.contains("session_refresh_waiters_total 1"));
    }

    #[test]
    fn request_duration_carries_status_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(401, 0.02);
        record_replay();

        let output = handle.render();
        assert!(output.contains("session_request_duration_seconds"));
        assert!(output.contains("status=\"401\""));
        assert!(output.contains("session_replays_total 1"));
    }
}
