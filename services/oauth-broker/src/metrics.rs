//! Prometheus metrics exposition
//!
//! - `oauth_logins_total` (counter): label `provider`
//! - `oauth_callbacks_total` (counter): labels `provider`, `outcome`
//! - `oauth_token_exchange_duration_seconds` (histogram): label `provider`
//! - `oauth_pending_authorizations` (gauge)

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const EXCHANGE_DURATION: &str = "oauth_token_exchange_duration_seconds";

/// Bucket boundaries from 5ms up to the longest sensible exchange timeout.
const EXCHANGE_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(EXCHANGE_DURATION.to_string()), EXCHANGE_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// Called once at startup; a second install panics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_login(provider: &str) {
    metrics::counter!("oauth_logins_total", "provider" => provider.to_string()).increment(1);
}

/// `provider` is `"unknown"` when the callback could not be attributed.
pub fn record_callback(provider: &str, outcome: &'static str) {
    metrics::counter!(
        "oauth_callbacks_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_exchange_duration(provider: &str, duration_secs: f64) {
    metrics::histogram!(EXCHANGE_DURATION, "provider" => provider.to_string())
        .record(duration_secs);
}

pub fn set_pending_authorizations(count: usize) {
    metrics::gauge!("oauth_pending_authorizations").set(count as f64);
}

#[cfg(test)]
pub fn test_handle() -> PrometheusHandle {
    builder().build_recorder().handle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Isolated recorder/handle pair; install_recorder() would clash with
    /// other tests over the global singleton.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_login("webex");
        record_callback("unknown", "unrecognized_state");
        record_exchange_duration("snowflake", 0.2);
        set_pending_authorizations(3);
    }

    #[test]
    fn callbacks_are_labelled_by_provider_and_outcome() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_callback("snowflake", "success");
        record_callback("unknown", "unrecognized_state");

        let output = handle.render();
        assert!(output.contains("oauth_callbacks_total"));
        assert!(output.contains("provider=\"snowflake\""));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"unrecognized_state\""));
    }

    #[test]
    fn exchange_duration_renders_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_exchange_duration("webex", 0.003);

        let output = handle.render();
        assert!(
            output.contains("oauth_token_exchange_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"30\""));
        assert!(output.contains("le=\"+Inf\""));
    }

    #[test]
    fn pending_gauge_is_rendered() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login("snowflake");
        set_pending_authorizations(2);

        let output = handle.render();
        assert!(output.contains("oauth_logins_total{provider=\"snowflake\"} 1"));
        assert!(output.contains("oauth_pending_authorizations 2"));
    }
}
