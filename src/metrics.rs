use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register help text for every series the crate emits. Idempotent.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawler_fetch_total", "HTTP fetch attempts, retries included.");
        describe_counter!(
            "crawler_fetch_errors_total",
            "Fetches that failed after all retries."
        );
        describe_counter!(
            "crawler_pages_skipped_total",
            "Fetched pages skipped as 304, non-2xx or too short."
        );
        describe_counter!("crawler_hits_total", "Pages accepted as lane hits.");
        describe_counter!(
            "crawler_headless_renders_total",
            "Pages sent to the headless renderer."
        );
        describe_histogram!("crawler_fetch_ms", "Fetch latency in milliseconds.");
        describe_counter!("facts_saved_total", "Facts added or changed.");
        describe_counter!(
            "facts_skipped_total",
            "Extracted candidates held back by the publish gates."
        );
        describe_counter!(
            "facts_unchanged_total",
            "Facts re-confirmed without a value change."
        );
        describe_counter!("update_events_total", "Update events appended.");
        describe_counter!("pipeline_runs_total", "Lane runs started.");
        describe_counter!("pipeline_lane_errors_total", "Lane runs ending in the error state.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix timestamp of the last finished pipeline run."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
