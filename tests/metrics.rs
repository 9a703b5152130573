// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file holds a single test.

mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{acme, pipeline, SiteFetcher};
use vendor_facts::api::{self, AppState};
use vendor_facts::metrics::Metrics;
use vendor_facts::Lane;

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_series() {
    let metrics = Metrics::init().expect("install recorder");
    let state = AppState::new(pipeline(&SiteFetcher::acme())).with_metrics(metrics);

    state.pipeline().run("org1", &acme(), &[Lane::Pricing]).await;

    let app = api::router(state);
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    for series in [
        "pipeline_runs_total",
        "crawler_hits_total",
        "facts_saved_total",
        "update_events_total",
        "pipeline_last_run_ts",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains("lane=\"pricing\""));
}
