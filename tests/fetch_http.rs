// tests/fetch_http.rs
//
// HttpFetcher against a real local server: conditional GET, retries,
// body caps and non-HTML responses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use http::{header, HeaderMap, StatusCode};
use vendor_facts::config::PipelineConfig;
use vendor_facts::fetch::{CacheValidators, FetchOptions, Fetcher, HttpFetcher};

const PAGE: &str = "<html><head><title>Pricing</title></head><body><main>$49 per month</main></body></html>";
const ETAG: &str = "\"v1\"";
const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

async fn page(headers: HeaderMap) -> impl IntoResponse {
    if headers
        .get(header::IF_NONE_MATCH)
        .is_some_and(|v| v.as_bytes() == ETAG.as_bytes())
    {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, ETAG)]).into_response();
    }
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::ETAG, ETAG),
            (header::LAST_MODIFIED, LAST_MODIFIED),
        ],
        PAGE,
    )
        .into_response()
}

async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ([(header::CONTENT_TYPE, "text/html")], PAGE).into_response()
}

async fn big() -> impl IntoResponse {
    let body = format!("<html><body>{}</body></html>", "é".repeat(300_000));
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], body)
}

async fn pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], "%PDF-1.4")
}

/// Bind an ephemeral port and serve the fixture routes; returns the base URL.
async fn serve() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/pricing", get(page))
        .route("/flaky", get(flaky))
        .route("/doc.pdf", get(pdf))
        .route("/big", get(big))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn fetcher() -> HttpFetcher {
    let cfg = PipelineConfig {
        fetch_timeout_secs: 5,
        fetch_retries: 2,
        retry_backoff_ms: 10,
        ..PipelineConfig::default()
    };
    HttpFetcher::new(&cfg).unwrap()
}

#[tokio::test]
async fn validators_round_trip_to_not_modified() {
    let (base, _) = serve().await;
    let f = fetcher();
    let url = format!("{base}/pricing");

    let first = f.fetch(&url, None, FetchOptions::default()).await.unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.body.as_deref(), Some(PAGE));
    assert_eq!(first.etag.as_deref(), Some(ETAG));
    assert!(first.last_modified_at().is_some());

    let validators = first.validators();
    let second = f.fetch(&url, Some(&validators), FetchOptions::default()).await.unwrap();
    assert!(second.not_modified());
    assert!(second.body.is_none());

    // forced fresh fetches ignore the validators
    let fresh = f.fetch(&url, Some(&validators), FetchOptions::fresh()).await.unwrap();
    assert_eq!(fresh.status, 200);

    let stale = CacheValidators {
        etag: Some("\"v0\"".into()),
        last_modified: None,
    };
    let third = f.fetch(&url, Some(&stale), FetchOptions::default()).await.unwrap();
    assert_eq!(third.status, 200);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (base, hits) = serve().await;
    let res = fetcher()
        .fetch(&format!("{base}/flaky"), None, FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    assert!(res.body.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_html_and_missing_pages_have_no_body() {
    let (base, _) = serve().await;
    let f = fetcher();

    let pdf = f.fetch(&format!("{base}/doc.pdf"), None, FetchOptions::default()).await.unwrap();
    assert!(pdf.is_success());
    assert!(!pdf.is_html());
    assert!(pdf.body.is_none());

    let missing = f.fetch(&format!("{base}/nope"), None, FetchOptions::default()).await.unwrap();
    assert_eq!(missing.status, 404);
    assert!(missing.body.is_none());
}

#[tokio::test]
async fn oversized_body_is_cut_at_the_cap_on_a_char_boundary() {
    let (base, _) = serve().await;
    let cfg = PipelineConfig {
        fetch_timeout_secs: 5,
        // 12 bytes of markup, then two-byte chars: the cap splits one
        max_body_bytes: 1001,
        ..PipelineConfig::default()
    };
    let res = HttpFetcher::new(&cfg)
        .unwrap()
        .fetch(&format!("{base}/big"), None, FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    let body = res.body.unwrap();
    assert_eq!(body.len(), 1000);
    assert!(body.starts_with("<html><body>é"));
    assert!(!body.contains('\u{FFFD}'));
    assert!(body.chars().skip(12).all(|c| c == 'é'));
}
