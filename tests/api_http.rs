// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use common::{pipeline, SiteFetcher, PRICING_HTML};
use vendor_facts::api::{self, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    api::router(AppState::new(pipeline(&SiteFetcher::acme())))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

fn post(uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("build GET")
}

fn run_body(lanes: &[&str]) -> Json {
    json!({
        "org_id": "org1",
        "vendor": { "id": "acme", "name": "Acme", "website": "https://acme.test" },
        "lanes": lanes,
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let resp = test_router().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn classify_previews_lane_and_why() {
    let app = test_router();
    let (status, v) = send(
        &app,
        post(
            "/classify",
            json!({ "url": "https://acme.test/pricing", "html": PRICING_HTML, "metric": "pricing" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["classification"]["metric"], "pricing");
    assert_eq!(v["lane_score"]["lane"], "pricing");
    assert_eq!(v["title"], "Pricing | Acme");
    assert!(v["text"].as_str().unwrap().contains("$49 per month"));
    assert!(!v["text"].as_str().unwrap().contains("Home Docs Login"));

    let (status, v) = send(
        &app,
        post("/classify", json!({ "url": "https://acme.test/about", "html": "<p>hello there</p>" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["classification"]["metric"], "unknown");
    assert!(v.get("lane_score").is_none());
}

#[tokio::test]
async fn run_then_read_facts_updates_and_comparison() {
    let app = test_router();

    let (status, v) = send(&app, post("/runs", run_body(&["pricing"]))).await;
    assert_eq!(status, StatusCode::OK, "{v}");
    assert_eq!(v["vendor_id"], "acme");
    assert_eq!(v["reports"][0]["state"], "done");
    assert_eq!(v["reports"][0]["saved"], 1);

    let (status, facts) = send(&app, get("/vendors/acme/facts?lane=pricing")).await;
    assert_eq!(status, StatusCode::OK);
    let facts = facts.as_array().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0]["metric"], "pricing");
    assert_eq!(facts[0]["key"], "49-usd-per-month");

    let (_, none) = send(&app, get("/vendors/acme/facts?lane=security")).await;
    assert!(none.as_array().unwrap().is_empty());

    let (status, updates) = send(&app, get("/vendors/acme/updates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updates[0]["type"], "added");
    assert_eq!(updates[0]["severity"], "high");

    let (status, table) = send(&app, get("/compare?lane=pricing&vendors=acme")).await;
    assert_eq!(status, StatusCode::OK, "{table}");
    assert_eq!(table["vendors"][0]["name"], "Acme");
    assert_eq!(table["rows"][0]["label"], "pro (49-usd-per-month)");
    assert!(table["rows"][0]["cells"][0]["answer_score"].as_f64().unwrap() > 0.0);

    let (status, n) = send(&app, post("/narrative", json!({ "lane": "pricing", "vendors": ["acme"] }))).await;
    assert_eq!(status, StatusCode::OK, "{n}");
    assert_eq!(n["provider"], "disabled");
    assert!(n["bullets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_input_is_a_client_error() {
    let app = test_router();

    let (status, v) = send(&app, get("/vendors/acme/facts?lane=weather")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("unknown lane"));

    let mut body = run_body(&["pricing"]);
    body["vendor"]["website"] = json!("not a url");
    let (status, _) = send(&app, post("/runs", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/compare?lane=pricing&vendors=ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
