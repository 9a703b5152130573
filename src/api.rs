use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::classifier::{Classification, LaneScore};
use crate::compose::{comparison_table, compose_narrative, ComparisonTable, DisabledNarrator, Narrative, NarrativeClient, OpenAiNarrator};
use crate::config::{CompiledRegistry, LaneRegistry, PipelineConfig};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::lane::Lane;
use crate::metrics::Metrics;
use crate::model::{Fact, UpdateEvent, Vendor};
use crate::pipeline::{LaneReport, Pipeline};
use crate::render::{self, HeadlessRenderer};
use crate::store::{FactStore, MemoryStore};

pub type AppPipeline = Pipeline<MemoryStore, Box<dyn Fetcher>, Box<dyn HeadlessRenderer>>;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<AppPipeline>,
    vendors: Arc<RwLock<HashMap<String, Vendor>>>,
    narrator: Arc<dyn NarrativeClient>,
    snapshot: Option<PathBuf>,
    metrics: Option<Arc<Metrics>>,
}

impl AppState {
    pub fn new(pipeline: AppPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            vendors: Arc::new(RwLock::new(HashMap::new())),
            narrator: Arc::new(DisabledNarrator),
            snapshot: None,
            metrics: None,
        }
    }

    /// Persist the store to `path` after every run.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeClient>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    pub fn pipeline(&self) -> &AppPipeline {
        &self.pipeline
    }

    /// Production wiring: env config, lane registry from TOML, HTTP fetcher,
    /// configured renderer and the snapshot at `FACTS_STORE_PATH`.
    pub async fn from_env() -> anyhow::Result<Self> {
        let cfg = PipelineConfig::from_env();
        let registry: CompiledRegistry = LaneRegistry::from_toml()?.compile()?;
        let fetcher: Box<dyn Fetcher> = Box::new(HttpFetcher::new(&cfg)?);
        let renderer = render::from_config(&cfg)?;
        let path = std::env::var("FACTS_STORE_PATH").unwrap_or_else(|_| "state/facts.json".to_string());
        let store = MemoryStore::load(&path).await?;
        let pipeline = Pipeline::new(
            Arc::new(store),
            Arc::new(fetcher),
            Arc::new(renderer),
            Arc::new(registry),
            Arc::new(cfg),
        );
        let mut state = Self::new(pipeline).with_snapshot(path);
        if let Some(narrator) = OpenAiNarrator::from_env()? {
            state = state.with_narrator(Arc::new(narrator));
        }
        Ok(state)
    }
}

pub fn router(state: AppState) -> Router {
    let metrics_routes = state.metrics.as_ref().map(|m| m.router());
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/classify", post(classify))
        .route("/runs", post(run))
        .route("/compare", get(compare))
        .route("/narrative", post(narrative))
        .route("/vendors/{id}/facts", get(vendor_facts))
        .route("/vendors/{id}/updates", get(vendor_updates))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match metrics_routes {
        Some(m) => app.merge(m),
        None => app,
    }
}

struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

fn parse_lane(raw: Option<&str>) -> Result<Option<Lane>, ApiError> {
    raw.map(Lane::parse)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

#[derive(Deserialize)]
struct ClassifyReq {
    url: String,
    html: String,
    #[serde(default)]
    metric: Option<String>,
}

#[derive(Serialize)]
struct ClassifyResp {
    title: String,
    strategy: Option<&'static str>,
    text: String,
    classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    lane_score: Option<LaneScore>,
}

/// Debug preview: isolate and classify supplied HTML without fetching.
async fn classify(State(state): State<AppState>, Json(body): Json<ClassifyReq>) -> Result<Json<ClassifyResp>, ApiError> {
    let crawler = state.pipeline.crawler();
    let resp = match parse_lane(body.metric.as_deref())? {
        Some(lane) => {
            let view = crawler.view(&body.url, &body.html, lane);
            ClassifyResp {
                title: view.isolated.title,
                strategy: view.isolated.strategy,
                text: view.isolated.text,
                classification: view.classification,
                lane_score: Some(view.lane_score),
            }
        }
        None => {
            let isolated = crawler.isolator().isolate(&body.html);
            let text = format!("{}\n{}", isolated.title, isolated.text);
            ClassifyResp {
                classification: crawler.classifier().classify(&body.url, &text),
                title: isolated.title,
                strategy: isolated.strategy,
                text: isolated.text,
                lane_score: None,
            }
        }
    };
    Ok(Json(resp))
}

#[derive(Deserialize)]
struct VendorIn {
    id: String,
    name: String,
    website: String,
}

#[derive(Deserialize)]
struct RunReq {
    org_id: String,
    vendor: VendorIn,
    /// Defaults to every lane.
    #[serde(default)]
    lanes: Option<Vec<Lane>>,
}

#[derive(Serialize)]
struct RunResp {
    vendor_id: String,
    reports: Vec<LaneReport>,
}

async fn run(State(state): State<AppState>, Json(body): Json<RunReq>) -> Result<Json<RunResp>, ApiError> {
    let vendor = Vendor::new(&body.vendor.id, &body.vendor.name, &body.vendor.website)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let lanes = body.lanes.unwrap_or_else(|| Lane::ALL.to_vec());
    state
        .vendors
        .write()
        .await
        .insert(vendor.id.clone(), vendor.clone());

    let reports = state.pipeline.run(&body.org_id, &vendor, &lanes).await;

    if let Some(path) = &state.snapshot {
        if let Err(e) = state.pipeline.store().save(path).await {
            warn!(error = %format!("{e:#}"), "store snapshot failed");
        }
    }
    Ok(Json(RunResp {
        vendor_id: vendor.id,
        reports,
    }))
}

#[derive(Deserialize)]
struct LaneQuery {
    #[serde(default)]
    lane: Option<String>,
}

async fn vendor_facts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<LaneQuery>,
) -> Result<Json<Vec<Fact>>, ApiError> {
    let lane = parse_lane(q.lane.as_deref())?;
    let facts = state.pipeline.store().facts_for_vendor(&id, lane).await?;
    Ok(Json(facts))
}

async fn vendor_updates(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<UpdateEvent>>, ApiError> {
    Ok(Json(state.pipeline.store().update_events(&id).await?))
}

#[derive(Deserialize)]
struct CompareQuery {
    lane: String,
    /// Comma-separated vendor ids, as registered through `/runs`.
    vendors: String,
}

async fn known_vendors<'a>(state: &AppState, ids: impl Iterator<Item = &'a str>) -> Result<Vec<Vendor>, ApiError> {
    let known = state.vendors.read().await;
    ids.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|id| {
            known
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown vendor `{id}`")))
        })
        .collect()
}

async fn lane_facts(state: &AppState, vendors: &[Vendor], lane: Lane) -> Result<Vec<Fact>, ApiError> {
    let mut facts = Vec::new();
    for v in vendors {
        facts.extend(state.pipeline.store().facts_for_vendor(&v.id, Some(lane)).await?);
    }
    Ok(facts)
}

async fn compare(State(state): State<AppState>, Query(q): Query<CompareQuery>) -> Result<Json<ComparisonTable>, ApiError> {
    let lane = Lane::parse(&q.lane).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let vendors = known_vendors(&state, q.vendors.split(',')).await?;
    let facts = lane_facts(&state, &vendors, lane).await?;
    Ok(Json(comparison_table(lane, &vendors, &facts)))
}

#[derive(Deserialize)]
struct NarrativeReq {
    lane: Lane,
    vendors: Vec<String>,
    #[serde(default)]
    prompt: Option<String>,
}

async fn narrative(State(state): State<AppState>, Json(body): Json<NarrativeReq>) -> Result<Json<Narrative>, ApiError> {
    let vendors = known_vendors(&state, body.vendors.iter().map(String::as_str)).await?;
    let facts = lane_facts(&state, &vendors, body.lane).await?;
    let prompt = body.prompt.unwrap_or_else(|| {
        let names: Vec<&str> = vendors.iter().map(|v| v.name.as_str()).collect();
        format!("Compare {} on {}.", names.join(", "), body.lane)
    });
    let out = compose_narrative(state.narrator.as_ref(), &prompt, &facts)
        .await
        .map_err(|e| ApiError(StatusCode::BAD_GATEWAY, format!("{e:#}")))?;
    Ok(Json(out))
}
