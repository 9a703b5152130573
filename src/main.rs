//! Vendor facts service: binary entrypoint.
//! Boots the Axum HTTP server with the crawl pipeline, the fact store
//! snapshot and the Prometheus exporter wired in.

use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vendor_facts::api::{self, AppState};
use vendor_facts::metrics::Metrics;

/// Compact logs by default, JSON lines when `FACTS_LOG_JSON=1`.
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vendor_facts=info,warn"));

    let json = std::env::var("FACTS_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already own the global subscriber; that is fine.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut state = AppState::from_env().await?;

    match Metrics::init() {
        Ok(m) => state = state.with_metrics(m),
        Err(e) => warn!(error = %e, "metrics exporter disabled"),
    }

    info!("vendor-facts ready");
    Ok(api::router(state).into())
}
