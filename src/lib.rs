// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod lane;
pub mod metrics;
pub mod model;

// Page handling: fetch, render, isolate, classify, crawl
pub mod classifier;
pub mod crawler;
pub mod fetch;
pub mod html;
pub mod readability;
pub mod render;
pub mod scope;

// Fact production and storage
pub mod extract;
pub mod pipeline;
pub mod scoring;
pub mod store;

// Reader-facing output
pub mod compose;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::lane::Lane;
pub use crate::model::{Fact, UpdateEvent, Vendor};
pub use crate::pipeline::{LaneReport, Pipeline, RunState};
pub use crate::store::{FactStore, MemoryStore};
