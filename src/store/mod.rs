// src/store/mod.rs
//! Persistence seam. Every write is an upsert keyed by natural identity, so
//! retries are safe.

pub mod memory;

use async_trait::async_trait;

use crate::lane::Lane;
use crate::model::{Fact, FactUpsert, Source, UnknownReason, UpdateEvent};

pub use memory::MemoryStore;

#[async_trait]
pub trait FactStore: Send + Sync {
    /// Upsert by `(vendor_id, url)`; returns the source id.
    async fn save_source(&self, source: Source) -> anyhow::Result<String>;

    async fn find_source(&self, vendor_id: &str, url: &str) -> anyhow::Result<Option<Source>>;

    /// Sources of a vendor, optionally limited to one lane, ordered by url.
    async fn list_sources(&self, vendor_id: &str, lane: Option<Lane>) -> anyhow::Result<Vec<Source>>;

    async fn find_fact(
        &self,
        vendor_id: &str,
        metric: Lane,
        subject: &str,
        key: &str,
    ) -> anyhow::Result<Option<Fact>>;

    /// Upsert by `(vendor_id, metric, subject, key)`; returns the fact id.
    /// Overwrites value, summary, citations and confidence; `first_seen_at`
    /// is kept, `last_seen_at` advances.
    async fn upsert_fact(&self, fact: FactUpsert) -> anyhow::Result<String>;

    /// Advance `last_seen_at` only. False when the fact does not exist.
    async fn touch_fact(&self, fact_id: &str) -> anyhow::Result<bool>;

    async fn facts_for_vendor(&self, vendor_id: &str, lane: Option<Lane>) -> anyhow::Result<Vec<Fact>>;

    async fn record_update_event(&self, event: UpdateEvent) -> anyhow::Result<()>;

    /// Append order.
    async fn update_events(&self, vendor_id: &str) -> anyhow::Result<Vec<UpdateEvent>>;

    async fn record_unknown_reason(&self, reason: UnknownReason) -> anyhow::Result<()>;

    async fn unknown_reasons(&self, vendor_id: &str) -> anyhow::Result<Vec<UnknownReason>>;

    /// `source_score` of each stored source among `urls`, as `(url, score)`.
    async fn source_scores(&self, vendor_id: &str, urls: &[String]) -> anyhow::Result<Vec<(String, f32)>>;
}
