// src/model.rs
//! Persisted shapes: vendors, sources, facts, update events, diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lane::Lane;
use crate::scope;

/// Machine-readable `skipped` reasons.
pub mod reason {
    pub const NON_FIRST_PARTY: &str = "non-first-party";
    pub const LOW_SOURCE_SCORE: &str = "low-source-score";
    pub const BELOW_THRESHOLD: &str = "below-threshold";
    pub const NO_HITS: &str = "no-hits";
    pub const NO_FACTS: &str = "no-facts";
    pub const RUN_IN_PROGRESS: &str = "run-in-progress";
    pub const COOLDOWN: &str = "cooldown";
    pub const INSUFFICIENT: &str = "insufficient";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub website: String,
    pub domain: String,
}

impl Vendor {
    /// Derive `domain` from the website host (without `www.`).
    pub fn new(id: &str, name: &str, website: &str) -> anyhow::Result<Self> {
        let host = scope::host_of(website)
            .ok_or_else(|| anyhow::anyhow!("vendor website `{}` has no host", website))?;
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            website: website.trim().to_string(),
            domain: scope::bare_host(&host),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// A fetched, noise-stripped page. Identity: `(vendor_id, url)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub org_id: String,
    pub vendor_id: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub body_hash: String,
    pub first_party: bool,
    pub metric: Option<Lane>,
    pub source_score: f32,
    pub structured: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// An atomic claim. Identity: `(vendor_id, metric, subject, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub org_id: String,
    pub vendor_id: String,
    pub metric: Lane,
    pub subject: String,
    pub key: String,
    pub value_json: Value,
    pub text_summary: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Input to `FactStore::upsert_fact`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactUpsert {
    pub org_id: String,
    pub vendor_id: String,
    pub metric: Lane,
    pub subject: String,
    pub key: String,
    pub value_json: Value,
    pub text_summary: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Added,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn for_lane(lane: Lane) -> Self {
        match lane {
            Lane::Pricing | Lane::Security => Severity::High,
            Lane::Features | Lane::Reliability => Severity::Medium,
            Lane::Integrations | Lane::Changelog => Severity::Low,
        }
    }
}

/// Append-only change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub vendor_id: String,
    pub org_id: String,
    pub metric: Lane,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub subject: String,
    pub key: String,
    pub old: Option<Value>,
    pub new: Value,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownReason {
    pub org_id: String,
    pub vendor_id: String,
    pub metric: Lane,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

fn sha256_hex(parts: &[&str], take: usize) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let mut hasher = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1fu8]);
        }
        hasher.update(p.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(take * 2);
    for b in digest.iter().take(take) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Full sha256 hex of the normalized page body.
pub fn body_hash(body: &str) -> String {
    sha256_hex(&[body], 32)
}

pub fn source_id(vendor_id: &str, url: &str) -> String {
    format!("src_{}", sha256_hex(&[vendor_id, url], 8))
}

pub fn fact_id(vendor_id: &str, metric: Lane, subject: &str, key: &str) -> String {
    format!("fact_{}", sha256_hex(&[vendor_id, metric.as_str(), subject, key], 8))
}
