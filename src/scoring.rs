// src/scoring.rs
//! Three-tier confidence model, all pure functions in [0,1]:
//! - `source_score`: how far a single page can be trusted
//! - `fact_score`:   how far an extracted value can be trusted, across sources
//! - `answer_score`: how far a synthesized comparison cell / bullet can be trusted

use serde::{Deserialize, Serialize};

const W_FIRST_PARTY: f32 = 0.45;
const W_RECENCY: f32 = 0.20;
const W_PAGE_TYPE: f32 = 0.15;
const W_STRUCTURED: f32 = 0.10;
const W_REPUTATION: f32 = 0.10;

/// Publisher reputation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reputation {
    Official,
    Established,
    Community,
    Unknown,
}

impl Reputation {
    pub fn factor(&self) -> f32 {
        match self {
            Reputation::Official => 1.0,
            Reputation::Established => 0.7,
            Reputation::Community => 0.4,
            Reputation::Unknown => 0.2,
        }
    }
}

/// Inputs for `source_score`. `page_type_weight` is the lane weight from the registry.
#[derive(Debug, Clone, Copy)]
pub struct SourceSignals {
    pub first_party: bool,
    pub recency_days: i64,
    pub page_type_weight: f32,
    pub structured: bool,
    pub reputation: Reputation,
}

/// Clamp to [0.0, 1.0]; NaN collapses to 0.0.
pub fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// ≤90 days: 1.0, ≤365 days: 0.6, older: 0.3. Future dates count as fresh.
pub fn recency_factor(recency_days: i64) -> f32 {
    if recency_days <= 90 {
        1.0
    } else if recency_days <= 365 {
        0.6
    } else {
        0.3
    }
}

pub fn source_score(s: &SourceSignals) -> f32 {
    let first_party = if s.first_party { W_FIRST_PARTY } else { 0.0 };
    let recency = W_RECENCY * recency_factor(s.recency_days);
    let page_type = W_PAGE_TYPE * clamp01(s.page_type_weight);
    let structured = if s.structured { W_STRUCTURED } else { 0.0 };
    let reputation = W_REPUTATION * s.reputation.factor();
    clamp01(first_party + recency + page_type + structured + reputation)
}

/// `0.7 * max + 0.3 * mean(top 2)` plus a corroboration bonus of
/// `min(0.1, 0.03 * (distinct_domains - 1))`. Empty input scores 0.
pub fn fact_score(source_scores: &[f32], distinct_domains: usize) -> f32 {
    let mut sorted: Vec<f32> = source_scores.iter().map(|s| clamp01(*s)).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| b.total_cmp(a));

    let max = sorted[0];
    let top = &sorted[..sorted.len().min(2)];
    let mean_top2 = top.iter().sum::<f32>() / top.len() as f32;

    let bonus = (0.03 * distinct_domains.saturating_sub(1) as f32).min(0.1);
    clamp01(0.7 * max + 0.3 * mean_top2 + bonus)
}

pub fn answer_score(reliability: f32, completeness: f32, specificity: f32) -> f32 {
    clamp01(0.6 * clamp01(reliability) + 0.2 * clamp01(completeness) + 0.2 * clamp01(specificity))
}

/// Round to 4 decimals so persisted confidences compare stably across runs.
pub fn round4(x: f32) -> f32 {
    (x * 10_000.0).round() / 10_000.0
}
