// src/classifier.rs
//! Page-type classifier: URL patterns + distinct keyword hits per lane,
//! blended into one explainable score.

use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::config::CompiledRegistry;
use crate::lane::Lane;
use crate::scoring::{clamp01, round4};

const W_URL: f32 = 0.65;
const W_TEXT: f32 = 0.35;
/// Keyword hits needed for a full text signal.
const TEXT_SATURATION: f32 = 5.0;

/// Which signals fired for a lane.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Why {
    pub url_hits: Vec<String>,
    pub text_hits: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneScore {
    pub lane: Lane,
    pub score: f32,
    pub why: Why,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// `None` serializes as `"unknown"`.
    #[serde(serialize_with = "metric_or_unknown")]
    pub metric: Option<Lane>,
    /// Best lane score, reported even when the page stays unknown.
    pub score: f32,
    pub why: Why,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lanes: Vec<LaneScore>,
}

fn metric_or_unknown<S: Serializer>(m: &Option<Lane>, s: S) -> Result<S::Ok, S::Error> {
    match m {
        Some(l) => s.serialize_str(l.as_str()),
        None => s.serialize_str("unknown"),
    }
}

impl Classification {
    pub fn metric_name(&self) -> &'static str {
        self.metric.map(|l| l.as_str()).unwrap_or("unknown")
    }

    /// Score of a specific lane (0 when not evaluated).
    pub fn lane_score(&self, lane: Lane) -> f32 {
        self.lanes
            .iter()
            .find(|s| s.lane == lane)
            .map(|s| s.score)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    registry: Arc<CompiledRegistry>,
    threshold: f32,
}

impl Classifier {
    pub fn new(registry: Arc<CompiledRegistry>, threshold: f32) -> Self {
        Self {
            registry,
            threshold: clamp01(threshold),
        }
    }

    pub fn registry(&self) -> &CompiledRegistry {
        &self.registry
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Score a single lane against `url` + `text`.
    pub fn score_for(&self, lane: Lane, url: &str, text: &str) -> LaneScore {
        let compiled = self.registry.lane(lane);
        let url_hits = compiled.url_hits(url);
        let text_hits = compiled.text_hits(text);

        let url_signal = if url_hits.is_empty() { 0.0 } else { 1.0 };
        let text_signal = (text_hits.len() as f32 / TEXT_SATURATION).min(1.0);
        let score = round4(clamp01(W_URL * url_signal + W_TEXT * text_signal));

        LaneScore {
            lane,
            score,
            why: Why {
                url_hits,
                text_hits,
            },
        }
    }

    /// Evaluate every lane; highest score wins, ties go to the earlier lane.
    /// Below the threshold the page is unknown.
    pub fn classify(&self, url: &str, text: &str) -> Classification {
        let lanes: Vec<LaneScore> = self
            .registry
            .lanes()
            .map(|l| self.score_for(l.lane, url, text))
            .collect();

        let mut best: Option<&LaneScore> = None;
        for ls in &lanes {
            if best.map_or(true, |b| ls.score > b.score) {
                best = Some(ls);
            }
        }

        let (metric, score, why) = match best {
            Some(b) if b.score >= self.threshold => (Some(b.lane), b.score, b.why.clone()),
            Some(b) => (None, b.score, b.why.clone()),
            None => (None, 0.0, Why::default()),
        };

        tracing::trace!(url, metric = ?metric, score, "classified");
        Classification {
            metric,
            score,
            why,
            lanes,
        }
    }
}
