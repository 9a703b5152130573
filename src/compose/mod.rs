// src/compose/mod.rs
//! Turning stored facts into reader-facing claims, each with an answer score.

pub mod narrative;
pub mod table;

pub use narrative::{
    compose_narrative, parse_bullets, score_bullets, Bullet, DisabledNarrator, Narrative, NarrativeClient,
    OpenAiNarrator, ScoredBullet,
};
pub use table::{comparison_table, Cell, ComparisonTable, Row, VendorColumn};

use crate::extract::FactValue;
use crate::model::Fact;

/// Typed view of a stored fact; `None` when the payload predates the current shape.
pub(crate) fn typed_value(fact: &Fact) -> Option<FactValue> {
    serde_json::from_value(fact.value_json.clone()).ok()
}

/// Specificity of a stored fact, with a neutral fallback.
pub(crate) fn specificity(fact: &Fact) -> f32 {
    typed_value(fact).map(|v| v.specificity()).unwrap_or(0.5)
}
