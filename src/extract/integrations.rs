// src/extract/integrations.rs
//! Integration names from directory-style pages: headings, list items and
//! the first cell of table rows.

use super::{slug, BlockKind, ExtractInput, FactCandidate, FactValue, IntegrationValue, LaneExtractor};
use crate::lane::Lane;

const MAX_WORDS: usize = 5;
const MAX_CHARS: usize = 40;

/// Navigation and section words that look like names but are not.
const GENERIC: &[&str] = &[
    "integrations",
    "integration",
    "all integrations",
    "apps",
    "all apps",
    "marketplace",
    "app marketplace",
    "partners",
    "featured",
    "popular",
    "categories",
    "category",
    "name",
    "app",
    "tool",
    "description",
    "status",
    "learn more",
    "see all",
    "view all",
    "read more",
    "get started",
    "contact us",
    "sign up",
    "log in",
    "login",
    "request an integration",
    "build your own",
    "api",
    "overview",
];

fn is_name(candidate: &str) -> bool {
    let c = candidate.trim();
    if c.is_empty() || c.chars().count() > MAX_CHARS {
        return false;
    }
    if c.split_whitespace().count() > MAX_WORDS {
        return false;
    }
    if !c.chars().any(|ch| ch.is_alphabetic()) {
        return false;
    }
    if c.ends_with(['.', '!', '?', ':', ',']) {
        return false;
    }
    let lower = c.to_lowercase();
    !GENERIC.contains(&lower.as_str())
}

const CONF_TABLE: f32 = 0.85;
const CONF_LIST: f32 = 0.8;
const CONF_HEADING: f32 = 0.75;

pub struct IntegrationsExtractor;

impl LaneExtractor for IntegrationsExtractor {
    fn lane(&self) -> Lane {
        Lane::Integrations
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        let mut out = Vec::new();
        let mut category: Option<String> = None;

        for block in input.blocks() {
            let (name, conf, cat) = match block.kind {
                BlockKind::Heading => {
                    let heading = block.text.trim().to_string();
                    // A heading with list items under it names a category.
                    category = Some(heading.clone());
                    (heading, CONF_HEADING, None)
                }
                BlockKind::ListItem => (block.text.trim().to_string(), CONF_LIST, category.clone()),
                BlockKind::TableRow => {
                    let first = block.cells().first().map(|c| c.to_string()).unwrap_or_default();
                    (first, CONF_TABLE, None)
                }
            };
            if !is_name(&name) {
                continue;
            }
            let key = slug(&name);
            if key.is_empty() {
                continue;
            }
            out.push(FactCandidate::new(
                "integration",
                key,
                FactValue::Integration(IntegrationValue { name, category: cat }),
                conf,
            ));
        }

        // Headings that introduced list items were categories, not integrations.
        let categories: Vec<String> = out
            .iter()
            .filter_map(|c| match &c.value {
                FactValue::Integration(v) => v.category.clone(),
                _ => None,
            })
            .collect();
        out.retain(|c| match &c.value {
            FactValue::Integration(v) => !(v.category.is_none() && categories.contains(&v.name)),
            _ => true,
        });
        out
    }
}
