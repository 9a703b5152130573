// src/extract/features.rs
//! Feature matrix extraction: canonical feature slugs, support level and the
//! plan tiers that carry them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{clip, plan_tiers, Block, BlockKind, ExtractInput, FactCandidate, FactValue, FeatureValue, LaneExtractor};
use crate::lane::Lane;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    Native,
    ViaIntegration,
    Limited,
    PaidAddon,
    No,
}

impl SupportLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportLevel::Native => "native",
            SupportLevel::ViaIntegration => "via_integration",
            SupportLevel::Limited => "limited",
            SupportLevel::PaidAddon => "paid_addon",
            SupportLevel::No => "no",
        }
    }
}

/// slug -> free-text aliases.
const VOCABULARY: &[(&str, &[&str])] = &[
    ("sso", &["sso", "single sign-on", "single sign on", "saml"]),
    ("scim", &["scim", "user provisioning", "automated provisioning"]),
    ("mfa", &["mfa", "2fa", "two-factor", "two factor", "multi-factor", "multi factor"]),
    ("audit_logs", &["audit log", "audit logs", "audit trail"]),
    ("data_residency", &["data residency", "data locality"]),
    ("hipaa", &["hipaa"]),
    ("soc2", &["soc 2", "soc2", "soc ii"]),
    ("rbac", &["rbac", "role-based access", "role based access", "custom roles"]),
    ("api", &["api", "rest api", "graphql api", "api access"]),
    ("webhooks", &["webhook", "webhooks"]),
    ("encryption", &["encryption", "encrypted at rest", "encryption at rest"]),
    ("gdpr", &["gdpr"]),
    ("iso27001", &["iso 27001", "iso27001"]),
    ("ip_allowlisting", &["ip allowlisting", "ip allowlist", "ip whitelisting", "ip restrictions"]),
    ("custom_domain", &["custom domain", "custom domains"]),
    ("analytics", &["analytics", "reporting"]),
];

const FUZZY_MIN: f64 = 0.93;
const FUZZY_MAX_WORDS: usize = 4;
const FUZZY_PENALTY: f32 = 0.05;

const CONF_TABLE: f32 = 0.9;
const CONF_LIST: f32 = 0.8;
const CONF_HEADING: f32 = 0.7;

static ALIASES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    VOCABULARY
        .iter()
        .flat_map(|(slug, aliases)| {
            aliases.iter().map(move |a| {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(a))).expect("alias regex");
                (*slug, re)
            })
        })
        .collect()
});

static RE_NEGATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(not available|not included|not supported|unavailable|coming soon|[✗✘❌✕])")
        .expect("negative regex")
});
static RE_ADDON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(add-on|\baddon\b|\badd on\b|paid extra|extra cost|additional (?:cost|fee|charge))")
        .expect("addon regex")
});
static RE_VIA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\bvia\b|\bthrough\b|\bintegrations?\b|\bplugins?\b|\bconnectors?\b)").expect("via regex")
});
static RE_LIMITED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(only|limited|partial|beta|preview)\b").expect("limited regex"));

const NEGATIVE_CELLS: &[&str] = &["no", "-", "—", "–", "x", "n/a", "none"];

fn normalize_label(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical slugs named in `label`; the flag marks a fuzzy match.
pub fn canonical_features(label: &str) -> Vec<(&'static str, bool)> {
    let mut out: Vec<(&'static str, bool)> = Vec::new();
    for (slug, re) in ALIASES.iter() {
        if re.is_match(label) && !out.iter().any(|(s, _)| s == slug) {
            out.push((*slug, false));
        }
    }
    if !out.is_empty() {
        return out;
    }

    let norm = normalize_label(label);
    if norm.len() < 5 || norm.split(' ').count() > FUZZY_MAX_WORDS {
        return out;
    }
    let mut best: Option<(&'static str, f64)> = None;
    for (slug, aliases) in VOCABULARY {
        for alias in aliases.iter() {
            let sim = strsim::jaro_winkler(&norm, &normalize_label(alias));
            if sim >= FUZZY_MIN && best.map_or(true, |(_, b)| sim > b) {
                best = Some((*slug, sim));
            }
        }
    }
    if let Some((slug, _)) = best {
        out.push((slug, true));
    }
    out
}

fn is_negative_cell(cell: &str) -> bool {
    let c = cell.trim().to_lowercase();
    NEGATIVE_CELLS.contains(&c.as_str()) || RE_NEGATIVE.is_match(&c)
}

/// Support level from surrounding text cues; negatives win, then add-on,
/// integration, limited; anything else is native.
pub fn support_from(cue: &str) -> SupportLevel {
    if RE_NEGATIVE.is_match(cue) || is_negative_cell(cue) {
        SupportLevel::No
    } else if RE_ADDON.is_match(cue) {
        SupportLevel::PaidAddon
    } else if RE_VIA.is_match(cue) {
        SupportLevel::ViaIntegration
    } else if RE_LIMITED.is_match(cue) {
        SupportLevel::Limited
    } else {
        SupportLevel::Native
    }
}

/// Header row of a plan matrix: every cell after the first names a plan.
fn header_plans(cells: &[&str]) -> Option<Vec<String>> {
    if cells.len() < 2 {
        return None;
    }
    let mut plans = Vec::new();
    for cell in &cells[1..] {
        let tiers = plan_tiers(cell);
        let first = tiers.into_iter().next()?;
        plans.push(first);
    }
    Some(plans)
}

/// Plans and support for one matrix row under a plan header.
fn matrix_support(cells: &[&str], header: &[String]) -> (SupportLevel, Vec<String>) {
    let values = &cells[1..];
    let plans: Vec<String> = header
        .iter()
        .zip(values.iter())
        .filter(|(_, v)| !v.trim().is_empty() && !is_negative_cell(v))
        .map(|(p, _)| p.clone())
        .collect();
    if plans.is_empty() {
        return (SupportLevel::No, plans);
    }
    let positive: Vec<&str> = values.iter().copied().filter(|v| !is_negative_cell(v)).collect();
    let base = support_from(&positive.join(" "));
    if base == SupportLevel::Native && plans.len() < header.len() {
        (SupportLevel::Limited, plans)
    } else {
        (base, plans)
    }
}

pub struct FeaturesExtractor;

impl FeaturesExtractor {
    fn from_blocks(blocks: &[Block]) -> Vec<FactCandidate> {
        let mut out = Vec::new();
        let mut header: Option<Vec<String>> = None;

        for block in blocks {
            if block.kind != BlockKind::TableRow {
                header = None;
            }
            let (label, cue, base_conf) = match block.kind {
                BlockKind::TableRow => {
                    let cells = block.cells();
                    if let Some(h) = header_plans(&cells) {
                        if canonical_features(cells[0]).is_empty() {
                            header = Some(h);
                            continue;
                        }
                    }
                    (cells[0].to_string(), cells[1..].join(" "), CONF_TABLE)
                }
                BlockKind::ListItem => (block.text.clone(), block.text.clone(), CONF_LIST),
                BlockKind::Heading => (block.text.clone(), block.text.clone(), CONF_HEADING),
            };

            for (slug, fuzzy) in canonical_features(&label) {
                let (support, plans) = match (&header, block.kind) {
                    (Some(h), BlockKind::TableRow) if block.cells().len() == h.len() + 1 => {
                        matrix_support(&block.cells(), h)
                    }
                    _ => (support_from(&cue), plan_tiers(&cue)),
                };
                let confidence = if fuzzy { base_conf - FUZZY_PENALTY } else { base_conf };
                out.push(FactCandidate::new(
                    slug,
                    "support",
                    FactValue::Feature(FeatureValue {
                        feature: slug.to_string(),
                        support,
                        plans,
                        evidence: clip(&block.text, 160),
                    }),
                    confidence,
                ));
            }
        }
        out
    }
}

impl LaneExtractor for FeaturesExtractor {
    fn lane(&self) -> Lane {
        Lane::Features
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        Self::from_blocks(&input.blocks())
    }
}
