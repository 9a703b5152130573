// src/extract/mod.rs
//! Lane extractors: pure functions from isolated page content to typed,
//! confidence-scored fact candidates.

pub mod blocks;
pub mod changelog;
pub mod features;
pub mod integrations;
pub mod pricing;
pub mod reliability;
pub mod security;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::lane::Lane;
use crate::model::{reason, Vendor};
use crate::scope;

pub use blocks::{content_blocks, is_structured, Block, BlockKind};
pub use features::SupportLevel;

/// Plan tier names recognised next to prices and feature rows.
pub const PLAN_TIERS: &[&str] = &[
    "Free",
    "Starter",
    "Basic",
    "Pro",
    "Professional",
    "Team",
    "Business",
    "Enterprise",
    "Growth",
    "Premium",
    "Plus",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceValue {
    pub amount: f64,
    pub currency: String,
    pub unit: String,
    pub per_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub feature: String,
    pub support: SupportLevel,
    pub plans: Vec<String>,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationValue {
    pub name: String,
    pub slug: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityKind {
    Uptime,
    Sla,
    StatusPage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityValue {
    pub kind: ReliabilityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogValue {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Lane-specific fact payloads, discriminated by `metric`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric")]
pub enum FactValue {
    #[serde(rename = "pricing")]
    Pricing(PriceValue),
    #[serde(rename = "features")]
    Feature(FeatureValue),
    #[serde(rename = "integrations")]
    Integration(IntegrationValue),
    #[serde(rename = "security")]
    Certification(CertificationValue),
    #[serde(rename = "reliability")]
    Reliability(ReliabilityValue),
    #[serde(rename = "changelog")]
    Changelog(ChangelogValue),
}

fn currency_symbol(code: &str) -> &str {
    match code {
        "usd" => "$",
        "eur" => "€",
        "gbp" => "£",
        other => other,
    }
}

impl FactValue {
    pub fn lane(&self) -> Lane {
        match self {
            FactValue::Pricing(_) => Lane::Pricing,
            FactValue::Feature(_) => Lane::Features,
            FactValue::Integration(_) => Lane::Integrations,
            FactValue::Certification(_) => Lane::Security,
            FactValue::Reliability(_) => Lane::Reliability,
            FactValue::Changelog(_) => Lane::Changelog,
        }
    }

    /// How precise the claim is, in [0,1]; feeds `answer_score`.
    pub fn specificity(&self) -> f32 {
        match self {
            FactValue::Pricing(p) => {
                if p.plan.is_some() {
                    1.0
                } else {
                    0.8
                }
            }
            FactValue::Feature(f) => {
                if f.plans.is_empty() {
                    0.7
                } else {
                    1.0
                }
            }
            FactValue::Integration(i) => {
                if i.category.is_some() {
                    0.8
                } else {
                    0.6
                }
            }
            FactValue::Certification(_) => 0.9,
            FactValue::Reliability(r) => match r.kind {
                ReliabilityKind::Uptime => 1.0,
                ReliabilityKind::Sla => 0.6,
                ReliabilityKind::StatusPage => 0.5,
            },
            FactValue::Changelog(c) => {
                if c.date.is_some() {
                    0.9
                } else {
                    0.6
                }
            }
        }
    }

    /// Short cell text for comparison tables.
    pub fn display(&self) -> String {
        match self {
            FactValue::Pricing(p) => {
                let amount = format_amount(p.amount);
                let per_user = if p.per_user && p.unit != "user" { "/user" } else { "" };
                let base = format!("{}{}{}/{}", currency_symbol(&p.currency), amount, per_user, p.unit);
                match &p.plan {
                    Some(plan) => format!("{base} ({plan})"),
                    None => base,
                }
            }
            FactValue::Feature(f) => {
                if f.plans.is_empty() {
                    f.support.as_str().to_string()
                } else {
                    format!("{} ({})", f.support.as_str(), f.plans.join(", "))
                }
            }
            FactValue::Integration(i) => i.name.clone(),
            FactValue::Certification(c) => c.name.clone(),
            FactValue::Reliability(r) => match (r.kind, r.uptime_pct, &r.url) {
                (ReliabilityKind::Uptime, Some(pct), _) => format!("{pct}% uptime"),
                (ReliabilityKind::StatusPage, _, Some(url)) => url.clone(),
                (ReliabilityKind::Sla, Some(pct), _) => format!("SLA ({pct}%)"),
                (ReliabilityKind::Sla, None, _) => "SLA offered".to_string(),
                _ => "listed".to_string(),
            },
            FactValue::Changelog(c) => match &c.date {
                Some(d) => format!("{d}: {}", c.title),
                None => c.title.clone(),
            },
        }
    }

    /// One-line human summary stored as `text_summary`.
    pub fn summary(&self) -> String {
        match self {
            FactValue::Pricing(_) => format!("Price point {}", self.display()),
            FactValue::Feature(f) => format!("{}: {}", f.feature, self.display()),
            FactValue::Integration(i) => format!("Integrates with {}", i.name),
            FactValue::Certification(c) => format!("Certification: {}", c.name),
            FactValue::Reliability(_) => format!("Reliability: {}", self.display()),
            FactValue::Changelog(_) => format!("Release: {}", self.display()),
        }
    }
}

/// `49.0 -> "49"`, `49.5 -> "49.50"`.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{amount:.2}")
    }
}

/// Lowercase, non-alphanumerics collapsed to `_`.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending = false;
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            if pending && !out.is_empty() {
                out.push('_');
            }
            pending = false;
            out.extend(ch.to_lowercase());
        } else {
            pending = true;
        }
    }
    out
}

/// Clip at a char boundary without splitting words when possible.
pub fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(i) if i > max_chars / 2 => cut[..i].trim_end().to_string(),
        _ => cut,
    }
}

static RE_PLAN_TIER: Lazy<Regex> = Lazy::new(|| {
    let alts = PLAN_TIERS.join("|");
    Regex::new(&format!(r"(?i)\b({alts})\b")).expect("plan tier regex")
});

/// Capitalised plan tier names in `text`, canonical spelling, first-seen order.
pub fn plan_tiers(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in RE_PLAN_TIER.find_iter(text) {
        let word = m.as_str();
        if !word.chars().next().is_some_and(|c| c.is_uppercase()) {
            continue;
        }
        if let Some(canon) = PLAN_TIERS.iter().find(|t| t.eq_ignore_ascii_case(word)) {
            let canon = canon.to_string();
            if !out.contains(&canon) {
                out.push(canon);
            }
        }
    }
    out
}

/// The capitalised plan tier closest to the end of `text`.
pub fn last_plan_tier(text: &str) -> Option<String> {
    RE_PLAN_TIER
        .find_iter(text)
        .filter(|m| m.as_str().chars().next().is_some_and(|c| c.is_uppercase()))
        .last()
        .and_then(|m| PLAN_TIERS.iter().find(|t| t.eq_ignore_ascii_case(m.as_str())))
        .map(|t| t.to_string())
}

/// The page handed to an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInput {
    pub url: String,
    pub title: String,
    pub main_html: String,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExtractInput<'a> {
    pub org_id: &'a str,
    pub vendor: &'a Vendor,
    pub page: &'a PageInput,
    pub max_entries: usize,
}

impl ExtractInput<'_> {
    pub fn blocks(&self) -> Vec<Block> {
        content_blocks(&self.page.main_html, &self.page.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactCandidate {
    pub lane: Lane,
    pub subject: String,
    pub key: String,
    pub value: FactValue,
    /// Extraction confidence before source scoring.
    pub confidence: f32,
}

impl FactCandidate {
    pub fn new(subject: impl Into<String>, key: impl Into<String>, value: FactValue, confidence: f32) -> Self {
        Self {
            lane: value.lane(),
            subject: subject.into(),
            key: key.into(),
            value,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractReport {
    pub parsed: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub candidates: Vec<FactCandidate>,
    pub report: ExtractReport,
}

impl Extraction {
    pub fn rejected(why: &str) -> Self {
        Self {
            candidates: Vec::new(),
            report: ExtractReport {
                parsed: 0,
                skipped: vec![why.to_string()],
            },
        }
    }
}

/// Keep one candidate per `(subject, key)`: the most confident, first on ties.
fn dedupe(cands: Vec<FactCandidate>) -> Vec<FactCandidate> {
    let mut out: Vec<FactCandidate> = Vec::new();
    for c in cands {
        match out.iter_mut().find(|o| o.subject == c.subject && o.key == c.key) {
            Some(existing) if c.confidence > existing.confidence => *existing = c,
            Some(_) => {}
            None => out.push(c),
        }
    }
    out
}

pub trait LaneExtractor: Send + Sync {
    fn lane(&self) -> Lane;

    /// Raw candidates; no first-party or dedup handling.
    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate>;

    fn extract(&self, input: &ExtractInput<'_>) -> Extraction {
        if !scope::is_first_party(&input.page.url, &input.vendor.domain) {
            return Extraction::rejected(reason::NON_FIRST_PARTY);
        }
        let candidates = dedupe(self.candidates(input));
        Extraction {
            report: ExtractReport {
                parsed: candidates.len(),
                skipped: Vec::new(),
            },
            candidates,
        }
    }
}

pub fn extractor_for(lane: Lane) -> Box<dyn LaneExtractor> {
    match lane {
        Lane::Pricing => Box::new(pricing::PricingExtractor),
        Lane::Features => Box::new(features::FeaturesExtractor),
        Lane::Integrations => Box::new(integrations::IntegrationsExtractor),
        Lane::Security => Box::new(security::SecurityExtractor),
        Lane::Reliability => Box::new(reliability::ReliabilityExtractor),
        Lane::Changelog => Box::new(changelog::ChangelogExtractor),
    }
}
