// src/extract/pricing.rs
//! Price points: a currency amount followed by a billing unit.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{format_amount, last_plan_tier, ExtractInput, FactCandidate, FactValue, LaneExtractor, PriceValue};
use crate::lane::Lane;

static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?P<sym>[$€£])\s?(?P<a1>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)|\b(?P<code1>usd|eur|gbp)\s?(?P<a2>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)|\b(?P<a3>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)\s?(?P<code2>usd|eur|gbp)\b)",
    )
    .expect("amount regex")
});

static RE_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:/\s*|per\s+|a\s+|an\s+|each\s+)(?P<u1>users?|seats?|members?|agents?|mo|months?|yr|years?|annum)\b(?:\s*(?:/\s*|per\s+|a\s+|an\s+)(?P<u2>users?|seats?|members?|mo|months?|yr|years?|annum)\b)?",
    )
    .expect("unit regex")
});

/// Chars of preceding text searched for a plan name.
const PLAN_WINDOW: usize = 120;

const CONF_TABLE: f32 = 0.9;
const CONF_PLAN: f32 = 0.85;
const CONF_BARE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitWord {
    User,
    Month,
    Year,
}

fn unit_word(s: &str) -> Option<UnitWord> {
    let s = s.to_ascii_lowercase();
    match s.as_str() {
        "user" | "users" | "seat" | "seats" | "member" | "members" | "agent" | "agents" => {
            Some(UnitWord::User)
        }
        "mo" | "month" | "months" => Some(UnitWord::Month),
        "yr" | "year" | "years" | "annum" => Some(UnitWord::Year),
        _ => None,
    }
}

fn currency_code(sym_or_code: &str) -> String {
    match sym_or_code {
        "$" => "usd".to_string(),
        "€" => "eur".to_string(),
        "£" => "gbp".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// Billing unit + per-user flag from the two unit words.
fn resolve_unit(u1: UnitWord, u2: Option<UnitWord>) -> (&'static str, bool) {
    match (u1, u2) {
        (UnitWord::User, Some(UnitWord::Month)) | (UnitWord::Month, Some(UnitWord::User)) => ("month", true),
        (UnitWord::User, Some(UnitWord::Year)) | (UnitWord::Year, Some(UnitWord::User)) => ("year", true),
        (UnitWord::User, _) => ("user", true),
        (UnitWord::Month, _) => ("month", false),
        (UnitWord::Year, _) => ("year", false),
    }
}

/// Nearest capitalised plan name before `end` (byte offset in the line),
/// looking back into preceding lines.
fn plan_before(lines: &[&str], idx: usize, end: usize) -> Option<String> {
    let line = lines[idx];
    let mut window = line[..end].to_string();
    let mut back = idx;
    while window.chars().count() < PLAN_WINDOW && back > 0 {
        back -= 1;
        window = format!("{}\n{}", lines[back], window);
    }
    let tail: String = {
        let chars: Vec<char> = window.chars().collect();
        let start = chars.len().saturating_sub(PLAN_WINDOW);
        chars[start..].iter().collect()
    };
    last_plan_tier(&tail)
}

pub fn price_points(text: &str) -> Vec<FactCandidate> {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        for caps in RE_AMOUNT.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            let (cur, amt) = if let (Some(s), Some(a)) = (caps.name("sym"), caps.name("a1")) {
                (currency_code(s.as_str()), a.as_str())
            } else if let (Some(c), Some(a)) = (caps.name("code1"), caps.name("a2")) {
                (currency_code(c.as_str()), a.as_str())
            } else if let (Some(c), Some(a)) = (caps.name("code2"), caps.name("a3")) {
                (currency_code(c.as_str()), a.as_str())
            } else {
                continue;
            };
            let Ok(amount) = amt.replace(',', "").parse::<f64>() else {
                continue;
            };

            let rest = &line[whole.end()..];
            let Some(ucaps) = RE_UNIT.captures(rest) else {
                continue;
            };
            let Some(u1) = ucaps.name("u1").and_then(|m| unit_word(m.as_str())) else {
                continue;
            };
            let u2 = ucaps.name("u2").and_then(|m| unit_word(m.as_str()));
            let (unit, per_user) = resolve_unit(u1, u2);

            let unit_len = ucaps.get(0).map(|m| m.end()).unwrap_or(0);
            let raw = format!("{}{}", whole.as_str(), &rest[..unit_len]).trim().to_string();

            let plan = plan_before(&lines, idx, whole.start());
            let confidence = if line.contains('|') {
                CONF_TABLE
            } else if plan.is_some() {
                CONF_PLAN
            } else {
                CONF_BARE
            };
            let subject = plan
                .as_deref()
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or_else(|| "price_point".to_string());
            let key = format!("{}-{}-per-{}", format_amount(amount), cur, unit);

            out.push(FactCandidate::new(
                subject,
                key,
                FactValue::Pricing(PriceValue {
                    amount,
                    currency: cur,
                    unit: unit.to_string(),
                    per_user,
                    plan,
                    raw,
                }),
                confidence,
            ));
        }
    }
    out
}

pub struct PricingExtractor;

impl LaneExtractor for PricingExtractor {
    fn lane(&self) -> Lane {
        Lane::Pricing
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        price_points(&input.page.text)
    }
}
