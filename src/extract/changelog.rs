// src/extract/changelog.rs
//! Release entries from changelog and release-notes pages.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{clip, slug, BlockKind, ChangelogValue, ExtractInput, FactCandidate, FactValue, LaneExtractor};
use crate::lane::Lane;

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));

static RE_LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
    .expect("long date regex")
});

const GENERIC_TITLES: &[&str] = &[
    "changelog",
    "change log",
    "release notes",
    "what's new",
    "whats new",
    "product updates",
    "updates",
    "subscribe",
    "older releases",
];

const TITLE_CHARS: usize = 60;

fn month_number(name: &str) -> Option<u32> {
    let m = name.get(..3)?.to_ascii_lowercase();
    let n = match m.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// First date in `text` as `YYYY-MM-DD`.
pub fn parse_date(text: &str) -> Option<String> {
    let date = if let Some(c) = RE_ISO_DATE.captures(text) {
        let y = c[1].parse().ok()?;
        let m = c[2].parse().ok()?;
        let d = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    } else if let Some(c) = RE_LONG_DATE.captures(text) {
        let m = month_number(&c[1])?;
        let d = c[2].parse().ok()?;
        let y = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(y, m, d)
    } else {
        None
    }?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn is_generic(title: &str) -> bool {
    let t = title.trim().trim_end_matches(':').to_lowercase();
    GENERIC_TITLES.contains(&t.as_str())
}

pub struct ChangelogExtractor;

impl LaneExtractor for ChangelogExtractor {
    fn lane(&self) -> Lane {
        Lane::Changelog
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        let blocks = input.blocks();
        let headings: Vec<&str> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Heading && b.level >= 2 && !is_generic(&b.text))
            .map(|b| b.text.as_str())
            .collect();
        let (entries, conf) = if headings.is_empty() {
            let items: Vec<&str> = blocks
                .iter()
                .filter(|b| b.kind == BlockKind::ListItem && !is_generic(&b.text))
                .map(|b| b.text.as_str())
                .collect();
            (items, 0.7)
        } else {
            (headings, 0.8)
        };

        entries
            .into_iter()
            .take(input.max_entries)
            .filter_map(|raw| {
                let title = clip(raw.trim(), TITLE_CHARS);
                let subject = slug(&title);
                if subject.is_empty() {
                    return None;
                }
                Some(FactCandidate::new(
                    subject,
                    "entry",
                    FactValue::Changelog(ChangelogValue {
                        date: parse_date(raw),
                        title,
                    }),
                    conf,
                ))
            })
            .collect()
    }
}
