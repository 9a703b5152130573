// src/extract/reliability.rs
//! Uptime figures, SLA commitments and status-page links.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::{ExtractInput, FactCandidate, FactValue, LaneExtractor, ReliabilityKind, ReliabilityValue};
use crate::html;
use crate::lane::Lane;

static RE_PCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(9\d(?:\.\d{1,4})?)\s?%").expect("uptime pct regex"));

static RE_UPTIME_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(uptime|availability|available|sla)\b").expect("uptime cue regex"));

static RE_SLA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sla|service level agreement|service-level agreement)\b").expect("sla regex")
});

static RE_GUARANTEE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(sla|guarantee[ds]?|committed|commitment)\b").expect("guarantee regex"));

fn is_status_url(u: &Url) -> bool {
    let host_status = u.host_str().is_some_and(|h| h.starts_with("status."));
    let path = u.path().trim_end_matches('/');
    host_status || path == "/status" || path.ends_with("/status")
}

fn uptime_facts(text: &str) -> Vec<FactCandidate> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        let sla = RE_SLA.is_match(line);
        let pct = if RE_UPTIME_CUE.is_match(line) {
            RE_PCT
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok().map(|v| (m.as_str().to_string(), v)))
                .filter(|(_, v)| *v <= 100.0)
        } else {
            None
        };

        if let Some((key, value)) = &pct {
            let conf = if RE_GUARANTEE.is_match(line) { 0.9 } else { 0.85 };
            out.push(FactCandidate::new(
                "uptime",
                key.clone(),
                FactValue::Reliability(ReliabilityValue {
                    kind: ReliabilityKind::Uptime,
                    uptime_pct: Some(*value),
                    url: None,
                }),
                conf,
            ));
        }
        if sla {
            out.push(FactCandidate::new(
                "sla",
                "offered",
                FactValue::Reliability(ReliabilityValue {
                    kind: ReliabilityKind::Sla,
                    uptime_pct: pct.as_ref().map(|(_, v)| *v),
                    url: None,
                }),
                if pct.is_some() { 0.85 } else { 0.75 },
            ));
        }
    }
    out
}

fn status_page(page_url: &str, main_html: &str) -> Option<FactCandidate> {
    let base = Url::parse(page_url).ok()?;
    let found = if base.host_str().is_some_and(|h| h.starts_with("status.")) {
        Some(base.clone())
    } else {
        html::hrefs(main_html)
            .iter()
            .filter_map(|h| base.join(h).ok())
            .find(|u| matches!(u.scheme(), "http" | "https") && is_status_url(u))
    }?;
    let mut url = found;
    url.set_fragment(None);
    Some(FactCandidate::new(
        "status_page",
        "url",
        FactValue::Reliability(ReliabilityValue {
            kind: ReliabilityKind::StatusPage,
            uptime_pct: None,
            url: Some(url.to_string()),
        }),
        0.8,
    ))
}

pub struct ReliabilityExtractor;

impl LaneExtractor for ReliabilityExtractor {
    fn lane(&self) -> Lane {
        Lane::Reliability
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        let mut out = uptime_facts(&input.page.text);
        out.extend(status_page(&input.page.url, &input.page.main_html));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{page, run};
    use super::*;

    #[test]
    fn uptime_and_sla() {
        let out = uptime_facts("We guarantee 99.95% uptime in our SLA\nOver 99% of customers love us");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].subject, "uptime");
        assert_eq!(out[0].key, "99.95");
        assert!((out[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(out[1].subject, "sla");
        match &out[1].value {
            FactValue::Reliability(r) => assert_eq!(r.uptime_pct, Some(99.95)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn status_link_resolved_against_page() {
        let p = page(
            "https://vendor.test/reliability",
            r#"<p>Historic availability: 99.9% uptime.</p><a href="https://status.vendor.test/#incidents">Status</a>"#,
            "Historic availability: 99.9% uptime.",
        );
        let ex = run(Lane::Reliability, &p);
        let subjects: Vec<&str> = ex.candidates.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["uptime", "status_page"]);
        match &ex.candidates[1].value {
            FactValue::Reliability(r) => assert_eq!(r.url.as_deref(), Some("https://status.vendor.test/")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn relative_status_path() {
        let c = status_page("https://vendor.test/trust", r#"<a href="/status">System status</a>"#).unwrap();
        match c.value {
            FactValue::Reliability(r) => assert_eq!(r.url.as_deref(), Some("https://vendor.test/status")),
            _ => unreachable!(),
        }
        assert!(status_page("https://vendor.test/trust", r#"<a href="/blog">Blog</a>"#).is_none());
    }
}
