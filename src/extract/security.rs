// src/extract/security.rs
//! Compliance certifications and attestations named on trust/security pages.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{clip, CertificationValue, ExtractInput, FactCandidate, FactValue, LaneExtractor};
use crate::lane::Lane;

struct Certification {
    slug: &'static str,
    name: &'static str,
    re: Regex,
}

static CERTIFICATIONS: Lazy<Vec<Certification>> = Lazy::new(|| {
    let table: &[(&'static str, &'static str, &str)] = &[
        ("soc2", "SOC 2", r"(?i)\bsoc\s?-?\s?2\b(?:\s+type\s+(?:ii|2|i|1)\b)?"),
        ("iso27001", "ISO 27001", r"(?i)\biso(?:/iec)?\s?-?\s?27001\b"),
        ("iso27701", "ISO 27701", r"(?i)\biso(?:/iec)?\s?-?\s?27701\b"),
        ("gdpr", "GDPR", r"\bGDPR\b"),
        ("hipaa", "HIPAA", r"(?i)\bhipaa\b"),
        ("pci_dss", "PCI DSS", r"(?i)\bpci(?:[\s-]?dss)?\b"),
        ("ccpa", "CCPA", r"\bCCPA\b"),
        ("fedramp", "FedRAMP", r"(?i)\bfedramp\b"),
    ];
    table
        .iter()
        .map(|&(slug, name, pat)| Certification {
            slug,
            name,
            re: Regex::new(pat).expect("certification regex"),
        })
        .collect()
});

static RE_STRONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(certified|certification|compliant|attestation|attested|report|audited|audit)\b")
        .expect("strong cue regex")
});

static RE_PENDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(working towards?|in progress|pursuing|planned|roadmap|coming soon)\b")
        .expect("pending cue regex")
});

const EVIDENCE_CHARS: usize = 160;

fn confidence_for(line: &str) -> f32 {
    if RE_PENDING.is_match(line) {
        0.6
    } else if RE_STRONG.is_match(line) {
        0.9
    } else {
        0.85
    }
}

/// One candidate per certification per line it appears on.
pub fn certifications(text: &str) -> Vec<FactCandidate> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        for cert in CERTIFICATIONS.iter() {
            if !cert.re.is_match(line) {
                continue;
            }
            out.push(FactCandidate::new(
                "certification",
                cert.slug,
                FactValue::Certification(CertificationValue {
                    name: cert.name.to_string(),
                    slug: cert.slug.to_string(),
                    evidence: clip(line, EVIDENCE_CHARS),
                }),
                confidence_for(line),
            ));
        }
    }
    out
}

pub struct SecurityExtractor;

impl LaneExtractor for SecurityExtractor {
    fn lane(&self) -> Lane {
        Lane::Security
    }

    fn candidates(&self, input: &ExtractInput<'_>) -> Vec<FactCandidate> {
        certifications(&input.page.text)
    }
}
