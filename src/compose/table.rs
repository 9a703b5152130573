// src/compose/table.rs
//! Side-by-side comparison of one lane across vendors.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{specificity, typed_value};
use crate::lane::Lane;
use crate::model::{Citation, Fact, Vendor};
use crate::scoring;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorColumn {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub fact_id: String,
    pub display: String,
    pub confidence: f32,
    pub answer_score: f32,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub subject: String,
    pub key: String,
    pub label: String,
    /// One slot per vendor column, in column order.
    pub cells: Vec<Option<Cell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub lane: Lane,
    pub vendors: Vec<VendorColumn>,
    pub rows: Vec<Row>,
}

fn row_label(lane: Lane, subject: &str, key: &str) -> String {
    match lane {
        Lane::Integrations | Lane::Security => key.to_string(),
        Lane::Features | Lane::Changelog => subject.to_string(),
        Lane::Pricing => format!("{subject} ({key})"),
        Lane::Reliability => match subject {
            "uptime" => format!("uptime {key}%"),
            other => other.to_string(),
        },
    }
}

/// Rows keyed by `(subject, key)` in sorted order. Facts of other lanes or of
/// vendors not in `vendors` are ignored.
pub fn comparison_table(lane: Lane, vendors: &[Vendor], facts: &[Fact]) -> ComparisonTable {
    let mut rows: BTreeMap<(String, String), Vec<Option<&Fact>>> = BTreeMap::new();
    for fact in facts.iter().filter(|f| f.metric == lane) {
        let Some(col) = vendors.iter().position(|v| v.id == fact.vendor_id) else {
            continue;
        };
        let slots = rows
            .entry((fact.subject.clone(), fact.key.clone()))
            .or_insert_with(|| vec![None; vendors.len()]);
        // keep the most confident fact if a vendor has duplicates
        if slots[col].map_or(true, |f| f.confidence < fact.confidence) {
            slots[col] = Some(fact);
        }
    }

    let rows = rows
        .into_iter()
        .map(|((subject, key), slots)| {
            let filled = slots.iter().filter(|s| s.is_some()).count();
            let completeness = if vendors.is_empty() {
                0.0
            } else {
                filled as f32 / vendors.len() as f32
            };
            let cells = slots
                .into_iter()
                .map(|slot| {
                    slot.map(|f| Cell {
                        fact_id: f.id.clone(),
                        display: typed_value(f)
                            .map(|v| v.display())
                            .unwrap_or_else(|| f.text_summary.clone()),
                        confidence: f.confidence,
                        answer_score: scoring::round4(scoring::answer_score(
                            f.confidence,
                            completeness,
                            specificity(f),
                        )),
                        citations: f.citations.clone(),
                    })
                })
                .collect();
            Row {
                label: row_label(lane, &subject, &key),
                subject,
                key,
                cells,
            }
        })
        .collect();

    ComparisonTable {
        lane,
        vendors: vendors
            .iter()
            .map(|v| VendorColumn {
                id: v.id.clone(),
                name: v.name.clone(),
            })
            .collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FactValue, FeatureValue, SupportLevel};
    use chrono::Utc;

    fn feature_fact(vendor: &str, slug: &str, support: SupportLevel, conf: f32) -> Fact {
        let value = FactValue::Feature(FeatureValue {
            feature: slug.into(),
            support,
            plans: Vec::new(),
            evidence: String::new(),
        });
        Fact {
            id: crate::model::fact_id(vendor, Lane::Features, slug, "support"),
            org_id: "org1".into(),
            vendor_id: vendor.into(),
            metric: Lane::Features,
            subject: slug.into(),
            key: "support".into(),
            value_json: serde_json::to_value(&value).unwrap(),
            text_summary: value.summary(),
            citations: vec![Citation {
                url: format!("https://{vendor}.test/features"),
                title: None,
                source_id: None,
            }],
            confidence: conf,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    fn vendors() -> Vec<Vendor> {
        vec![
            Vendor::new("a", "Acme", "https://a.test").unwrap(),
            Vendor::new("b", "Beta", "https://b.test").unwrap(),
        ]
    }

    #[test]
    fn rows_align_vendor_columns() {
        let facts = vec![
            feature_fact("a", "sso", SupportLevel::Native, 0.9),
            feature_fact("b", "sso", SupportLevel::Limited, 0.8),
            feature_fact("a", "scim", SupportLevel::No, 0.9),
            feature_fact("z", "scim", SupportLevel::Native, 0.9),
        ];
        let t = comparison_table(Lane::Features, &vendors(), &facts);
        assert_eq!(t.vendors.len(), 2);
        let labels: Vec<&str> = t.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["scim", "sso"]);

        let scim = &t.rows[0];
        assert!(scim.cells[1].is_none());
        let a = scim.cells[0].as_ref().unwrap();
        assert_eq!(a.display, "no");
        // 0.6*0.9 + 0.2*0.5 + 0.2*0.7
        assert!((a.answer_score - 0.78).abs() < 1e-4);

        let sso = &t.rows[1];
        let b = sso.cells[1].as_ref().unwrap();
        assert_eq!(b.display, "limited");
        // 0.6*0.8 + 0.2*1.0 + 0.2*0.7
        assert!((b.answer_score - 0.82).abs() < 1e-4);
    }

    #[test]
    fn other_lanes_and_empty_vendor_list() {
        let facts = vec![feature_fact("a", "sso", SupportLevel::Native, 0.9)];
        assert!(comparison_table(Lane::Pricing, &vendors(), &facts).rows.is_empty());
        assert!(comparison_table(Lane::Features, &[], &facts).rows.is_empty());
    }
}
