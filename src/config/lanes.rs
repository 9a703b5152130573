// src/config/lanes.rs
//! Metric registry: per-lane URL patterns, content keywords, page-type weight,
//! headless render hints and sufficiency thresholds.
//!
//! The registry is plain configuration. `LaneRegistry::builtin()` carries the
//! shipped table; a TOML file can override individual lanes:
//!
//! ```toml
//! [lanes.pricing]
//! url_patterns = ["(?i)/pricing"]
//! content_signals = ["pricing", "$"]
//! weight = 1.0
//! render_hints = ["$"]
//! min_items = 1
//! ```
//!
//! Both the classifier and the crawler consume the compiled form
//! (`CompiledRegistry`), never the raw strings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::lane::Lane;

pub const DEFAULT_LANES_CONFIG_PATH: &str = "config/lanes.toml";
pub const ENV_LANES_CONFIG_PATH: &str = "LANES_CONFIG_PATH";

fn default_min_items() -> usize {
    1
}

/// Raw (uncompiled) definition of one lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSpec {
    pub url_patterns: Vec<String>,
    pub content_signals: Vec<String>,
    /// Page-type weight in [0,1]; feeds the source score.
    pub weight: f32,
    /// Tokens that make a thin, URL-matched page worth a headless render.
    #[serde(default)]
    pub render_hints: Vec<String>,
    /// Minimum extracted items before the lane counts as sufficient.
    #[serde(default = "default_min_items")]
    pub min_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct LanesFile {
    #[serde(default)]
    lanes: HashMap<String, LaneSpec>,
}

/// The full table, one spec per lane.
#[derive(Debug, Clone)]
pub struct LaneRegistry {
    specs: Vec<(Lane, LaneSpec)>,
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl LaneRegistry {
    /// Built-in table used when no override file is present.
    pub fn builtin() -> Self {
        let specs = vec![
            (
                Lane::Pricing,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(pricing|plans?|prices?|buy|purchase|billing)(?:[/?#.-]|$)",
                    ]),
                    content_signals: strs(&[
                        "pricing",
                        "price",
                        "per month",
                        "/mo",
                        "per user",
                        "per seat",
                        "billed annually",
                        "billed monthly",
                        "free trial",
                        "plan",
                        "plans",
                        "$",
                        "€",
                        "£",
                        "contact sales",
                        "annual",
                        "monthly",
                    ]),
                    weight: 1.0,
                    render_hints: strs(&["$", "€", "£", "per month", "/mo", "plan", "pricing"]),
                    min_items: 1,
                },
            ),
            (
                Lane::Features,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(features?|products?|platform|capabilities|compare|comparison|solutions?)(?:[/?#.-]|$)",
                    ]),
                    content_signals: strs(&[
                        "features",
                        "feature",
                        "capabilities",
                        "sso",
                        "single sign-on",
                        "audit log",
                        "roles",
                        "permissions",
                        "workflow",
                        "automation",
                        "dashboard",
                        "analytics",
                        "reporting",
                        "api",
                        "collaboration",
                    ]),
                    weight: 0.9,
                    render_hints: strs(&["feature", "✓", "✔", "included"]),
                    min_items: 10,
                },
            ),
            (
                Lane::Integrations,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(integrations?|apps|app-directory|marketplace|partners|connectors?|ecosystem)(?:[/?#.-]|$)",
                        r"(?i)^https?://partners\.",
                    ]),
                    content_signals: strs(&[
                        "integration",
                        "integrations",
                        "integrates",
                        "connect",
                        "connector",
                        "marketplace",
                        "works with",
                        "slack",
                        "salesforce",
                        "zapier",
                        "hubspot",
                        "webhook",
                        "webhooks",
                        "plugin",
                        "app directory",
                    ]),
                    weight: 0.8,
                    render_hints: strs(&["integration", "connect", "app"]),
                    min_items: 5,
                },
            ),
            (
                Lane::Security,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(security|trust|trust-center|compliance|privacy|gdpr|soc-?2)(?:[/?#.-]|$)",
                        r"(?i)^https?://(trust|security)\.",
                    ]),
                    content_signals: strs(&[
                        "security",
                        "soc 2",
                        "soc2",
                        "iso 27001",
                        "gdpr",
                        "hipaa",
                        "encryption",
                        "compliance",
                        "penetration test",
                        "data protection",
                        "trust center",
                        "audit",
                        "vulnerability",
                        "subprocessors",
                    ]),
                    weight: 1.0,
                    render_hints: strs(&["soc", "iso", "gdpr", "security"]),
                    min_items: 1,
                },
            ),
            (
                Lane::Reliability,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(status|uptime|sla|reliability|incidents?|availability)(?:[/?#.-]|$)",
                        r"(?i)^https?://status\.",
                    ]),
                    content_signals: strs(&[
                        "uptime",
                        "sla",
                        "service level",
                        "incident",
                        "incidents",
                        "outage",
                        "availability",
                        "operational",
                        "degraded",
                        "status page",
                        "redundancy",
                        "disaster recovery",
                        "99.9%",
                        "maintenance",
                    ]),
                    weight: 0.8,
                    render_hints: strs(&["uptime", "status", "operational"]),
                    min_items: 1,
                },
            ),
            (
                Lane::Changelog,
                LaneSpec {
                    url_patterns: strs(&[
                        r"(?i)/(changelog|change-log|release-notes|releases|whats-new|what-s-new|product-updates|updates)(?:[/?#.-]|$)",
                    ]),
                    content_signals: strs(&[
                        "changelog",
                        "release notes",
                        "released",
                        "release",
                        "version",
                        "new",
                        "improved",
                        "improvement",
                        "fixed",
                        "bug fixes",
                        "update",
                        "shipped",
                        "deprecated",
                    ]),
                    weight: 0.7,
                    render_hints: strs(&["release", "version", "changelog"]),
                    min_items: 3,
                },
            ),
        ];
        Self { specs }
    }

    /// Load overrides from `$LANES_CONFIG_PATH` (or `config/lanes.toml`).
    /// A missing file means "use the built-in table".
    pub fn from_toml() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_LANES_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LANES_CONFIG_PATH));

        if !path.exists() {
            return Ok(Self::builtin());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read lanes config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Built-in table with the lanes named in `toml_str` replaced.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let file: LanesFile = toml::from_str(toml_str)?;
        let mut reg = Self::builtin();
        for (name, spec) in file.lanes {
            let lane = Lane::parse(&name)?;
            reg.set(lane, spec);
        }
        Ok(reg)
    }

    pub fn set(&mut self, lane: Lane, spec: LaneSpec) {
        if let Some(slot) = self.specs.iter_mut().find(|(l, _)| *l == lane) {
            slot.1 = spec;
        } else {
            self.specs.push((lane, spec));
        }
    }

    pub fn spec(&self, lane: Lane) -> Option<&LaneSpec> {
        self.specs.iter().find(|(l, _)| *l == lane).map(|(_, s)| s)
    }

    /// Compile every regex; a bad pattern is a configuration error.
    pub fn compile(&self) -> anyhow::Result<CompiledRegistry> {
        let mut lanes = Vec::with_capacity(self.specs.len());
        for lane in Lane::ALL {
            let Some(spec) = self.spec(lane) else {
                anyhow::bail!("lane `{}` missing from registry", lane);
            };

            let url_res = spec
                .url_patterns
                .iter()
                .map(|p| {
                    let re = Regex::new(p).map_err(|e| {
                        anyhow::anyhow!("lane `{}` url pattern `{}` regex error: {}", lane, p, e)
                    })?;
                    Ok((p.clone(), re))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let signals = spec
                .content_signals
                .iter()
                .map(|kw| {
                    let re = keyword_regex(kw).map_err(|e| {
                        anyhow::anyhow!("lane `{}` keyword `{}` regex error: {}", lane, kw, e)
                    })?;
                    Ok((kw.to_ascii_lowercase(), re))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            lanes.push(CompiledLane {
                lane,
                url_res,
                signals,
                weight: spec.weight.clamp(0.0, 1.0),
                render_hints: spec.render_hints.iter().map(|h| h.to_lowercase()).collect(),
                min_items: spec.min_items,
            });
        }
        Ok(CompiledRegistry { lanes })
    }
}

impl Default for LaneRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Word-bounded for plain words/phrases, substring for anything with symbols.
fn keyword_regex(kw: &str) -> Result<Regex, regex::Error> {
    let plain = kw
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-');
    let escaped = regex::escape(kw.trim());
    if plain {
        Regex::new(&format!(r"(?i)\b{escaped}\b"))
    } else {
        Regex::new(&format!(r"(?i){escaped}"))
    }
}

/// One lane with its regexes compiled.
#[derive(Debug)]
pub struct CompiledLane {
    pub lane: Lane,
    url_res: Vec<(String, Regex)>,
    signals: Vec<(String, Regex)>,
    pub weight: f32,
    render_hints: Vec<String>,
    pub min_items: usize,
}

impl CompiledLane {
    /// Source patterns that match `url`.
    pub fn url_hits(&self, url: &str) -> Vec<String> {
        self.url_res
            .iter()
            .filter(|(_, re)| re.is_match(url))
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn url_matches(&self, url: &str) -> bool {
        self.url_res.iter().any(|(_, re)| re.is_match(url))
    }

    /// Distinct keywords found in `text`.
    pub fn text_hits(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<String> = Vec::new();
        for (kw, re) in &self.signals {
            if re.is_match(text) && !hits.contains(kw) {
                hits.push(kw.clone());
            }
        }
        hits
    }

    /// True if `text` carries any of this lane's render hints.
    pub fn has_render_hint(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.render_hints.iter().any(|h| lower.contains(h.as_str()))
    }
}

/// Immutable, compiled registry shared by classifier and crawler.
#[derive(Debug)]
pub struct CompiledRegistry {
    lanes: Vec<CompiledLane>,
}

impl CompiledRegistry {
    /// Compile the built-in table. The built-in patterns are known-good.
    pub fn builtin() -> Self {
        LaneRegistry::builtin()
            .compile()
            .expect("built-in lane registry must compile")
    }

    pub fn lane(&self, lane: Lane) -> &CompiledLane {
        // compile() guarantees one entry per Lane::ALL, in order.
        &self.lanes[Lane::ALL.iter().position(|l| *l == lane).unwrap_or(0)]
    }

    pub fn lanes(&self) -> impl Iterator<Item = &CompiledLane> {
        self.lanes.iter()
    }

    pub fn weight(&self, lane: Lane) -> f32 {
        self.lane(lane).weight
    }

    pub fn min_items(&self, lane: Lane) -> usize {
        self.lane(lane).min_items
    }
}
