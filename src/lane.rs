// src/lane.rs
//! Lanes (a.k.a. metrics): the fixed categories of competitive fact.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Pricing,
    Features,
    Integrations,
    Security,
    Reliability,
    Changelog,
}

impl Lane {
    /// Registry order; also the classifier's tie-break order.
    pub const ALL: [Lane; 6] = [
        Lane::Pricing,
        Lane::Features,
        Lane::Integrations,
        Lane::Security,
        Lane::Reliability,
        Lane::Changelog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Pricing => "pricing",
            Lane::Features => "features",
            Lane::Integrations => "integrations",
            Lane::Security => "security",
            Lane::Reliability => "reliability",
            Lane::Changelog => "changelog",
        }
    }

    /// Case-insensitive parse of the lowercase wire name.
    pub fn parse(s: &str) -> anyhow::Result<Lane> {
        let wanted = s.trim().to_ascii_lowercase();
        Lane::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown lane `{}`", s.trim()))
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Lane {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lane::parse(s)
    }
}
