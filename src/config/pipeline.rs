// src/config/pipeline.rs
//! Pipeline tunables. `Default` is deterministic (used by tests and the
//! library); `from_env()` layers `.env` + environment overrides on top.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scoring::Reputation;

pub const ENV_FETCH_TIMEOUT_SECS: &str = "FACTS_FETCH_TIMEOUT_SECS";
pub const ENV_FETCH_RETRIES: &str = "FACTS_FETCH_RETRIES";
pub const ENV_PUBLISH_THRESHOLD: &str = "FACTS_PUBLISH_THRESHOLD";
pub const ENV_HEADLESS_ENABLED: &str = "FACTS_HEADLESS_ENABLED";
pub const ENV_RUN_COOLDOWN_SECS: &str = "FACTS_RUN_COOLDOWN_SECS";
pub const ENV_CRAWL_DEADLINE_SECS: &str = "FACTS_CRAWL_DEADLINE_SECS";
pub const ENV_BROWSERLESS_URL: &str = "BROWSERLESS_URL";
pub const ENV_BROWSERLESS_TOKEN: &str = "BROWSERLESS_TOKEN";

/// Cooldown applied when the environment does not say otherwise.
pub const DEFAULT_ENV_COOLDOWN_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Minimum source score and fact confidence for persistence.
    pub publish_threshold: f32,
    /// Below this winning score a page is "unknown".
    pub classify_threshold: f32,
    /// Lane score that admits a URL-matched page whose text is thin.
    pub url_strong_score: f32,
    pub crawl_deadline_secs: u64,
    pub headless_enabled: bool,
    pub render_timeout_ms: u64,
    pub run_cooldown_secs: u64,
    pub max_changelog_entries: usize,
    pub first_party_reputation: Reputation,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 12,
            fetch_retries: 2,
            retry_backoff_ms: 400,
            max_body_bytes: 2 * 1024 * 1024,
            user_agent: "vendor-facts/0.1 (+competitive-intel crawler)".to_string(),
            publish_threshold: 0.70,
            classify_threshold: 0.70,
            url_strong_score: 0.65,
            crawl_deadline_secs: 180,
            headless_enabled: false,
            render_timeout_ms: 20_000,
            run_cooldown_secs: 0,
            max_changelog_entries: 20,
            first_party_reputation: Reputation::Official,
            browserless_url: None,
            browserless_token: None,
        }
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_unit_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

fn parse_u64_env(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_bool_env(raw: Option<String>) -> Option<bool> {
    raw.map(|s| s.trim().to_ascii_lowercase())
        .and_then(|s| match s.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl PipelineConfig {
    /// Defaults + `.env` + environment overrides. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env` but reads keys through `get` (testable without env mutation).
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self {
            run_cooldown_secs: DEFAULT_ENV_COOLDOWN_SECS,
            ..Self::default()
        };

        if let Some(v) = parse_u64_env(get(ENV_FETCH_TIMEOUT_SECS)).filter(|v| *v > 0) {
            cfg.fetch_timeout_secs = v;
        }
        if let Some(v) = parse_u64_env(get(ENV_FETCH_RETRIES)) {
            cfg.fetch_retries = v.min(10) as u32;
        }
        if let Some(v) = parse_unit_env(get(ENV_PUBLISH_THRESHOLD)) {
            cfg.publish_threshold = v;
        }
        if let Some(v) = parse_bool_env(get(ENV_HEADLESS_ENABLED)) {
            cfg.headless_enabled = v;
        }
        if let Some(v) = parse_u64_env(get(ENV_RUN_COOLDOWN_SECS)) {
            cfg.run_cooldown_secs = v;
        }
        if let Some(v) = parse_u64_env(get(ENV_CRAWL_DEADLINE_SECS)).filter(|v| *v > 0) {
            cfg.crawl_deadline_secs = v;
        }
        cfg.browserless_url = non_empty(get(ENV_BROWSERLESS_URL));
        cfg.browserless_token = non_empty(get(ENV_BROWSERLESS_TOKEN));

        cfg
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn crawl_deadline(&self) -> Duration {
        Duration::from_secs(self.crawl_deadline_secs)
    }

    pub fn run_cooldown(&self) -> Duration {
        Duration::from_secs(self.run_cooldown_secs)
    }
}
