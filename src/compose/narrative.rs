// src/compose/narrative.rs
//! Battlecard bullets from an external text-generation service.
//!
//! The model receives a prompt plus the candidate facts and must answer with
//! `{"bullets":[{"text": "...", "facts": ["fact_..."]}]}`. Every bullet is
//! re-scored locally from the facts it cites; bullets citing facts we never
//! gave it are dropped.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::specificity;
use crate::model::Fact;
use crate::scoring;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub text: String,
    #[serde(default)]
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredBullet {
    pub text: String,
    pub facts: Vec<String>,
    pub answer_score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Narrative {
    pub bullets: Vec<ScoredBullet>,
    pub dropped: usize,
    pub provider: &'static str,
}

#[async_trait]
pub trait NarrativeClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw model output, `None` when the provider is off or declined.
    async fn complete(&self, prompt: &str, facts: &[Fact]) -> anyhow::Result<Option<String>>;
}

/// Always declines; used when no provider is configured.
pub struct DisabledNarrator;

#[async_trait]
impl NarrativeClient for DisabledNarrator {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _facts: &[Fact]) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

const SYSTEM_PROMPT: &str = "You write sales battlecard bullets from vendor facts. \
Use only the facts given. Answer with JSON only, shaped as \
{\"bullets\":[{\"text\":\"...\",\"facts\":[\"<fact id>\"]}]}. \
Every bullet must cite at least one fact id from the list.";

fn fact_lines(facts: &[Fact]) -> String {
    let mut out = String::new();
    for f in facts {
        out.push_str(&format!(
            "[{}] vendor={} {} {}/{}: {}\n",
            f.id, f.vendor_id, f.metric, f.subject, f.key, f.text_summary
        ));
    }
    out
}

/// OpenAI Chat Completions provider. Requires an API key.
pub struct OpenAiNarrator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiNarrator {
    pub fn new(api_key: &str, model: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vendor-facts/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build narrative http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }

    /// `OPENAI_API_KEY` (required) and `FACTS_NARRATIVE_MODEL` (optional).
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if key.trim().is_empty() {
            return Ok(None);
        }
        let model = std::env::var("FACTS_NARRATIVE_MODEL").ok();
        Self::new(key.trim(), model.as_deref()).map(Some)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl NarrativeClient for OpenAiNarrator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str, facts: &[Fact]) -> anyhow::Result<Option<String>> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let user = format!("{prompt}\n\nFacts:\n{}", fact_lines(facts));
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("narrative request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("narrative provider returned {status}"));
        }
        let body: Resp = resp.json().await.context("narrative response body")?;
        Ok(body.choices.into_iter().next().map(|c| c.message.content))
    }
}

/// Parse model output, tolerating a fenced code block around the JSON.
pub fn parse_bullets(raw: &str) -> anyhow::Result<Vec<Bullet>> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(default)]
        bullets: Vec<Bullet>,
    }
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    let env: Envelope = serde_json::from_str(body).with_context(|| format!("parse bullets JSON: {body}"))?;
    Ok(env.bullets)
}

/// Answer score per bullet: reliability = mean confidence of the cited facts,
/// completeness = share of the vendors in `facts` the bullet covers,
/// specificity = mean fact specificity.
pub fn score_bullets(bullets: Vec<Bullet>, facts: &[Fact]) -> (Vec<ScoredBullet>, usize) {
    let all_vendors: HashSet<&str> = facts.iter().map(|f| f.vendor_id.as_str()).collect();
    let mut out = Vec::new();
    let mut dropped = 0;

    for b in bullets {
        let cited: Option<Vec<&Fact>> = b
            .facts
            .iter()
            .map(|id| facts.iter().find(|f| &f.id == id))
            .collect();
        let cited = match cited {
            Some(c) if !c.is_empty() && !b.text.trim().is_empty() => c,
            _ => {
                debug!(text = %b.text, "dropping bullet with unknown or missing citations");
                dropped += 1;
                continue;
            }
        };

        let n = cited.len() as f32;
        let reliability = cited.iter().map(|f| f.confidence).sum::<f32>() / n;
        let specificity = cited.iter().map(|f| specificity(f)).sum::<f32>() / n;
        let covered: HashSet<&str> = cited.iter().map(|f| f.vendor_id.as_str()).collect();
        let completeness = if all_vendors.is_empty() {
            0.0
        } else {
            covered.len() as f32 / all_vendors.len() as f32
        };

        out.push(ScoredBullet {
            text: b.text.trim().to_string(),
            facts: b.facts,
            answer_score: scoring::round4(scoring::answer_score(reliability, completeness, specificity)),
        });
    }
    (out, dropped)
}

/// Ask `client` for bullets over `facts` and score them. A declining client
/// yields an empty narrative.
pub async fn compose_narrative<C>(client: &C, prompt: &str, facts: &[Fact]) -> anyhow::Result<Narrative>
where
    C: NarrativeClient + ?Sized,
{
    let Some(raw) = client.complete(prompt, facts).await? else {
        return Ok(Narrative {
            provider: client.name(),
            ..Narrative::default()
        });
    };
    let bullets = parse_bullets(&raw)?;
    let (bullets, dropped) = score_bullets(bullets, facts);
    if dropped > 0 {
        warn!(provider = client.name(), dropped, "bullets citing unknown facts were dropped");
    }
    Ok(Narrative {
        bullets,
        dropped,
        provider: client.name(),
    })
}
