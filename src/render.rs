// src/render.rs
//! Optional headless rendering for JS-heavy pages. Failures never propagate:
//! a renderer that cannot render returns an empty page.

use async_trait::async_trait;
use metrics::counter;
use std::time::Duration;
use tracing::warn;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
}

impl RenderedPage {
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

#[async_trait]
pub trait HeadlessRenderer: Send + Sync {
    /// False for the no-op renderer; the crawler skips escalation entirely.
    fn available(&self) -> bool {
        true
    }

    async fn render(&self, url: &str, timeout_ms: u64) -> RenderedPage;
}

#[async_trait]
impl HeadlessRenderer for Box<dyn HeadlessRenderer> {
    fn available(&self) -> bool {
        (**self).available()
    }

    async fn render(&self, url: &str, timeout_ms: u64) -> RenderedPage {
        (**self).render(url, timeout_ms).await
    }
}

/// Pick the configured renderer: Browserless when an endpoint is set, else no-op.
pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Box<dyn HeadlessRenderer>> {
    match BrowserlessRenderer::from_config(cfg)? {
        Some(r) => Ok(Box::new(r)),
        None => Ok(Box::new(NoopRenderer)),
    }
}

/// Default renderer: no browser, nothing rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

#[async_trait]
impl HeadlessRenderer for NoopRenderer {
    fn available(&self) -> bool {
        false
    }

    async fn render(&self, _url: &str, _timeout_ms: u64) -> RenderedPage {
        RenderedPage::default()
    }
}

/// Browserless `/content` endpoint: POST `{"url": ...}`, returns rendered HTML.
#[derive(Debug, Clone)]
pub struct BrowserlessRenderer {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Build from config; `None` when no endpoint is configured.
    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Option<Self>> {
        match cfg.browserless_url.as_deref() {
            Some(base) => Ok(Some(Self::new(base, cfg.browserless_token.as_deref())?)),
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => format!("{}/content?token={token}", self.base_url),
            None => format!("{}/content", self.base_url),
        }
    }

    async fn try_render(&self, url: &str, timeout_ms: u64) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(self.endpoint())
            .timeout(Duration::from_millis(timeout_ms))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            anyhow::bail!("browserless status {}: {}", status.as_u16(), message);
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl HeadlessRenderer for BrowserlessRenderer {
    async fn render(&self, url: &str, timeout_ms: u64) -> RenderedPage {
        counter!("crawler_headless_renders_total").increment(1);
        match self.try_render(url, timeout_ms).await {
            Ok(html) => RenderedPage { html },
            Err(e) => {
                warn!(url, error = %e, "headless render failed");
                RenderedPage::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_renders_nothing() {
        let r = NoopRenderer;
        assert!(!r.available());
        assert!(r.render("https://vendor.test/pricing", 1000).await.is_empty());
    }

    #[test]
    fn endpoint_carries_token() {
        let r = BrowserlessRenderer::new("http://chrome:3000/", Some("s3cret")).unwrap();
        assert_eq!(r.endpoint(), "http://chrome:3000/content?token=s3cret");
        let r = BrowserlessRenderer::new("http://chrome:3000", None).unwrap();
        assert_eq!(r.endpoint(), "http://chrome:3000/content");
    }

    #[test]
    fn from_config_requires_url() {
        let cfg = PipelineConfig::default();
        assert!(BrowserlessRenderer::from_config(&cfg).unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_browser_yields_empty_page() {
        // port 9 (discard) on loopback is closed in test environments
        let r = BrowserlessRenderer::new("http://127.0.0.1:9", None).unwrap();
        assert!(r.render("https://vendor.test/", 2000).await.is_empty());
    }
}
