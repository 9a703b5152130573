// src/fetch.rs
//! Conditional HTTP GET with ETag / Last-Modified validators, per-request
//! timeout and bounded retries. Non-2xx statuses come back as results with an
//! empty body; only transport failures are errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use reqwest::header::{
    CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::PipelineConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("connect error for {url}: {message}")]
    Connect { url: String, message: String },
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl(_))
    }

    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if e.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else if e.is_builder() {
            FetchError::InvalidUrl(url.to_string())
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Validators from a previous fetch of the same URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Skip conditional headers (discovery and debugging fetches).
    pub force_fresh: bool,
}

impl FetchOptions {
    pub fn fresh() -> Self {
        Self { force_fresh: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    /// Present only for 2xx HTML responses.
    pub body: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED.as_u16()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
            None => false,
        }
    }

    pub fn validators(&self) -> CacheValidators {
        CacheValidators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }

    /// `Last-Modified` parsed as an HTTP date, if the server sent a valid one.
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        self.last_modified.as_deref().and_then(|lm| {
            DateTime::parse_from_rfc2822(lm)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        opts: FetchOptions,
    ) -> Result<FetchResult, FetchError>;
}

#[async_trait]
impl Fetcher for Box<dyn Fetcher> {
    async fn fetch(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        opts: FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        (**self).fetch(url, validators, opts).await
    }
}

/// reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    retries: u32,
    backoff: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(4).min(cfg.fetch_timeout()))
            .timeout(cfg.fetch_timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            http,
            retries: cfg.fetch_retries,
            backoff: Duration::from_millis(cfg.retry_backoff_ms),
            max_body_bytes: cfg.max_body_bytes,
        })
    }

    fn header(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    async fn attempt(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        opts: FetchOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let mut req = self.http.get(url);
        if !opts.force_fresh {
            if let Some(v) = validators {
                if let Some(etag) = &v.etag {
                    req = req.header(IF_NONE_MATCH, etag);
                }
                if let Some(lm) = &v.last_modified {
                    req = req.header(IF_MODIFIED_SINCE, lm);
                }
            }
        }
        req.send().await.map_err(|e| FetchError::from_reqwest(url, e))
    }

    async fn into_result(
        &self,
        url: &str,
        mut resp: reqwest::Response,
    ) -> Result<FetchResult, FetchError> {
        let status = resp.status();
        let final_url = resp.url().to_string();
        let etag = Self::header(&resp, ETAG);
        let last_modified = Self::header(&resp, LAST_MODIFIED);
        let content_type = Self::header(&resp, CONTENT_TYPE);

        let mut out = FetchResult {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            body: None,
            etag,
            last_modified,
            content_type,
            fetched_at: Utc::now(),
        };

        if !status.is_success() || !out.is_html() {
            return Ok(out);
        }

        let cap = self.max_body_bytes;
        let mut buf: Vec<u8> = Vec::new();
        let mut capped = false;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
        {
            buf.extend_from_slice(&chunk);
            if buf.len() >= cap {
                capped = true;
                break;
            }
        }
        if capped {
            debug!(url, cap, "body cap reached");
            buf.truncate(cap);
        }

        let mut body = String::from_utf8_lossy(&buf).into_owned();
        // a multibyte char split by the cap decodes as one trailing U+FFFD
        if capped && body.ends_with('\u{FFFD}') {
            body.pop();
        }
        out.body = Some(truncate_at_char_boundary(body, cap));
        Ok(out)
    }
}

fn truncate_at_char_boundary(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        validators: Option<&CacheValidators>,
        opts: FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        if Url::parse(url).is_err() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let started = Instant::now();
        let mut attempt = 0u32;
        let outcome = loop {
            counter!("crawler_fetch_total").increment(1);
            match self.attempt(url, validators, opts).await {
                Ok(resp) if should_retry_status(resp.status()) && attempt < self.retries => {
                    debug!(url, status = resp.status().as_u16(), attempt, "retrying status");
                }
                Ok(resp) => break self.into_result(url, resp).await,
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    debug!(url, error = %e, attempt, "retrying transport error");
                }
                Err(e) => break Err(e),
            }
            attempt += 1;
            tokio::time::sleep(self.backoff * attempt).await;
        };

        histogram!("crawler_fetch_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        if let Err(e) = &outcome {
            counter!("crawler_fetch_errors_total").increment(1);
            warn!(url, error = %e, "fetch failed");
        }
        outcome
    }
}
