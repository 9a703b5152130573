// tests/common/mod.rs
//
// Shared fixtures: an in-memory site served through the `Fetcher` seam and a
// pipeline wired the same way the binary wires it (boxed fetcher + renderer).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use vendor_facts::api::AppPipeline;
use vendor_facts::config::{CompiledRegistry, PipelineConfig};
use vendor_facts::fetch::{CacheValidators, FetchError, FetchOptions, FetchResult, Fetcher};
use vendor_facts::render::{HeadlessRenderer, NoopRenderer};
use vendor_facts::{MemoryStore, Pipeline, Vendor};

pub const ROOT: &str = "https://acme.test";

pub const PRICING_HTML: &str = r#"<html><head><title>Pricing | Acme</title></head><body>
<nav>Home Docs Login</nav>
<main><h1>Pricing</h1>
<h2>Pro</h2><p>$49 per month, billed annually. Start a free trial.</p>
<h2>Enterprise</h2><p>Contact sales for annual plans.</p></main>
<footer>Acme Inc</footer></body></html>"#;

pub const SECURITY_HTML: &str = r#"<html><head><title>Security | Acme</title></head><body>
<nav>Home Docs Login</nav>
<main><h1>Security at Acme</h1>
<p>We are SOC 2 Type II certified and audited every year.</p>
<p>Our information security program is ISO 27001 certified.</p>
<p>Data processing is GDPR compliant. Encryption at rest and in transit.</p></main>
<footer>Acme Inc</footer></body></html>"#;

pub fn pricing_at(amount: u32) -> String {
    PRICING_HTML.replace("$49", &format!("${amount}"))
}

/// Fixed pages keyed by absolute URL; everything else is a 404. Clones share
/// the same pages so a test can edit the site between runs.
#[derive(Clone, Default)]
pub struct SiteFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl SiteFetcher {
    pub fn acme() -> Self {
        let f = Self::default();
        f.set("/pricing", PRICING_HTML);
        f.set("/security", SECURITY_HTML);
        f
    }

    pub fn set(&self, path: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(format!("{ROOT}{path}"), html.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(
        &self,
        url: &str,
        _validators: Option<&CacheValidators>,
        _opts: FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let body = self.pages.lock().unwrap().get(url).cloned();
        Ok(FetchResult {
            url: url.to_string(),
            final_url: url.to_string(),
            status: if body.is_some() { 200 } else { 404 },
            body,
            etag: None,
            last_modified: None,
            content_type: Some("text/html; charset=utf-8".into()),
            fetched_at: Utc::now(),
        })
    }
}

pub fn pipeline(site: &SiteFetcher) -> AppPipeline {
    let fetcher: Box<dyn Fetcher> = Box::new(site.clone());
    let renderer: Box<dyn HeadlessRenderer> = Box::new(NoopRenderer);
    Pipeline::new(
        Arc::new(MemoryStore::new()),
        Arc::new(fetcher),
        Arc::new(renderer),
        Arc::new(CompiledRegistry::builtin()),
        Arc::new(PipelineConfig::default()),
    )
}

pub fn acme() -> Vendor {
    Vendor::new("acme", "Acme", ROOT).unwrap()
}
