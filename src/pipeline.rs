// src/pipeline.rs
//! Per (vendor, lane) orchestration:
//! Idle -> Discovering -> Extracting -> Scoring -> Persisting -> Done, with
//! Error reachable from any step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CompiledRegistry, PipelineConfig};
use crate::crawler::{CrawlHit, Crawler};
use crate::extract::{content_blocks, extractor_for, is_structured, ExtractInput, FactCandidate, PageInput};
use crate::fetch::{CacheValidators, FetchOptions, Fetcher};
use crate::classifier::Classifier;
use crate::lane::Lane;
use crate::model::{
    body_hash, reason, Citation, Fact, FactUpsert, Severity, Source, UnknownReason, UpdateEvent, UpdateKind,
    Vendor,
};
use crate::render::HeadlessRenderer;
use crate::scope;
use crate::scoring::{self, SourceSignals};
use crate::store::FactStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Discovering,
    Extracting,
    Scoring,
    Persisting,
    Done,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneReport {
    pub lane: Lane,
    pub state: RunState,
    pub transitions: Vec<RunState>,
    pub parsed: usize,
    pub saved: usize,
    pub unchanged: usize,
    pub skipped: Vec<String>,
    pub fact_ids: Vec<String>,
    pub hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LaneReport {
    fn new(lane: Lane) -> Self {
        Self {
            lane,
            state: RunState::Idle,
            transitions: vec![RunState::Idle],
            parsed: 0,
            saved: 0,
            unchanged: 0,
            skipped: Vec::new(),
            fact_ids: Vec::new(),
            hits: 0,
            error: None,
        }
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        self.transitions.push(state);
    }

    fn skip(&mut self, why: &str) {
        push_reason(&mut self.skipped, why);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageReport {
    pub parsed: usize,
    pub saved: usize,
    pub unchanged: usize,
    pub skipped: Vec<String>,
}

/// Result of `extract_page`: the ids of persisted (saved or unchanged) facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageExtraction {
    pub fact_ids: Vec<String>,
    pub report: PageReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub not_modified: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub errors: usize,
    pub saved: usize,
    pub touched: usize,
}

fn push_reason(list: &mut Vec<String>, why: &str) {
    if !list.iter().any(|r| r == why) {
        list.push(why.to_string());
    }
}

/// A candidate that passed the page gate, with the citations backing it.
#[derive(Debug, Clone)]
struct Pending {
    cand: FactCandidate,
    citations: Vec<Citation>,
}

/// Output of the Scoring step.
#[derive(Debug, Clone)]
struct Scored {
    cand: FactCandidate,
    citations: Vec<Citation>,
    confidence: f32,
    existing: Option<Fact>,
}

#[derive(Debug, Default)]
struct Collected {
    pending: Vec<Pending>,
    /// Facts confirmed by an unchanged page body.
    touched: Vec<String>,
    parsed: usize,
    skipped: Vec<String>,
}

impl Collected {
    fn merge(&mut self, other: Collected) {
        for p in other.pending {
            add_pending(&mut self.pending, p);
        }
        for id in other.touched {
            if !self.touched.contains(&id) {
                self.touched.push(id);
            }
        }
        self.parsed += other.parsed;
        for s in other.skipped {
            push_reason(&mut self.skipped, &s);
        }
    }

    fn items(&self) -> usize {
        self.pending.len() + self.touched.len()
    }
}

/// Same identity from several pages: keep the most confident value, union citations.
fn add_pending(list: &mut Vec<Pending>, p: Pending) {
    match list
        .iter_mut()
        .find(|o| o.cand.subject == p.cand.subject && o.cand.key == p.cand.key)
    {
        Some(existing) => {
            for c in p.citations {
                if !existing.citations.iter().any(|e| e.url == c.url) {
                    existing.citations.push(c);
                }
            }
            if p.cand.confidence > existing.cand.confidence {
                existing.cand = p.cand;
            }
        }
        None => list.push(p),
    }
}

fn merge_citations(old: &[Citation], new: &[Citation]) -> Vec<Citation> {
    let mut out = old.to_vec();
    for c in new {
        match out.iter_mut().find(|o| o.url == c.url) {
            Some(o) => *o = c.clone(),
            None => out.push(c.clone()),
        }
    }
    out
}

/// Independent sites behind a citation set; a vendor's subdomains count once.
fn distinct_domains(urls: &[String]) -> usize {
    urls.iter()
        .filter_map(|u| scope::host_of(u))
        .map(|h| scope::registrable_domain(&h))
        .collect::<HashSet<String>>()
        .len()
}

fn last_modified_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw?.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

type RunKey = (String, Lane);

pub struct Pipeline<S, F, R> {
    store: Arc<S>,
    fetcher: Arc<F>,
    renderer: Arc<R>,
    crawler: Crawler<F, R>,
    cfg: Arc<PipelineConfig>,
    locks: Mutex<HashMap<RunKey, Arc<Mutex<()>>>>,
    last_runs: Mutex<HashMap<RunKey, Instant>>,
}

impl<S, F, R> Pipeline<S, F, R>
where
    S: FactStore,
    F: Fetcher,
    R: HeadlessRenderer,
{
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<F>,
        renderer: Arc<R>,
        registry: Arc<CompiledRegistry>,
        cfg: Arc<PipelineConfig>,
    ) -> Self {
        let classifier = Classifier::new(registry, cfg.classify_threshold);
        let crawler = Crawler::new(fetcher.clone(), renderer.clone(), classifier, cfg.clone());
        Self {
            store,
            fetcher,
            renderer,
            crawler,
            cfg,
            locks: Mutex::new(HashMap::new()),
            last_runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn crawler(&self) -> &Crawler<F, R> {
        &self.crawler
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Run every requested lane in order. A failing lane does not affect the others.
    pub async fn run(&self, org_id: &str, vendor: &Vendor, lanes: &[Lane]) -> Vec<LaneReport> {
        let mut out = Vec::with_capacity(lanes.len());
        for lane in lanes {
            out.push(self.run_lane(org_id, vendor, *lane).await);
        }
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        out
    }

    pub async fn run_lane(&self, org_id: &str, vendor: &Vendor, lane: Lane) -> LaneReport {
        let mut report = LaneReport::new(lane);
        let key: RunKey = (vendor.id.clone(), lane);

        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let Ok(_guard) = lock.try_lock() else {
            info!(vendor = %vendor.id, lane = %lane, "run already in progress");
            report.skip(reason::RUN_IN_PROGRESS);
            report.enter(RunState::Done);
            return report;
        };

        let cooldown = self.cfg.run_cooldown();
        if !cooldown.is_zero() {
            let last = self.last_runs.lock().await.get(&key).copied();
            if last.is_some_and(|t| t.elapsed() < cooldown) {
                debug!(vendor = %vendor.id, lane = %lane, "within cooldown window");
                report.skip(reason::COOLDOWN);
                report.enter(RunState::Done);
                return report;
            }
        }

        counter!("pipeline_runs_total", "lane" => lane.as_str()).increment(1);
        let started = Instant::now();
        if let Err(e) = self.drive(org_id, vendor, lane, &mut report).await {
            counter!("pipeline_lane_errors_total", "lane" => lane.as_str()).increment(1);
            warn!(vendor = %vendor.id, lane = %lane, error = %format!("{e:#}"), "lane run failed");
            report.error = Some(format!("{e:#}"));
            report.enter(RunState::Error);
        }
        self.last_runs.lock().await.insert(key, Instant::now());

        info!(
            vendor = %vendor.id,
            lane = %lane,
            state = ?report.state,
            hits = report.hits,
            parsed = report.parsed,
            saved = report.saved,
            unchanged = report.unchanged,
            ms = started.elapsed().as_millis() as u64,
            "lane run finished"
        );
        report
    }

    async fn drive(&self, org_id: &str, vendor: &Vendor, lane: Lane, report: &mut LaneReport) -> anyhow::Result<()> {
        report.enter(RunState::Discovering);
        let outcome = self
            .crawler
            .discover(&vendor.website, lane)
            .await
            .with_context(|| format!("discover `{}` for {}", vendor.website, lane))?;
        report.hits = outcome.hits.len();
        if outcome.hits.is_empty() {
            report.skip(reason::NO_HITS);
            self.record_unknown(org_id, vendor, lane, reason::NO_HITS).await?;
            report.enter(RunState::Done);
            return Ok(());
        }

        report.enter(RunState::Extracting);
        let need = self.crawler.classifier().registry().min_items(lane);
        let mut collected = Collected::default();
        for hit in &outcome.hits {
            let page = page_from_hit(hit);
            let validators = CacheValidators {
                etag: hit.etag.clone(),
                last_modified: hit.last_modified.clone(),
            };
            let c = self.collect_page(org_id, vendor, lane, &page, &validators).await?;
            collected.merge(c);
            if collected.items() >= need {
                debug!(vendor = %vendor.id, lane = %lane, items = collected.items(), "sufficient");
                break;
            }
        }

        if collected.items() < need {
            if let Some(top) = outcome.hits.first() {
                if let Some(c) = self.rerender(org_id, vendor, lane, top).await? {
                    collected.merge(c);
                }
            }
        }
        if collected.items() < need {
            report.skip(reason::INSUFFICIENT);
        }

        report.parsed = collected.parsed;
        for s in &collected.skipped {
            report.skip(s);
        }

        report.enter(RunState::Scoring);
        let mut skipped = Vec::new();
        let scored = self.score(&vendor.id, lane, collected.pending, &mut skipped).await?;
        for s in &skipped {
            report.skip(s);
        }

        report.enter(RunState::Persisting);
        let touched = self.touch_all(lane, &collected.touched).await?;
        let persisted = self.persist(org_id, &vendor.id, lane, scored).await?;
        report.saved = persisted.report.saved;
        report.unchanged = persisted.report.unchanged + touched.len();
        report.fact_ids = touched;
        for id in persisted.fact_ids {
            if !report.fact_ids.contains(&id) {
                report.fact_ids.push(id);
            }
        }

        if report.fact_ids.is_empty() {
            report.skip(reason::NO_FACTS);
            self.record_unknown(org_id, vendor, lane, reason::NO_FACTS).await?;
        }
        report.enter(RunState::Done);
        Ok(())
    }

    /// Re-render the top hit once when static extraction stayed insufficient.
    async fn rerender(
        &self,
        org_id: &str,
        vendor: &Vendor,
        lane: Lane,
        top: &CrawlHit,
    ) -> anyhow::Result<Option<Collected>> {
        if !self.cfg.headless_enabled || !self.renderer.available() || top.rendered {
            return Ok(None);
        }
        let page = self.renderer.render(&top.url, self.cfg.render_timeout_ms).await;
        if page.is_empty() {
            return Ok(None);
        }
        let view = self.crawler.view(&top.url, &page.html, lane);
        let input = PageInput {
            url: top.url.clone(),
            title: view.isolated.title,
            main_html: view.isolated.main_html,
            text: view.isolated.text,
            fetched_at: Utc::now(),
        };
        let c = self
            .collect_page(org_id, vendor, lane, &input, &CacheValidators::default())
            .await?;
        Ok(Some(c))
    }

    /// Extract, score and persist one page. This is the single-page entry point.
    pub async fn extract_page(
        &self,
        org_id: &str,
        vendor: &Vendor,
        lane: Lane,
        page: &PageInput,
        validators: &CacheValidators,
    ) -> anyhow::Result<PageExtraction> {
        let collected = self.collect_page(org_id, vendor, lane, page, validators).await?;
        let mut skipped = collected.skipped;
        let scored = self.score(&vendor.id, lane, collected.pending, &mut skipped).await?;
        let touched = self.touch_all(lane, &collected.touched).await?;
        let persisted = self.persist(org_id, &vendor.id, lane, scored).await?;

        let mut fact_ids = touched.clone();
        fact_ids.extend(persisted.fact_ids);
        Ok(PageExtraction {
            fact_ids,
            report: PageReport {
                parsed: collected.parsed,
                saved: persisted.report.saved,
                unchanged: persisted.report.unchanged + touched.len(),
                skipped,
            },
        })
    }

    fn source_score(&self, vendor: &Vendor, lane: Lane, page: &PageInput, structured: bool, lm: Option<&str>) -> f32 {
        let first_party = scope::is_first_party(&page.url, &vendor.domain);
        let dated = last_modified_at(lm).unwrap_or(page.fetched_at);
        let recency_days = (Utc::now() - dated).num_days().max(0);
        let signals = SourceSignals {
            first_party,
            recency_days,
            page_type_weight: self.crawler.classifier().registry().weight(lane),
            structured,
            reputation: if first_party {
                self.cfg.first_party_reputation
            } else {
                scoring::Reputation::Unknown
            },
        };
        scoring::round4(scoring::source_score(&signals))
    }

    /// Save the source, then extract behind the page gate. An unchanged body
    /// short-circuits to the facts it already backs.
    async fn collect_page(
        &self,
        org_id: &str,
        vendor: &Vendor,
        lane: Lane,
        page: &PageInput,
        validators: &CacheValidators,
    ) -> anyhow::Result<Collected> {
        let hash = body_hash(&page.text);
        if let Some(prev) = self.store.find_source(&vendor.id, &page.url).await? {
            if prev.body_hash == hash && prev.metric == Some(lane) {
                let cited = self.cited_facts(&vendor.id, lane, &page.url).await?;
                if !cited.is_empty() {
                    debug!(url = %page.url, facts = cited.len(), "body unchanged");
                    return Ok(Collected {
                        touched: cited.into_iter().map(|f| f.id).collect(),
                        ..Collected::default()
                    });
                }
            }
        }

        let structured = is_structured(&content_blocks(&page.main_html, &page.text));
        let score = self.source_score(vendor, lane, page, structured, validators.last_modified.as_deref());
        let source = Source {
            id: String::new(),
            org_id: org_id.to_string(),
            vendor_id: vendor.id.clone(),
            url: page.url.clone(),
            title: page.title.clone(),
            body: page.text.clone(),
            body_hash: hash,
            first_party: scope::is_first_party(&page.url, &vendor.domain),
            metric: Some(lane),
            source_score: score,
            structured,
            etag: validators.etag.clone(),
            last_modified: validators.last_modified.clone(),
            fetched_at: page.fetched_at,
        };
        let source_id = self
            .store
            .save_source(source)
            .await
            .with_context(|| format!("save source `{}`", page.url))?;

        let input = ExtractInput {
            org_id,
            vendor,
            page,
            max_entries: self.cfg.max_changelog_entries,
        };
        let extraction = extractor_for(lane).extract(&input);
        let mut out = Collected {
            parsed: extraction.report.parsed,
            skipped: extraction.report.skipped,
            ..Collected::default()
        };
        if extraction.candidates.is_empty() {
            return Ok(out);
        }
        if score < self.cfg.publish_threshold {
            counter!("facts_skipped_total", "lane" => lane.as_str()).increment(extraction.candidates.len() as u64);
            debug!(url = %page.url, score, "page below publish threshold");
            push_reason(&mut out.skipped, reason::LOW_SOURCE_SCORE);
            return Ok(out);
        }

        let citation = Citation {
            url: page.url.clone(),
            title: Some(page.title.clone()).filter(|t| !t.is_empty()),
            source_id: Some(source_id),
        };
        for cand in extraction.candidates {
            add_pending(
                &mut out.pending,
                Pending {
                    cand,
                    citations: vec![citation.clone()],
                },
            );
        }
        Ok(out)
    }

    /// Fact confidence = min(extraction confidence, fact score over every citing source).
    async fn score(
        &self,
        vendor_id: &str,
        lane: Lane,
        pending: Vec<Pending>,
        skipped: &mut Vec<String>,
    ) -> anyhow::Result<Vec<Scored>> {
        let mut out = Vec::with_capacity(pending.len());
        for p in pending {
            let existing = self
                .store
                .find_fact(vendor_id, lane, &p.cand.subject, &p.cand.key)
                .await?;
            let citations = match &existing {
                Some(f) => merge_citations(&f.citations, &p.citations),
                None => p.citations,
            };
            let urls: Vec<String> = citations.iter().map(|c| c.url.clone()).collect();
            let scores: Vec<f32> = self
                .store
                .source_scores(vendor_id, &urls)
                .await?
                .into_iter()
                .map(|(_, s)| s)
                .collect();
            let fact = scoring::fact_score(&scores, distinct_domains(&urls));
            let confidence = scoring::round4(p.cand.confidence.min(fact));
            if confidence < self.cfg.publish_threshold {
                counter!("facts_skipped_total", "lane" => lane.as_str()).increment(1);
                debug!(subject = %p.cand.subject, key = %p.cand.key, confidence, "below threshold");
                push_reason(skipped, reason::BELOW_THRESHOLD);
                continue;
            }
            out.push(Scored {
                cand: p.cand,
                citations,
                confidence,
                existing,
            });
        }
        Ok(out)
    }

    /// Upsert scored facts; an event is appended before any value change.
    async fn persist(&self, org_id: &str, vendor_id: &str, lane: Lane, scored: Vec<Scored>) -> anyhow::Result<PageExtraction> {
        let mut out = PageExtraction::default();
        for s in scored {
            let value_json = serde_json::to_value(&s.cand.value).context("serialize fact value")?;
            let upsert = FactUpsert {
                org_id: org_id.to_string(),
                vendor_id: vendor_id.to_string(),
                metric: lane,
                subject: s.cand.subject.clone(),
                key: s.cand.key.clone(),
                value_json: value_json.clone(),
                text_summary: s.cand.value.summary(),
                citations: s.citations,
                confidence: s.confidence,
            };

            let kind = match &s.existing {
                None => Some(UpdateKind::Added),
                Some(f) if f.value_json != value_json => Some(UpdateKind::Changed),
                Some(_) => None,
            };

            let id = match (kind, &s.existing) {
                (Some(kind), existing) => {
                    self.store
                        .record_update_event(UpdateEvent {
                            vendor_id: vendor_id.to_string(),
                            org_id: org_id.to_string(),
                            metric: lane,
                            kind,
                            subject: upsert.subject.clone(),
                            key: upsert.key.clone(),
                            old: existing.as_ref().map(|f| f.value_json.clone()),
                            new: value_json,
                            severity: Severity::for_lane(lane),
                            detected_at: Utc::now(),
                        })
                        .await?;
                    counter!("update_events_total", "lane" => lane.as_str()).increment(1);
                    counter!("facts_saved_total", "lane" => lane.as_str()).increment(1);
                    out.report.saved += 1;
                    self.store.upsert_fact(upsert).await?
                }
                (None, Some(f)) if f.confidence == upsert.confidence
                    && f.citations == upsert.citations
                    && f.text_summary == upsert.text_summary =>
                {
                    counter!("facts_unchanged_total", "lane" => lane.as_str()).increment(1);
                    out.report.unchanged += 1;
                    self.store.touch_fact(&f.id).await?;
                    f.id.clone()
                }
                (None, _) => {
                    // same value, refreshed confidence or citations
                    counter!("facts_unchanged_total", "lane" => lane.as_str()).increment(1);
                    out.report.unchanged += 1;
                    self.store.upsert_fact(upsert).await?
                }
            };
            out.fact_ids.push(id);
        }
        Ok(out)
    }

    async fn touch_all(&self, lane: Lane, ids: &[String]) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if self.store.touch_fact(id).await? {
                counter!("facts_unchanged_total", "lane" => lane.as_str()).increment(1);
                out.push(id.clone());
            }
        }
        Ok(out)
    }

    async fn cited_facts(&self, vendor_id: &str, lane: Lane, url: &str) -> anyhow::Result<Vec<Fact>> {
        Ok(self
            .store
            .facts_for_vendor(vendor_id, Some(lane))
            .await?
            .into_iter()
            .filter(|f| f.citations.iter().any(|c| c.url == url))
            .collect())
    }

    async fn record_unknown(&self, org_id: &str, vendor: &Vendor, lane: Lane, why: &str) -> anyhow::Result<()> {
        self.store
            .record_unknown_reason(UnknownReason {
                org_id: org_id.to_string(),
                vendor_id: vendor.id.clone(),
                metric: lane,
                reason: why.to_string(),
                recorded_at: Utc::now(),
            })
            .await
    }

    /// Re-fetch stored sources with their cache validators. Not-modified or
    /// byte-identical pages only advance `last_seen_at` of the facts they back.
    pub async fn refresh_sources(&self, org_id: &str, vendor: &Vendor, lane: Lane) -> anyhow::Result<RefreshReport> {
        let mut report = RefreshReport::default();
        for source in self.store.list_sources(&vendor.id, Some(lane)).await? {
            report.checked += 1;
            let validators = CacheValidators {
                etag: source.etag.clone(),
                last_modified: source.last_modified.clone(),
            };
            let res = match self
                .fetcher
                .fetch(&source.url, Some(&validators), FetchOptions::default())
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    report.errors += 1;
                    warn!(url = %source.url, error = %e, "refresh fetch failed");
                    continue;
                }
            };

            if res.not_modified() {
                report.not_modified += 1;
                report.touched += self.touch_cited(&vendor.id, lane, &source.url).await?;
                continue;
            }
            let body = match res.body.as_deref() {
                Some(b) if res.is_success() => b,
                _ => {
                    report.errors += 1;
                    debug!(url = %source.url, status = res.status, "refresh skipped");
                    continue;
                }
            };

            let view = self.crawler.view(&source.url, body, lane);
            let page = PageInput {
                url: source.url.clone(),
                title: view.isolated.title,
                main_html: view.isolated.main_html,
                text: view.isolated.text,
                fetched_at: res.fetched_at,
            };
            if body_hash(&page.text) == source.body_hash {
                report.unchanged += 1;
                report.touched += self.touch_cited(&vendor.id, lane, &source.url).await?;
                continue;
            }

            report.changed += 1;
            let out = self
                .extract_page(org_id, vendor, lane, &page, &res.validators())
                .await?;
            report.saved += out.report.saved;
        }
        info!(
            vendor = %vendor.id,
            lane = %lane,
            checked = report.checked,
            changed = report.changed,
            "sources refreshed"
        );
        Ok(report)
    }

    async fn touch_cited(&self, vendor_id: &str, lane: Lane, url: &str) -> anyhow::Result<usize> {
        let ids: Vec<String> = self
            .cited_facts(vendor_id, lane, url)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();
        Ok(self.touch_all(lane, &ids).await?.len())
    }
}

fn page_from_hit(hit: &CrawlHit) -> PageInput {
    PageInput {
        url: hit.url.clone(),
        title: hit.title.clone(),
        main_html: hit.main_html.clone(),
        text: hit.text.clone(),
        fetched_at: hit.fetched_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchError, FetchResult};
    use crate::render::NoopRenderer;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    const PRICING_HTML: &str = r#"<html><head><title>Pricing | Vendor</title></head><body>
<nav>Home Docs Login</nav>
<main><h1>Pricing</h1>
<h2>Pro</h2><p>$49 per month, billed annually. Start a free trial.</p>
<h2>Enterprise</h2><p>Contact sales for annual plans.</p></main>
<footer>Vendor Inc</footer></body></html>"#;

    /// Serves fixed pages; everything else is a 404.
    #[derive(Default)]
    struct SiteFetcher {
        pages: StdMutex<HashMap<String, String>>,
        calls: StdMutex<Vec<String>>,
    }

    impl SiteFetcher {
        fn with(url: &str, html: &str) -> Self {
            let f = Self::default();
            f.set(url, html);
            f
        }

        fn set(&self, url: &str, html: &str) {
            self.pages.lock().unwrap().insert(url.to_string(), html.to_string());
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

    fn pipeline(fetcher: SiteFetcher, cfg: PipelineConfig) -> Pipeline<MemoryStore, SiteFetcher, NoopRenderer> {
        Pipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(fetcher),
            Arc::new(NoopRenderer),
            Arc::new(CompiledRegistry::builtin()),
            Arc::new(cfg),
        )
    }

    fn vendor() -> Vendor {
        Vendor::new("v1", "Vendor", "https://vendor.test").unwrap()
    }

    fn features_page(text: &str) -> PageInput {
        PageInput {
            url: "https://vendor.test/features".into(),
            title: "Features".into(),
            main_html: String::new(),
            text: text.into(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pricing_run_saves_then_stays_quiet() {
        let p = pipeline(
            SiteFetcher::with("https://vendor.test/pricing", PRICING_HTML),
            PipelineConfig::default(),
        );
        let v = vendor();

        let first = p.run_lane("org1", &v, Lane::Pricing).await;
        assert_eq!(first.state, RunState::Done, "{first:?}");
        assert_eq!(
            first.transitions,
            vec![
                RunState::Idle,
                RunState::Discovering,
                RunState::Extracting,
                RunState::Scoring,
                RunState::Persisting,
                RunState::Done
            ]
        );
        assert_eq!(first.saved, 1);
        assert_eq!(first.fact_ids.len(), 1);
        let fact = p
            .store()
            .find_fact("v1", Lane::Pricing, "pro", "49-usd-per-month")
            .await
            .unwrap()
            .unwrap();
        assert!((fact.confidence - 0.85).abs() < 1e-6);
        assert_eq!(fact.citations[0].url, "https://vendor.test/pricing");

        let second = p.run_lane("org1", &v, Lane::Pricing).await;
        assert_eq!(second.saved, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.fact_ids, first.fact_ids);
        assert_eq!(p.store().update_events("v1").await.unwrap().len(), 1);
        let again = p
            .store()
            .find_fact("v1", Lane::Pricing, "pro", "49-usd-per-month")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.value_json, fact.value_json);
        assert!(again.last_seen_at >= fact.last_seen_at);
    }

    #[tokio::test]
    async fn identical_value_persisted_twice_records_one_event() {
        let p = pipeline(SiteFetcher::default(), PipelineConfig::default());
        let v = vendor();
        let page = features_page("| SSO | ✓ Enterprise only |");

        let a = p
            .extract_page("org1", &v, Lane::Features, &page, &CacheValidators::default())
            .await
            .unwrap();
        assert_eq!(a.report.saved, 1);
        let before = p.store().facts_for_vendor("v1", None).await.unwrap()[0].clone();

        // skip the body-hash short cut by re-running the persist step directly
        let scored = vec![Scored {
            cand: extractor_for(Lane::Features)
                .extract(&ExtractInput {
                    org_id: "org1",
                    vendor: &v,
                    page: &page,
                    max_entries: 20,
                })
                .candidates
                .remove(0),
            citations: before.citations.clone(),
            confidence: before.confidence,
            existing: Some(before.clone()),
        }];
        let b = p.persist("org1", "v1", Lane::Features, scored).await.unwrap();
        assert_eq!(b.report.saved, 0);
        assert_eq!(b.report.unchanged, 1);

        let after = p.store().facts_for_vendor("v1", None).await.unwrap()[0].clone();
        assert_eq!(p.store().update_events("v1").await.unwrap().len(), 1);
        assert_eq!(
            serde_json::to_string(&after.value_json).unwrap(),
            serde_json::to_string(&before.value_json).unwrap()
        );
        assert!(after.last_seen_at >= before.last_seen_at);
    }

    #[tokio::test]
    async fn changed_value_appends_event_with_old_payload() {
        let p = pipeline(SiteFetcher::default(), PipelineConfig::default());
        let v = vendor();
        p.extract_page(
            "org1",
            &v,
            Lane::Features,
            &features_page("| SSO | ✓ Enterprise only |"),
            &CacheValidators::default(),
        )
        .await
        .unwrap();
        let out = p
            .extract_page("org1", &v, Lane::Features, &features_page("| SSO | ✓ |"), &CacheValidators::default())
            .await
            .unwrap();
        assert_eq!(out.report.saved, 1);

        let events = p.store().update_events("v1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, UpdateKind::Changed);
        assert_eq!(events[1].severity, Severity::Medium);
        assert_eq!(events[1].old.as_ref().unwrap()["support"], "limited");
        assert_eq!(events[1].new["support"], "native");
        assert_eq!(p.store().fact_count().await, 1);
    }

    #[tokio::test]
    async fn third_party_page_yields_no_facts() {
        let p = pipeline(SiteFetcher::default(), PipelineConfig::default());
        let mut page = features_page("| SSO | ✓ |");
        page.url = "https://techcrunch.test/vendor-raises".into();
        let out = p
            .extract_page("org1", &vendor(), Lane::Features, &page, &CacheValidators::default())
            .await
            .unwrap();
        assert!(out.fact_ids.is_empty());
        assert_eq!(out.report.skipped, vec!["non-first-party".to_string()]);
    }

    #[tokio::test]
    async fn zero_hits_is_done_with_unknown_reason() {
        let p = pipeline(SiteFetcher::default(), PipelineConfig::default());
        let r = p.run_lane("org1", &vendor(), Lane::Security).await;
        assert_eq!(r.state, RunState::Done);
        assert_eq!(r.skipped, vec!["no-hits".to_string()]);
        assert_eq!(r.parsed, 0);
        let reasons = p.store().unknown_reasons("v1").await.unwrap();
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].reason, "no-hits");
    }

    #[tokio::test]
    async fn cooldown_throttles_repeat_runs() {
        let cfg = PipelineConfig {
            run_cooldown_secs: 600,
            ..PipelineConfig::default()
        };
        let p = pipeline(SiteFetcher::with("https://vendor.test/pricing", PRICING_HTML), cfg);
        let v = vendor();
        assert_eq!(p.run_lane("org1", &v, Lane::Pricing).await.saved, 1);
        let r = p.run_lane("org1", &v, Lane::Pricing).await;
        assert_eq!(r.skipped, vec!["cooldown".to_string()]);
        assert_eq!(r.transitions, vec![RunState::Idle, RunState::Done]);
        // other lanes are independent
        assert!(!p.run_lane("org1", &v, Lane::Security).await.skipped.contains(&"cooldown".to_string()));
    }

    #[tokio::test]
    async fn overlapping_run_for_same_key_is_rejected_not_queued() {
        let p = pipeline(
            SiteFetcher::with("https://vendor.test/pricing", PRICING_HTML),
            PipelineConfig::default(),
        );
        let v = vendor();

        // an in-flight run holds the per-key lock
        let held = {
            let mut locks = p.locks.lock().await;
            locks.entry((v.id.clone(), Lane::Pricing)).or_default().clone()
        };
        let guard = held.lock().await;

        let r = p.run_lane("org1", &v, Lane::Pricing).await;
        assert_eq!(r.state, RunState::Done);
        assert_eq!(r.skipped, vec![reason::RUN_IN_PROGRESS.to_string()]);
        assert_eq!(r.transitions, vec![RunState::Idle, RunState::Done]);
        assert!(p.fetcher.calls.lock().unwrap().is_empty());

        let other = p.run_lane("org1", &v, Lane::Security).await;
        assert!(!other.skipped.contains(&reason::RUN_IN_PROGRESS.to_string()));

        drop(guard);
        let after = p.run_lane("org1", &v, Lane::Pricing).await;
        assert!(after.skipped.is_empty(), "{after:?}");
        assert_eq!(after.saved, 1);
    }

    #[test]
    fn subdomains_of_one_site_count_as_one_domain() {
        let urls = vec![
            "https://vendor.test/security".to_string(),
            "https://docs.vendor.test/compliance".to_string(),
            "https://www.vendor.test/trust".to_string(),
        ];
        assert_eq!(distinct_domains(&urls), 1);

        let mut with_third_party = urls.clone();
        with_third_party.push("https://auditor.test/report".to_string());
        with_third_party.push("not a url".to_string());
        assert_eq!(distinct_domains(&with_third_party), 2);
    }

    #[tokio::test]
    async fn bad_vendor_website_fails_only_that_lane() {
        let p = pipeline(SiteFetcher::default(), PipelineConfig::default());
        let v = Vendor {
            id: "v9".into(),
            name: "Broken".into(),
            website: "not a url".into(),
            domain: "broken.test".into(),
        };
        let reports = p.run("org1", &v, &[Lane::Pricing, Lane::Features]).await;
        assert_eq!(reports.len(), 2);
        for r in &reports {
            assert_eq!(r.state, RunState::Error);
            assert!(r.error.as_deref().unwrap_or_default().contains("not a url"));
        }
    }

    #[tokio::test]
    async fn refresh_touches_unchanged_and_reextracts_changed() {
        let fetcher = SiteFetcher::with("https://vendor.test/pricing", PRICING_HTML);
        let p = pipeline(fetcher, PipelineConfig::default());
        let v = vendor();
        p.run_lane("org1", &v, Lane::Pricing).await;

        let r = p.refresh_sources("org1", &v, Lane::Pricing).await.unwrap();
        assert_eq!(r.checked, 1);
        assert_eq!(r.unchanged, 1);
        assert_eq!(r.touched, 1);

        p.fetcher.set("https://vendor.test/pricing", &PRICING_HTML.replace("$49", "$59"));
        let r = p.refresh_sources("org1", &v, Lane::Pricing).await.unwrap();
        assert_eq!(r.changed, 1);
        assert_eq!(r.saved, 1);
        assert!(p
            .store()
            .find_fact("v1", Lane::Pricing, "pro", "59-usd-per-month")
            .await
            .unwrap()
            .is_some());
    }
}
