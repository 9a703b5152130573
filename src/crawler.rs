// src/crawler.rs
//! Bounded, domain-scoped BFS discovery of candidate pages for one lane.
//! Visit order is FIFO and deterministic; the returned hits are re-sorted by
//! lane score.

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::classifier::{Classification, Classifier, LaneScore, Why};
use crate::config::PipelineConfig;
use crate::fetch::{FetchOptions, Fetcher};
use crate::html;
use crate::lane::Lane;
use crate::readability::{Isolated, Isolator};
use crate::render::HeadlessRenderer;
use crate::scope::DomainScope;

pub const MAX_DEPTH: usize = 2;
pub const MAX_VISITS: usize = 60;
pub const MAX_HITS: usize = 8;

/// Bodies shorter than this are treated as empty shells.
const MIN_HTML_BYTES: usize = 120;

/// Path guesses resolved against the root origin, visited first in this order.
pub const SEED_PATHS: &[&str] = &[
    "/",
    "/pricing",
    "/plans",
    "/features",
    "/product",
    "/integrations",
    "/security",
    "/trust",
    "/changelog",
    "/release-notes",
    "/docs",
    "/status",
];

/// An accepted candidate page.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlHit {
    pub url: String,
    pub title: String,
    pub main_html: String,
    pub text: String,
    #[serde(skip)]
    pub html: String,
    /// Score of the requested lane for this page.
    pub class_score: f32,
    pub classified_as: Option<Lane>,
    pub why: Why,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub rendered: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    pub fetched: usize,
    pub errors: usize,
    pub skipped: usize,
    pub rendered: usize,
    pub deadline_hit: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub hits: Vec<CrawlHit>,
    /// Fetched URLs with their BFS depth, in visit order.
    pub visited: Vec<(String, usize)>,
    pub stats: CrawlStats,
}

/// Isolation + classification of one HTML document.
#[derive(Debug, Clone)]
pub struct PageView {
    pub isolated: Isolated,
    pub classification: Classification,
    pub lane_score: LaneScore,
}

pub struct Crawler<F, R> {
    fetcher: Arc<F>,
    renderer: Arc<R>,
    classifier: Classifier,
    isolator: Isolator,
    cfg: Arc<PipelineConfig>,
}

impl<F, R> Crawler<F, R>
where
    F: Fetcher,
    R: HeadlessRenderer,
{
    pub fn new(
        fetcher: Arc<F>,
        renderer: Arc<R>,
        classifier: Classifier,
        cfg: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            classifier,
            isolator: Isolator::default(),
            cfg,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn isolator(&self) -> &Isolator {
        &self.isolator
    }

    /// Isolate and classify `raw_html` as if served from `url`.
    pub fn view(&self, url: &str, raw_html: &str, metric: Lane) -> PageView {
        let isolated = self.isolator.isolate(raw_html);
        let text = format!("{}\n{}", isolated.title, isolated.text);
        let classification = self.classifier.classify(url, &text);
        let lane_score = classification
            .lanes
            .iter()
            .find(|s| s.lane == metric)
            .cloned()
            .unwrap_or_else(|| self.classifier.score_for(metric, url, &text));
        PageView {
            isolated,
            classification,
            lane_score,
        }
    }

    fn accepts(&self, url: &str, view: &PageView, metric: Lane) -> bool {
        if view.classification.metric == Some(metric) {
            return true;
        }
        self.classifier.registry().lane(metric).url_matches(url)
            && view.lane_score.score >= self.cfg.url_strong_score
    }

    /// Headless escalation gate: enabled, URL matches the lane, static score
    /// under the threshold, and the raw document carries a lane render hint.
    fn wants_render(&self, url: &str, raw_html: &str, view: &PageView, metric: Lane) -> bool {
        if !self.cfg.headless_enabled || !self.renderer.available() {
            return false;
        }
        let lane = self.classifier.registry().lane(metric);
        lane.url_matches(url)
            && view.lane_score.score < self.classifier.threshold()
            && lane.has_render_hint(&html::to_text(raw_html))
    }

    pub async fn discover(&self, root_url: &str, metric: Lane) -> anyhow::Result<CrawlOutcome> {
        let root = Url::parse(root_url.trim())
            .with_context(|| format!("invalid root url `{root_url}`"))?;
        if root.scheme() != "http" && root.scheme() != "https" {
            bail!("root url `{}` must be http(s)", root_url);
        }
        let scope = DomainScope::from_url(&root)
            .ok_or_else(|| anyhow!("root url `{}` has no host", root_url))?;

        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        for path in SEED_PATHS {
            if let Some(u) = scope.resolve(&root, path) {
                if seen.insert(u.clone()) {
                    queue.push_back((u, 0));
                }
            }
        }

        let deadline = Instant::now() + self.cfg.crawl_deadline();
        let mut stats = CrawlStats::default();
        let mut visited = Vec::new();
        let mut hits: Vec<CrawlHit> = Vec::new();

        while let Some((url, depth)) = queue.pop_front() {
            if stats.fetched >= MAX_VISITS {
                break;
            }
            if Instant::now() >= deadline {
                stats.deadline_hit = true;
                info!(root = %root, lane = %metric, "crawl deadline reached");
                break;
            }

            stats.fetched += 1;
            visited.push((url.clone(), depth));

            let res = match self.fetcher.fetch(&url, None, FetchOptions::fresh()).await {
                Ok(r) => r,
                Err(e) => {
                    stats.errors += 1;
                    debug!(url = %url, error = %e, "unreachable, skipping");
                    continue;
                }
            };
            let body = match res.body.as_deref() {
                Some(b) if !res.not_modified() && res.is_success() && b.trim().len() >= MIN_HTML_BYTES => b,
                _ => {
                    stats.skipped += 1;
                    counter!("crawler_pages_skipped_total").increment(1);
                    continue;
                }
            };

            if depth < MAX_DEPTH {
                let base = Url::parse(&url).unwrap_or_else(|_| root.clone());
                for href in html::hrefs(body) {
                    if let Some(link) = scope.resolve(&base, &href) {
                        if seen.insert(link.clone()) {
                            queue.push_back((link, depth + 1));
                        }
                    }
                }
            }

            let mut view = self.view(&url, body, metric);
            let mut page_html = body.to_string();
            let mut rendered = false;

            if self.wants_render(&url, body, &view, metric) {
                let page = self.renderer.render(&url, self.cfg.render_timeout_ms).await;
                if !page.is_empty() {
                    let rview = self.view(&url, &page.html, metric);
                    if rview.lane_score.score > view.lane_score.score {
                        view = rview;
                        page_html = page.html;
                        rendered = true;
                        stats.rendered += 1;
                    }
                }
            }

            if !self.accepts(&url, &view, metric) {
                continue;
            }

            counter!("crawler_hits_total").increment(1);
            debug!(url = %url, score = view.lane_score.score, rendered, "hit");
            hits.push(CrawlHit {
                url: url.clone(),
                title: view.isolated.title,
                main_html: view.isolated.main_html,
                text: view.isolated.text,
                html: page_html,
                class_score: view.lane_score.score,
                classified_as: view.classification.metric,
                why: view.lane_score.why,
                fetched_at: res.fetched_at,
                etag: res.etag.clone(),
                last_modified: res.last_modified.clone(),
                rendered,
                depth,
            });
        }

        hits.sort_by(|a, b| b.class_score.total_cmp(&a.class_score));
        hits.truncate(MAX_HITS);

        info!(
            root = %root,
            lane = %metric,
            fetched = stats.fetched,
            hits = hits.len(),
            "discovery finished"
        );
        Ok(CrawlOutcome {
            hits,
            visited,
            stats,
        })
    }
}
