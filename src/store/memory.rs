// src/store/memory.rs
//! In-process store with JSON snapshots on disk.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use super::FactStore;
use crate::lane::Lane;
use crate::model::{fact_id, source_id, Fact, FactUpsert, Source, UnknownReason, UpdateEvent};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    facts: Vec<Fact>,
    #[serde(default)]
    events: Vec<UpdateEvent>,
    #[serde(default)]
    unknown: Vec<UnknownReason>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sources: RwLock<BTreeMap<String, Source>>,
    facts: RwLock<BTreeMap<String, Fact>>,
    events: RwLock<Vec<UpdateEvent>>,
    unknown: RwLock<Vec<UnknownReason>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot; a missing file yields an empty store.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e).with_context(|| format!("read store snapshot `{}`", path.display())),
        };
        let snap: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parse store snapshot `{}`", path.display()))?;
        Ok(Self {
            sources: RwLock::new(snap.sources.into_iter().map(|s| (s.id.clone(), s)).collect()),
            facts: RwLock::new(snap.facts.into_iter().map(|f| (f.id.clone(), f)).collect()),
            events: RwLock::new(snap.events),
            unknown: RwLock::new(snap.unknown),
        })
    }

    /// Write a snapshot, creating parent directories as needed.
    pub async fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let snap = Snapshot {
            sources: self.sources.read().await.values().cloned().collect(),
            facts: self.facts.read().await.values().cloned().collect(),
            events: self.events.read().await.clone(),
            unknown: self.unknown.read().await.clone(),
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create `{}`", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(&snap).context("serialize store snapshot")?;
        fs::write(path, body)
            .await
            .with_context(|| format!("write store snapshot `{}`", path.display()))?;
        Ok(())
    }

    pub async fn fact_count(&self) -> usize {
        self.facts.read().await.len()
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn save_source(&self, mut source: Source) -> anyhow::Result<String> {
        source.id = source_id(&source.vendor_id, &source.url);
        let id = source.id.clone();
        self.sources.write().await.insert(id.clone(), source);
        Ok(id)
    }

    async fn find_source(&self, vendor_id: &str, url: &str) -> anyhow::Result<Option<Source>> {
        Ok(self.sources.read().await.get(&source_id(vendor_id, url)).cloned())
    }

    async fn list_sources(&self, vendor_id: &str, lane: Option<Lane>) -> anyhow::Result<Vec<Source>> {
        let mut out: Vec<Source> = self
            .sources
            .read()
            .await
            .values()
            .filter(|s| s.vendor_id == vendor_id && lane.map_or(true, |l| s.metric == Some(l)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(out)
    }

    async fn find_fact(
        &self,
        vendor_id: &str,
        metric: Lane,
        subject: &str,
        key: &str,
    ) -> anyhow::Result<Option<Fact>> {
        let id = fact_id(vendor_id, metric, subject, key);
        Ok(self.facts.read().await.get(&id).cloned())
    }

    async fn upsert_fact(&self, f: FactUpsert) -> anyhow::Result<String> {
        let id = fact_id(&f.vendor_id, f.metric, &f.subject, &f.key);
        let now = Utc::now();
        let mut facts = self.facts.write().await;
        let first_seen_at = facts.get(&id).map(|old| old.first_seen_at).unwrap_or(now);
        facts.insert(
            id.clone(),
            Fact {
                id: id.clone(),
                org_id: f.org_id,
                vendor_id: f.vendor_id,
                metric: f.metric,
                subject: f.subject,
                key: f.key,
                value_json: f.value_json,
                text_summary: f.text_summary,
                citations: f.citations,
                confidence: f.confidence,
                first_seen_at,
                last_seen_at: now,
            },
        );
        Ok(id)
    }

    async fn touch_fact(&self, fact_id: &str) -> anyhow::Result<bool> {
        let mut facts = self.facts.write().await;
        match facts.get_mut(fact_id) {
            Some(f) => {
                f.last_seen_at = Utc::now().max(f.last_seen_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn facts_for_vendor(&self, vendor_id: &str, lane: Option<Lane>) -> anyhow::Result<Vec<Fact>> {
        let mut out: Vec<Fact> = self
            .facts
            .read()
            .await
            .values()
            .filter(|f| f.vendor_id == vendor_id && lane.map_or(true, |l| f.metric == l))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.metric, &a.subject, &a.key).cmp(&(b.metric, &b.subject, &b.key))
        });
        Ok(out)
    }

    async fn record_update_event(&self, event: UpdateEvent) -> anyhow::Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn update_events(&self, vendor_id: &str) -> anyhow::Result<Vec<UpdateEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn record_unknown_reason(&self, reason: UnknownReason) -> anyhow::Result<()> {
        self.unknown.write().await.push(reason);
        Ok(())
    }

    async fn unknown_reasons(&self, vendor_id: &str) -> anyhow::Result<Vec<UnknownReason>> {
        Ok(self
            .unknown
            .read()
            .await
            .iter()
            .filter(|r| r.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn source_scores(&self, vendor_id: &str, urls: &[String]) -> anyhow::Result<Vec<(String, f32)>> {
        let sources = self.sources.read().await;
        Ok(urls
            .iter()
            .filter_map(|u| {
                sources
                    .get(&source_id(vendor_id, u))
                    .map(|s| (s.url.clone(), s.source_score))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Citation, Severity, UpdateKind};
    use serde_json::json;

    fn upsert(subject: &str, value: serde_json::Value) -> FactUpsert {
        FactUpsert {
            org_id: "org1".into(),
            vendor_id: "v1".into(),
            metric: Lane::Features,
            subject: subject.into(),
            key: "support".into(),
            value_json: value,
            text_summary: format!("{subject}: native"),
            citations: vec![Citation {
                url: "https://vendor.test/features".into(),
                title: None,
                source_id: None,
            }],
            confidence: 0.9,
        }
    }

    fn source(url: &str, lane: Lane, score: f32) -> Source {
        Source {
            id: String::new(),
            org_id: "org1".into(),
            vendor_id: "v1".into(),
            url: url.into(),
            title: "t".into(),
            body: "b".into(),
            body_hash: crate::model::body_hash("b"),
            first_party: true,
            metric: Some(lane),
            source_score: score,
            structured: false,
            etag: None,
            last_modified: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_identity_and_first_seen() {
        let store = MemoryStore::new();
        let id1 = store.upsert_fact(upsert("sso", json!({"support": "native"}))).await.unwrap();
        let first = store.find_fact("v1", Lane::Features, "sso", "support").await.unwrap().unwrap();
        let id2 = store.upsert_fact(upsert("sso", json!({"support": "limited"}))).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.fact_count().await, 1);
        let second = store.find_fact("v1", Lane::Features, "sso", "support").await.unwrap().unwrap();
        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert!(second.last_seen_at >= first.last_seen_at);
        assert_eq!(second.value_json["support"], "limited");
    }

    #[tokio::test]
    async fn touch_and_filters() {
        let store = MemoryStore::new();
        let id = store.upsert_fact(upsert("scim", json!({}))).await.unwrap();
        assert!(store.touch_fact(&id).await.unwrap());
        assert!(!store.touch_fact("fact_missing").await.unwrap());
        assert_eq!(store.facts_for_vendor("v1", Some(Lane::Features)).await.unwrap().len(), 1);
        assert!(store.facts_for_vendor("v1", Some(Lane::Pricing)).await.unwrap().is_empty());
        assert!(store.facts_for_vendor("v2", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sources_upsert_by_url_and_report_scores() {
        let store = MemoryStore::new();
        let a = store.save_source(source("https://vendor.test/pricing", Lane::Pricing, 0.8)).await.unwrap();
        let b = store.save_source(source("https://vendor.test/pricing", Lane::Pricing, 0.9)).await.unwrap();
        store.save_source(source("https://vendor.test/features", Lane::Features, 0.7)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_sources("v1", None).await.unwrap().len(), 2);
        assert_eq!(store.list_sources("v1", Some(Lane::Pricing)).await.unwrap().len(), 1);
        let scores = store
            .source_scores(
                "v1",
                &["https://vendor.test/pricing".to_string(), "https://other.test/".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(scores, vec![("https://vendor.test/pricing".to_string(), 0.9)]);
    }

    #[tokio::test]
    async fn snapshot_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("facts.json");

        let store = MemoryStore::new();
        store.upsert_fact(upsert("sso", json!({"support": "native"}))).await.unwrap();
        store.save_source(source("https://vendor.test/features", Lane::Features, 0.8)).await.unwrap();
        store
            .record_update_event(UpdateEvent {
                vendor_id: "v1".into(),
                org_id: "org1".into(),
                metric: Lane::Features,
                kind: UpdateKind::Added,
                subject: "sso".into(),
                key: "support".into(),
                old: None,
                new: json!({"support": "native"}),
                severity: Severity::Medium,
                detected_at: Utc::now(),
            })
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let loaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(loaded.fact_count().await, 1);
        assert_eq!(loaded.update_events("v1").await.unwrap().len(), 1);
        assert!(loaded.find_source("v1", "https://vendor.test/features").await.unwrap().is_some());

        let empty = MemoryStore::load(dir.path().join("missing.json")).await.unwrap();
        assert_eq!(empty.fact_count().await, 0);
    }
}
