//! Crawl one vendor site for a lane and print the ranked candidate pages.
//!
//! Usage: `discover <root-url> <lane> [--json]`

use std::sync::Arc;

use anyhow::Context;
use vendor_facts::config::{LaneRegistry, PipelineConfig};
use vendor_facts::crawler::Crawler;
use vendor_facts::fetch::HttpFetcher;
use vendor_facts::{classifier::Classifier, render, Lane};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let (root, lane) = match positional.as_slice() {
        [root, lane] => (root.as_str(), Lane::parse(lane)?),
        _ => anyhow::bail!("usage: discover <root-url> <lane> [--json]"),
    };

    let cfg = Arc::new(PipelineConfig::from_env());
    let registry = Arc::new(LaneRegistry::from_toml()?.compile()?);
    let crawler = Crawler::new(
        Arc::new(HttpFetcher::new(&cfg)?),
        Arc::new(render::from_config(&cfg)?),
        Classifier::new(registry, cfg.classify_threshold),
        cfg.clone(),
    );

    let outcome = crawler
        .discover(root, lane)
        .await
        .with_context(|| format!("discover {root} for {lane}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!(
        "{} hit(s) for {lane} on {root}; fetched={} skipped={} errors={} rendered={}{}",
        outcome.hits.len(),
        outcome.stats.fetched,
        outcome.stats.skipped,
        outcome.stats.errors,
        outcome.stats.rendered,
        if outcome.stats.deadline_hit { " (deadline hit)" } else { "" },
    );
    for (rank, hit) in outcome.hits.iter().enumerate() {
        println!("{:>2}. {:.3}  {}  [depth {}]", rank + 1, hit.class_score, hit.url, hit.depth);
        if !hit.title.is_empty() {
            println!("      title: {}", hit.title);
        }
        if !hit.why.url_hits.is_empty() {
            println!("      url:   {}", hit.why.url_hits.join(", "));
        }
        if !hit.why.text_hits.is_empty() {
            println!("      text:  {}", hit.why.text_hits.join(", "));
        }
    }
    Ok(())
}
