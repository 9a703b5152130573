// tests/config_env.rs
//
// Environment-driven configuration. These tests mutate process env, so they
// run serially.

use std::io::Write as _;

use serial_test::serial;
use vendor_facts::config::{LaneRegistry, PipelineConfig};
use vendor_facts::Lane;

const KEYS: &[&str] = &[
    "FACTS_FETCH_TIMEOUT_SECS",
    "FACTS_FETCH_RETRIES",
    "FACTS_PUBLISH_THRESHOLD",
    "FACTS_HEADLESS_ENABLED",
    "FACTS_RUN_COOLDOWN_SECS",
    "FACTS_CRAWL_DEADLINE_SECS",
    "BROWSERLESS_URL",
    "BROWSERLESS_TOKEN",
    "LANES_CONFIG_PATH",
];

fn clear_env() {
    for k in KEYS {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn env_overrides_layer_on_defaults() {
    clear_env();
    let base = PipelineConfig::from_env();
    assert_eq!(base.run_cooldown_secs, 600);
    assert!(!base.headless_enabled);
    assert!(base.browserless_url.is_none());

    std::env::set_var("FACTS_PUBLISH_THRESHOLD", "0.8");
    std::env::set_var("FACTS_HEADLESS_ENABLED", "yes");
    std::env::set_var("FACTS_RUN_COOLDOWN_SECS", "0");
    std::env::set_var("FACTS_FETCH_RETRIES", "99");
    std::env::set_var("BROWSERLESS_URL", "http://localhost:3000");
    let cfg = PipelineConfig::from_env();
    assert!((cfg.publish_threshold - 0.8).abs() < 1e-6);
    assert!(cfg.headless_enabled);
    assert_eq!(cfg.run_cooldown_secs, 0);
    assert_eq!(cfg.fetch_retries, 10);
    assert_eq!(cfg.browserless_url.as_deref(), Some("http://localhost:3000"));
    clear_env();
}

#[test]
#[serial]
fn garbage_values_are_ignored() {
    clear_env();
    std::env::set_var("FACTS_PUBLISH_THRESHOLD", "lots");
    std::env::set_var("FACTS_FETCH_TIMEOUT_SECS", "0");
    std::env::set_var("FACTS_HEADLESS_ENABLED", "maybe");
    let cfg = PipelineConfig::from_env();
    let def = PipelineConfig::default();
    assert_eq!(cfg.publish_threshold, def.publish_threshold);
    assert_eq!(cfg.fetch_timeout_secs, def.fetch_timeout_secs);
    assert!(!cfg.headless_enabled);
    clear_env();
}

#[test]
#[serial]
fn lanes_file_overrides_one_lane() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[lanes.pricing]
url_patterns = ['(?i)/tarifs(?:[/?#.-]|$)']
content_signals = ["tarif", "par mois"]
weight = 0.9
"#
    )
    .unwrap();
    std::env::set_var("LANES_CONFIG_PATH", file.path());

    let reg = LaneRegistry::from_toml().unwrap();
    let pricing = reg.spec(Lane::Pricing).unwrap();
    assert_eq!(pricing.content_signals, vec!["tarif", "par mois"]);
    assert_eq!(pricing.min_items, 1);
    assert!(pricing.render_hints.is_empty());
    // untouched lanes keep the built-in table
    assert!(reg.spec(Lane::Security).unwrap().content_signals.iter().any(|s| s == "soc2"));

    let compiled = reg.compile().unwrap();
    assert!(compiled.lane(Lane::Pricing).url_matches("https://acme.test/tarifs"));
    assert!(!compiled.lane(Lane::Pricing).url_matches("https://acme.test/pricing"));
    clear_env();
}

#[test]
#[serial]
fn missing_lanes_file_means_builtin_and_bad_regex_fails() {
    clear_env();
    std::env::set_var("LANES_CONFIG_PATH", "/definitely/not/here/lanes.toml");
    let reg = LaneRegistry::from_toml().unwrap();
    assert!(reg.compile().is_ok());

    let broken = LaneRegistry::from_toml_str(
        r#"
[lanes.features]
url_patterns = ["(unclosed"]
content_signals = []
weight = 0.5
"#,
    )
    .unwrap();
    let err = broken.compile().unwrap_err().to_string();
    assert!(err.contains("features"), "{err}");
    assert!(LaneRegistry::from_toml_str("[lanes.weather]\nurl_patterns=[]\ncontent_signals=[]\nweight=1.0").is_err());
    clear_env();
}
