// Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;

use sitesmith::collect::{CandidateSource, RawRecord};
use sitesmith::config::{GeneratorConfig, PipelineConfig};

pub const HUB_URL: &str = "https://s.test/hub/";

/// Smallest artifact that satisfies the full structural contract.
pub fn valid_artifact() -> String {
    let bindings = (0..8)
        .map(|i| format!(r#"<span data-i18n="k{i}">t</span>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<!doctype html>\n<html>\n<head><title>t</title></head>\n<body>\n\
         <main>\n{bindings}\n\
         <select id=\"langSel\"></select>\n\
         <a href=\"{HUB_URL}\">All tools</a>\n\
         <!-- AFF_SLOT -->\n\
         <script>window.__RELATED__ = []</script>\n\
         </main>\n\
         <footer>\n\
         <a href=\"/policies/privacy.html\">p</a>\n\
         <a href=\"/policies/terms.html\">t</a>\n\
         <a href=\"/policies/disclaimer.html\">d</a>\n\
         <a href=\"/policies/about.html\">a</a>\n\
         <a href=\"/policies/contact.html\">c</a>\n\
         </footer>\n</body>\n</html>"
    )
}

/// Pipeline config rooted in a temp dir; no network-capable collaborators.
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        site_root: root.join("site"),
        state_root: root.join("state"),
        out_root: root.join("out"),
        base_url: "https://s.test".to_string(),
        hub_url: HUB_URL.to_string(),
        affiliates_path: root.join("affiliates.json"),
        seed_sites_path: root.join("seed_sites.json"),
        run_id: "test-run".to_string(),
        cluster_threshold: 0.22,
        duplicate_threshold: 0.80,
        max_themes: 3,
        max_build_attempts: 5,
        related_links: 8,
        affiliate_cap: 2,
        history_cap: 500,
        min_i18n_bindings: 8,
        queries: vec![],
        per_query: 15,
        total_limit: 120,
        mastodon: None,
        generator: GeneratorConfig {
            model: "test-model".to_string(),
            api_key: None,
            click_endpoint: None,
        },
    }
}

/// In-memory source yielding fixed records.
pub struct FixedSource {
    pub records: Vec<RawRecord>,
}

#[async_trait::async_trait]
impl CandidateSource for FixedSource {
    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Source that always errors; the run must degrade, not abort.
pub struct BrokenSource;

#[async_trait::async_trait]
impl CandidateSource for BrokenSource {
    async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
        anyhow::bail!("simulated network failure")
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn record(text: &str, url: &str, ts: i64) -> RawRecord {
    RawRecord {
        text: Some(text.to_string()),
        url: Some(url.to_string()),
        source: "fixed".to_string(),
        timestamp: Some(ts),
        engagement: Some(5),
    }
}

/// Two candidates that cluster together on csv/json tokens plus one loner.
pub fn csv_records() -> Vec<RawRecord> {
    vec![
        record(
            "how do I convert csv to json for free",
            "https://posts.test/1",
            100,
        ),
        record(
            "is there a free tool to convert csv into json",
            "https://posts.test/2",
            200,
        ),
        record(
            "best hiking trails near denver this weekend",
            "https://posts.test/3",
            300,
        ),
    ]
}
