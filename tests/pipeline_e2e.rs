// tests/pipeline_e2e.rs
//! Full pipeline pass against temp roots: fixture collector in, one
//! published artifact out, persisted state updated.

mod common;

use common::{csv_records, test_config, valid_artifact, BrokenSource, FixedSource};
use std::fs;

use sitesmith::clicklog::NoopClickLogger;
use sitesmith::collect::{CandidateSource, SourceReport, SourceStatus};
use sitesmith::generate::MockGenerator;
use sitesmith::pipeline::run_once;

#[tokio::test]
async fn one_run_publishes_one_artifact_and_updates_state() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());

    let sources: Vec<Box<dyn CandidateSource>> = vec![Box::new(FixedSource {
        records: csv_records(),
    })];
    let generator = MockGenerator::new(vec![valid_artifact()], vec![]);

    let summary = run_once(&cfg, &sources, vec![], &generator, &NoopClickLogger)
        .await
        .unwrap();

    // Published entry with an allocated slug.
    let entry = summary.published.as_ref().expect("published");
    assert!(entry.url.starts_with("https://s.test/pages/"));
    assert_eq!(summary.counts.candidates, 3);
    assert!(summary.counts.clusters >= 2);
    assert!(summary.failures.is_empty());
    assert!(summary.duplicates.is_empty());

    // Artifact on disk at the allocated path.
    let page = cfg.pages_dir().join(&entry.slug).join("index.html");
    let html = fs::read_to_string(&page).unwrap();
    assert!(html.starts_with("<!doctype html"));

    // Inventory is newest-first with our entry, indices regenerated.
    let inventory = fs::read_to_string(cfg.site_root.join("inventory.json")).unwrap();
    assert!(inventory.contains(&entry.slug));
    let sitemap = fs::read_to_string(cfg.site_root.join("sitemap.xml")).unwrap();
    assert!(sitemap.contains(&entry.url));
    assert!(cfg.site_root.join("robots.txt").exists());
    assert!(cfg.site_root.join("index.json").exists());

    // Fingerprint history grew by one.
    let fingerprints = fs::read_to_string(cfg.state_root.join("fingerprints.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&fingerprints).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);

    // Run summary written.
    assert!(cfg.out_root.join("summary_test-run.json").exists());
}

#[tokio::test]
async fn failing_source_degrades_without_aborting_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());

    let sources: Vec<Box<dyn CandidateSource>> = vec![
        Box::new(BrokenSource),
        Box::new(FixedSource {
            records: csv_records(),
        }),
    ];
    let generator = MockGenerator::new(vec![valid_artifact()], vec![]);
    let pre = vec![SourceReport {
        source: "mastodon".to_string(),
        status: SourceStatus::Skipped {
            reason: "no credentials".to_string(),
        },
    }];

    let summary = run_once(&cfg, &sources, pre, &generator, &NoopClickLogger)
        .await
        .unwrap();

    assert!(summary.published.is_some());
    // Diagnostics distinguish failed / collected / skipped.
    let failed = summary
        .sources
        .iter()
        .find(|r| r.source == "broken")
        .unwrap();
    assert!(matches!(failed.status, SourceStatus::Failed { .. }));
    let skipped = summary
        .sources
        .iter()
        .find(|r| r.source == "mastodon")
        .unwrap();
    assert!(matches!(skipped.status, SourceStatus::Skipped { .. }));
}

#[tokio::test]
async fn disabled_generator_ends_with_nothing_published() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());

    let sources: Vec<Box<dyn CandidateSource>> = vec![Box::new(FixedSource {
        records: csv_records(),
    })];
    let generator = sitesmith::generate::DisabledGenerator;

    let summary = run_once(&cfg, &sources, vec![], &generator, &NoopClickLogger)
        .await
        .unwrap();

    assert!(summary.published.is_none());
    assert!(!summary.failures.is_empty());
    // Nothing was committed anywhere.
    assert!(!cfg.site_root.join("inventory.json").exists());
    assert!(!cfg.state_root.join("fingerprints.json").exists());
}
