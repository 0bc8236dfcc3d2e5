// tests/build_failover.rs
//! Build exhaustion on the best theme falls through to the next-best theme,
//! leaves the reserved slug unconsumed, and emits a full diagnostic.

mod common;

use common::{record, test_config, valid_artifact, FixedSource};
use std::fs;

use sitesmith::clicklog::NoopClickLogger;
use sitesmith::collect::CandidateSource;
use sitesmith::generate::MockGenerator;
use sitesmith::pipeline::run_once;

#[tokio::test]
async fn exhausted_best_theme_falls_through_to_next_best() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());

    // Bigger pdf cluster ranks first; smaller csv cluster is the fallback.
    let sources: Vec<Box<dyn CandidateSource>> = vec![Box::new(FixedSource {
        records: vec![
            record("merge pdf files without uploading them", "https://posts.test/p1", 10),
            record("merge pdf files offline on linux", "https://posts.test/p2", 20),
            record("tool to merge pdf files in bulk", "https://posts.test/p3", 30),
            record("convert csv to json quickly", "https://posts.test/c1", 40),
            record("convert csv into json with headers", "https://posts.test/c2", 50),
        ],
    })];

    // Theme 1 never validates: every draft is missing the sponsor marker
    // and every patch is garbage, so 5 attempts burn down. Theme 2 is fine.
    let broken = valid_artifact().replace("<!-- AFF_SLOT -->", "");
    let generator = MockGenerator::new(
        vec![
            broken.clone(),
            broken.clone(),
            broken.clone(),
            broken.clone(),
            broken,
            valid_artifact(),
        ],
        vec!["garbage".to_string(); 4],
    );

    let summary = run_once(&cfg, &sources, vec![], &generator, &NoopClickLogger)
        .await
        .unwrap();

    // The failed theme is terminal for itself only.
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].attempts, 5);
    assert_eq!(summary.failures[0].reason, "missing sponsor placeholder marker");
    assert!(summary.failures[0].theme_title.contains("pdf"));

    // The next-best theme published instead.
    let entry = summary.published.expect("fallback theme published");
    assert!(entry.tags.contains(&"csv".to_string()));

    // The failed theme's slug was never consumed.
    let pages: Vec<String> = fs::read_dir(cfg.pages_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(pages, vec![entry.slug.clone()]);

    // Diagnostic with theme, breakdown, sources, and the final reason.
    let diag: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(cfg.out_root.join("build_failure_test-run.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(diag["failure_reason"], "missing sponsor placeholder marker");
    assert_eq!(diag["sources"][0], "fixed");
    let categories: Vec<&str> = diag["score_breakdown"]["contributions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["category"].as_str().unwrap())
        .collect();
    assert!(categories.contains(&"duplicate_penalty"));
    assert!(categories.contains(&"tool_request"));
}
