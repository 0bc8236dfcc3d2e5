// src/pipeline.rs
//! One-run orchestration: collect -> cluster -> select -> build -> publish,
//! strictly sequential, with per-stage counters and a run summary on disk.
//! Nothing durable is touched before the artifact commit point.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::build::validate::Contract;
use crate::build::{run_build_loop, BuildOutcome};
use crate::clicklog::{ClickEvent, ClickLogger};
use crate::cluster::cluster_candidates;
use crate::collect::{collect_all, CandidateSource, SourceReport};
use crate::config::PipelineConfig;
use crate::fingerprint::{anon_hash, DuplicateKind, FingerprintStore};
use crate::generate::{BuildRequest, Generator};
use crate::publish::{
    write_failure_diagnostic, BuildFailureDiagnostic, Inventory, Publisher, ToolEntry,
};
use crate::related::{inject_related, load_seed_catalog, select_related};
use crate::scoring::{score_text, ScoreBreakdown};
use crate::slug::SlugAllocator;
use crate::theme::{select_themes, Theme};
use crate::affiliate;

/// One-time metric registration so series are described wherever a recorder
/// is installed.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_source_errors_total", "Collector fetch/parse errors.");
        describe_counter!("pipeline_candidates_total", "Candidates kept after normalization.");
        describe_counter!("pipeline_clusters_total", "Clusters formed per run.");
        describe_counter!("pipeline_duplicates_total", "Themes flagged as duplicates.");
        describe_counter!("build_attempts_total", "Validation rounds across build loops.");
        describe_counter!("build_exhausted_total", "Build loops that ran out of attempts.");
        describe_counter!("publish_total", "Artifacts committed.");
        describe_counter!("publish_index_errors_total", "Post-commit index write failures.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts of the last pipeline run.");
    });
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCounts {
    pub candidates: usize,
    pub dropped: usize,
    pub clusters: usize,
    pub themes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeFailure {
    pub theme_title: String,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateNote {
    pub theme_title: String,
    pub competing_fingerprint: String,
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: String,
    pub counts: RunCounts,
    pub sources: Vec<SourceReport>,
    pub published: Option<ToolEntry>,
    pub failures: Vec<ThemeFailure>,
    pub duplicates: Vec<DuplicateNote>,
}

/// A ranked theme plus the observability that justified its rank.
struct RankedTheme {
    theme: Theme,
    breakdown: ScoreBreakdown,
    rank_score: i32,
}

fn rank_themes(themes: Vec<Theme>, store: &FingerprintStore, cfg: &PipelineConfig) -> (Vec<RankedTheme>, Vec<DuplicateNote>) {
    let mut duplicates = Vec::new();
    let mut ranked: Vec<RankedTheme> = themes
        .into_iter()
        .map(|theme| {
            let tags = theme_tags(&theme);
            let dup = store.check_duplicate(&theme.title, &tags, cfg.duplicate_threshold);
            if let Some(m) = &dup {
                counter!("pipeline_duplicates_total").increment(1);
                let similarity = match m.kind {
                    DuplicateKind::Exact => None,
                    DuplicateKind::Similar(s) => Some(s),
                };
                // Policy outcome, not an error; logged with the competitor.
                info!(
                    theme = %anon_hash(&theme.title),
                    competing = %m.competing,
                    ?similarity,
                    "duplicate theme de-prioritized"
                );
                duplicates.push(DuplicateNote {
                    theme_title: theme.title.clone(),
                    competing_fingerprint: m.competing.clone(),
                    similarity,
                });
            }

            let aggregated: String = theme
                .representative_candidates
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let engagement = theme
                .representative_candidates
                .iter()
                .filter_map(|c| c.engagement)
                .max();
            let breakdown = score_text(&aggregated, engagement, dup.is_some());
            let rank_score = theme.score + breakdown.total();
            RankedTheme {
                theme,
                breakdown,
                rank_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.rank_score.cmp(&a.rank_score));
    (ranked, duplicates)
}

fn theme_tags(theme: &Theme) -> Vec<String> {
    theme.keywords.iter().take(8).cloned().collect()
}

/// Execute one full run. `pre_reports` carries sources the caller decided to
/// skip (e.g. missing credentials) so diagnostics distinguish "skipped"
/// from "failed" and "zero results".
pub async fn run_once(
    cfg: &PipelineConfig,
    sources: &[Box<dyn CandidateSource>],
    pre_reports: Vec<SourceReport>,
    generator: &dyn Generator,
    clicklog: &dyn ClickLogger,
) -> Result<RunSummary> {
    ensure_metrics_described();
    gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    // 1) Collect + normalize. Per-source failures already degraded inside.
    let (candidates, dropped, mut reports) = collect_all(sources, cfg.total_limit).await;
    reports.extend(pre_reports);
    counter!("pipeline_candidates_total").increment(candidates.len() as u64);
    info!(candidates = candidates.len(), dropped, "collection finished");

    // 2) Cluster + select themes.
    let clusters = cluster_candidates(&candidates, cfg.cluster_threshold);
    counter!("pipeline_clusters_total").increment(clusters.len() as u64);
    let themes = select_themes(&clusters, &candidates, cfg.max_themes);
    info!(clusters = clusters.len(), themes = themes.len(), "theme selection finished");

    // 3) Shared persisted state.
    let mut store = FingerprintStore::load(
        &cfg.state_root.join("fingerprints.json"),
        cfg.history_cap,
    )?;
    let publisher = Publisher::new(&cfg.site_root, &cfg.base_url);
    let inventory = Inventory::load(&publisher.inventory_path())?;
    let seeds = load_seed_catalog(&cfg.seed_sites_path)?;
    let affiliates = affiliate::AffiliateCatalog::load(&cfg.affiliates_path)?;

    let (ranked, duplicates) = rank_themes(themes, &store, cfg);

    // 4) Build the best theme; fall through to the next-best on exhaustion.
    let allocator = SlugAllocator::new(&cfg.pages_dir());
    let contract = Contract {
        hub_url: cfg.hub_url.clone(),
        min_i18n_bindings: cfg.min_i18n_bindings,
    };
    let mut failures: Vec<ThemeFailure> = Vec::new();
    let mut published: Option<ToolEntry> = None;

    for ranked_theme in &ranked {
        let theme = &ranked_theme.theme;
        let allocated = allocator.allocate(&theme.slug)?;
        let canonical = publisher.page_url(&allocated.slug);
        let req = BuildRequest::from_theme(theme, &canonical, &cfg.hub_url);

        match run_build_loop(generator, &req, &contract, cfg.max_build_attempts).await {
            BuildOutcome::Published { artifact, attempts } => {
                info!(slug = %allocated.slug, attempts, "artifact built");

                let tags = theme_tags(theme);
                let related = select_related(
                    &tags,
                    &canonical,
                    &inventory.catalog_entries(),
                    &seeds,
                    cfg.related_links,
                );
                let mut artifact = inject_related(&artifact, &related);

                let artifact_id = anon_hash(&canonical);
                let sponsors = affiliates.select(&theme.category, cfg.affiliate_cap);
                artifact = affiliate::inject_affiliates(
                    &artifact,
                    &sponsors,
                    &artifact_id,
                    cfg.generator.click_endpoint.as_deref(),
                );

                let entry = ToolEntry {
                    id: artifact_id.clone(),
                    title: theme.title.clone(),
                    slug: allocated.slug.clone(),
                    category: theme.category.clone(),
                    tags: tags.clone(),
                    url: canonical.clone(),
                    created_at: chrono::Utc::now().to_rfc3339(),
                    score: ranked_theme.rank_score,
                    related: related.iter().map(|l| l.url.clone()).collect(),
                };
                publisher.publish(&allocated.dir, &artifact, entry.clone())?;

                // Fingerprint history grows only after the artifact commit.
                store.append(&theme.title, &tags)?;

                for sponsor in &sponsors {
                    clicklog
                        .post(&ClickEvent {
                            sponsor_id: sponsor.id.clone(),
                            artifact_id: artifact_id.clone(),
                        })
                        .await;
                }

                published = Some(entry);
                break;
            }
            BuildOutcome::Failed { reason, attempts } => {
                warn!(
                    theme = %anon_hash(&theme.title),
                    %reason,
                    attempts,
                    "build exhausted; slug left unconsumed"
                );
                let mut src: Vec<String> = theme
                    .representative_candidates
                    .iter()
                    .map(|c| c.source.clone())
                    .collect();
                src.sort();
                src.dedup();
                let diag = BuildFailureDiagnostic {
                    run_id: cfg.run_id.clone(),
                    theme_title: theme.title.clone(),
                    category: theme.category.clone(),
                    keywords: theme.keywords.clone(),
                    score_breakdown: ranked_theme.breakdown.clone(),
                    sources: src,
                    failure_reason: reason.clone(),
                    attempts,
                };
                write_failure_diagnostic(&cfg.out_root, &diag)?;
                failures.push(ThemeFailure {
                    theme_title: theme.title.clone(),
                    reason,
                    attempts,
                });
            }
        }
    }

    // 5) Run summary, always.
    let summary = RunSummary {
        run_id: cfg.run_id.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        counts: RunCounts {
            candidates: candidates.len(),
            dropped,
            clusters: clusters.len(),
            themes: ranked.len(),
        },
        sources: reports,
        published,
        failures,
        duplicates,
    };
    let summary_path = cfg.out_root.join(format!("summary_{}.json", cfg.run_id));
    crate::publish::write_atomic(&summary_path, &serde_json::to_string_pretty(&summary)?)
        .context("writing run summary")?;
    info!(path = %summary_path.display(), published = summary.published.is_some(), "run finished");

    Ok(summary)
}
