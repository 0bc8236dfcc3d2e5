//! Batch entrypoint: wire sources, generator, and click logging from the
//! one immutable configuration, run a single pipeline pass, exit.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitesmith::clicklog::{ClickLogger, HttpClickLogger, NoopClickLogger};
use sitesmith::collect::providers::hackernews::HackerNewsSource;
use sitesmith::collect::providers::mastodon::MastodonSource;
use sitesmith::collect::{CandidateSource, SourceReport, SourceStatus};
use sitesmith::config::PipelineConfig;
use sitesmith::generate::{DisabledGenerator, Generator, HttpGenerator};
use sitesmith::pipeline::run_once;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitesmith=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op elsewhere. The config loader is the
    // only place the environment is read.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load()?;
    info!(run_id = %cfg.run_id, "starting pipeline run");

    let mut sources: Vec<Box<dyn CandidateSource>> = vec![Box::new(HackerNewsSource::new(
        cfg.queries.clone(),
        cfg.per_query,
    ))];
    let mut pre_reports: Vec<SourceReport> = Vec::new();
    match &cfg.mastodon {
        Some(auth) => sources.push(Box::new(MastodonSource::new(
            auth.clone(),
            cfg.queries.clone(),
            cfg.per_query,
        ))),
        None => pre_reports.push(SourceReport {
            source: "mastodon".to_string(),
            status: SourceStatus::Skipped {
                reason: "no credentials".to_string(),
            },
        }),
    }

    let generator: Box<dyn Generator> = match &cfg.generator.api_key {
        Some(key) => Box::new(HttpGenerator::new(key.clone(), cfg.generator.model.clone())),
        None => {
            warn!("no generator key configured; this run cannot publish");
            Box::new(DisabledGenerator)
        }
    };

    let clicklog: Box<dyn ClickLogger> = match &cfg.generator.click_endpoint {
        Some(endpoint) => Box::new(HttpClickLogger::new(endpoint.clone())),
        None => Box::new(NoopClickLogger),
    };

    let summary = run_once(&cfg, &sources, pre_reports, generator.as_ref(), clicklog.as_ref()).await?;

    match &summary.published {
        Some(entry) => info!(url = %entry.url, "published"),
        None => warn!(failures = summary.failures.len(), "nothing published this run"),
    }
    Ok(())
}
