//! Out-of-band affiliate priority refresh: pull click counts from the
//! configured stats endpoint and fold them into the catalog priorities.
//! Never runs as part of the publish pipeline.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sitesmith::affiliate::{refresh_priorities, AffiliateCatalog};
use sitesmith::config::PipelineConfig;

#[derive(serde::Deserialize)]
struct StatsResponse {
    #[serde(default)]
    by_sponsor_id: HashMap<String, u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitesmith=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();

    let cfg = PipelineConfig::load()?;
    let Some(endpoint) = cfg.generator.click_endpoint.as_deref() else {
        bail!("no click endpoint configured; nothing to refresh");
    };

    let client = reqwest::Client::builder()
        .user_agent("sitesmith/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(20))
        .build()?;
    let stats: StatsResponse = client
        .get(format!("{}/stats", endpoint.trim_end_matches('/')))
        .send()
        .await
        .context("stats request failed")?
        .error_for_status()
        .context("stats request returned error status")?
        .json()
        .await
        .context("parsing stats response")?;
    info!(sponsors = stats.by_sponsor_id.len(), "fetched click stats");

    let mut catalog = AffiliateCatalog::load(&cfg.affiliates_path)?;
    if refresh_priorities(&mut catalog, &stats.by_sponsor_id) {
        catalog.save(&cfg.affiliates_path)?;
        info!("affiliate priorities updated");
    } else {
        info!("no priority changes");
    }
    Ok(())
}
