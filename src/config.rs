// src/config.rs
//! One immutable configuration value for the whole pipeline.
//!
//! Loaded once in `main` from `config/pipeline.toml` (path overridable via
//! `SITESMITH_CONFIG_PATH`), with env overrides for the two tunable
//! similarity thresholds. No other module reads the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_CONFIG_PATH: &str = "SITESMITH_CONFIG_PATH";
pub const ENV_CLUSTER_THRESHOLD: &str = "SITESMITH_CLUSTER_THRESHOLD";
pub const ENV_DUPLICATE_THRESHOLD: &str = "SITESMITH_DUPLICATE_THRESHOLD";

/// Raw TOML schema. Every section is optional so a partial file still loads.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    site: SiteSection,
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    collect: CollectSection,
    #[serde(default)]
    generator: GeneratorSection,
}

#[derive(Debug, Clone, Deserialize)]
struct SiteSection {
    #[serde(default = "default_site_root")]
    root: PathBuf,
    #[serde(default = "default_state_root")]
    state_root: PathBuf,
    #[serde(default = "default_out_root")]
    out_root: PathBuf,
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default = "default_hub_url")]
    hub_url: String,
    #[serde(default = "default_affiliates_path")]
    affiliates_path: PathBuf,
    #[serde(default = "default_seed_sites_path")]
    seed_sites_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct PipelineSection {
    #[serde(default = "default_cluster_threshold")]
    cluster_threshold: f64,
    #[serde(default = "default_duplicate_threshold")]
    duplicate_threshold: f64,
    #[serde(default = "default_max_themes")]
    max_themes: usize,
    #[serde(default = "default_max_build_attempts")]
    max_build_attempts: u32,
    #[serde(default = "default_related_links")]
    related_links: usize,
    #[serde(default = "default_affiliate_cap")]
    affiliate_cap: usize,
    #[serde(default = "default_history_cap")]
    history_cap: usize,
    #[serde(default = "default_min_i18n_bindings")]
    min_i18n_bindings: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct CollectSection {
    #[serde(default = "default_queries")]
    queries: Vec<String>,
    #[serde(default = "default_per_query")]
    per_query: usize,
    #[serde(default = "default_total_limit")]
    total_limit: usize,
    /// Mastodon instance base URL; the source is skipped when empty.
    #[serde(default)]
    mastodon_base: String,
    /// "ENV" resolves from MASTODON_ACCESS_TOKEN.
    #[serde(default)]
    mastodon_token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeneratorSection {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_model")]
    model: String,
    /// "ENV" resolves from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    api_key: String,
    #[serde(default)]
    click_endpoint: String,
}

fn default_site_root() -> PathBuf {
    PathBuf::from("site")
}
fn default_state_root() -> PathBuf {
    PathBuf::from("state")
}
fn default_out_root() -> PathBuf {
    PathBuf::from("out")
}
fn default_base_url() -> String {
    "https://sitesmith.example".to_string()
}
fn default_hub_url() -> String {
    "https://sitesmith.example/hub/".to_string()
}
fn default_affiliates_path() -> PathBuf {
    PathBuf::from("config/affiliates.json")
}
fn default_seed_sites_path() -> PathBuf {
    PathBuf::from("config/seed_sites.json")
}
fn default_cluster_threshold() -> f64 {
    0.22
}
fn default_duplicate_threshold() -> f64 {
    0.80
}
fn default_max_themes() -> usize {
    3
}
fn default_max_build_attempts() -> u32 {
    5
}
fn default_related_links() -> usize {
    8
}
fn default_affiliate_cap() -> usize {
    2
}
fn default_history_cap() -> usize {
    500
}
fn default_min_i18n_bindings() -> usize {
    8
}
fn default_queries() -> Vec<String> {
    [
        "how do i",
        "is there a tool",
        "convert",
        "calculator",
        "template",
        "timezone",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_per_query() -> usize {
    15
}
fn default_total_limit() -> usize {
    120
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            root: default_site_root(),
            state_root: default_state_root(),
            out_root: default_out_root(),
            base_url: default_base_url(),
            hub_url: default_hub_url(),
            affiliates_path: default_affiliates_path(),
            seed_sites_path: default_seed_sites_path(),
        }
    }
}
impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            cluster_threshold: default_cluster_threshold(),
            duplicate_threshold: default_duplicate_threshold(),
            max_themes: default_max_themes(),
            max_build_attempts: default_max_build_attempts(),
            related_links: default_related_links(),
            affiliate_cap: default_affiliate_cap(),
            history_cap: default_history_cap(),
            min_i18n_bindings: default_min_i18n_bindings(),
        }
    }
}
impl Default for CollectSection {
    fn default() -> Self {
        Self {
            queries: default_queries(),
            per_query: default_per_query(),
            total_limit: default_total_limit(),
            mastodon_base: String::new(),
            mastodon_token: String::new(),
        }
    }
}
impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            enabled: false,
            model: default_model(),
            api_key: default_api_key(),
            click_endpoint: String::new(),
        }
    }
}

/// Credentials for the Mastodon collector. Absent when not configured.
#[derive(Debug, Clone)]
pub struct MastodonAuth {
    pub base_url: String,
    pub token: String,
}

/// Generator wiring. `api_key == None` means the generator stays disabled.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub click_endpoint: Option<String>,
}

/// The one immutable configuration object passed to every component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub site_root: PathBuf,
    pub state_root: PathBuf,
    pub out_root: PathBuf,
    pub base_url: String,
    pub hub_url: String,
    pub affiliates_path: PathBuf,
    pub seed_sites_path: PathBuf,
    pub run_id: String,

    pub cluster_threshold: f64,
    pub duplicate_threshold: f64,
    pub max_themes: usize,
    pub max_build_attempts: u32,
    pub related_links: usize,
    pub affiliate_cap: usize,
    pub history_cap: usize,
    pub min_i18n_bindings: usize,

    pub queries: Vec<String>,
    pub per_query: usize,
    pub total_limit: usize,
    pub mastodon: Option<MastodonAuth>,

    pub generator: GeneratorConfig,
}

impl PipelineConfig {
    /// Resolve the config path, read the file if present, apply env overrides.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let file = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config at {}", path.display()))?
        } else {
            ConfigFile::default()
        };
        Self::from_file(file)
    }

    /// Same as `load` but from an explicit path (used by tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let ConfigFile {
            site,
            pipeline,
            collect,
            generator,
        } = file;

        let cluster_threshold = parse_threshold_env(std::env::var(ENV_CLUSTER_THRESHOLD).ok())
            .unwrap_or(pipeline.cluster_threshold)
            .clamp(0.0, 1.0);
        let duplicate_threshold = parse_threshold_env(std::env::var(ENV_DUPLICATE_THRESHOLD).ok())
            .unwrap_or(pipeline.duplicate_threshold)
            .clamp(0.0, 1.0);

        let mastodon = if collect.mastodon_base.trim().is_empty() {
            None
        } else {
            resolve_secret(&collect.mastodon_token, "MASTODON_ACCESS_TOKEN").map(|token| {
                MastodonAuth {
                    base_url: collect.mastodon_base.trim_end_matches('/').to_string(),
                    token,
                }
            })
        };

        let api_key = if generator.enabled {
            resolve_secret(&generator.api_key, "OPENAI_API_KEY")
        } else {
            None
        };

        let run_id = std::env::var("SITESMITH_RUN_ID")
            .unwrap_or_else(|_| chrono::Utc::now().timestamp().to_string());

        Ok(Self {
            site_root: site.root,
            state_root: site.state_root,
            out_root: site.out_root,
            base_url: site.base_url.trim_end_matches('/').to_string(),
            hub_url: site.hub_url,
            affiliates_path: site.affiliates_path,
            seed_sites_path: site.seed_sites_path,
            run_id,
            cluster_threshold,
            duplicate_threshold,
            max_themes: pipeline.max_themes.max(1),
            max_build_attempts: pipeline.max_build_attempts.max(1),
            related_links: pipeline.related_links,
            affiliate_cap: pipeline.affiliate_cap,
            history_cap: pipeline.history_cap.max(1),
            min_i18n_bindings: pipeline.min_i18n_bindings,
            queries: collect.queries,
            per_query: collect.per_query.max(1),
            total_limit: collect.total_limit.max(1),
            mastodon,
            generator: GeneratorConfig {
                model: generator.model,
                api_key,
                click_endpoint: if generator.click_endpoint.trim().is_empty() {
                    None
                } else {
                    Some(generator.click_endpoint)
                },
            },
        })
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.site_root.join("pages")
    }
}

/// Parse an optional float env value and clamp to <0.0..=1.0>.
fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

/// "ENV" (case-insensitive) reads the named variable; any other non-empty
/// string is taken literally; empty yields None.
fn resolve_secret(configured: &str, env_name: &str) -> Option<String> {
    let c = configured.trim();
    if c.is_empty() || c.eq_ignore_ascii_case("env") {
        std::env::var(env_name).ok().filter(|v| !v.trim().is_empty())
    } else {
        Some(c.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn defaults_apply_on_empty_file() {
        let cfg = PipelineConfig::from_file(ConfigFile::default()).unwrap();
        assert!((cfg.cluster_threshold - 0.22).abs() < 1e-9);
        assert!((cfg.duplicate_threshold - 0.80).abs() < 1e-9);
        assert_eq!(cfg.max_build_attempts, 5);
        assert_eq!(cfg.related_links, 8);
        assert!(cfg.mastodon.is_none());
        assert!(cfg.generator.api_key.is_none());
    }

    #[serial_test::serial]
    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let file: ConfigFile = toml::from_str(
            r#"
            [pipeline]
            cluster_threshold = 0.35
            max_themes = 5
            "#,
        )
        .unwrap();
        let cfg = PipelineConfig::from_file(file).unwrap();
        assert!((cfg.cluster_threshold - 0.35).abs() < 1e-9);
        assert_eq!(cfg.max_themes, 5);
        assert!((cfg.duplicate_threshold - 0.80).abs() < 1e-9);
    }

    #[serial_test::serial]
    #[test]
    fn env_override_wins_and_is_clamped() {
        std::env::set_var(ENV_CLUSTER_THRESHOLD, "1.7");
        let cfg = PipelineConfig::from_file(ConfigFile::default()).unwrap();
        std::env::remove_var(ENV_CLUSTER_THRESHOLD);
        assert!((cfg.cluster_threshold - 1.0).abs() < 1e-9);
    }

    #[test]
    fn literal_secret_is_kept() {
        assert_eq!(
            resolve_secret("abc123", "UNSET_VAR_FOR_TEST"),
            Some("abc123".to_string())
        );
    }
}
