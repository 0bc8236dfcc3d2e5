// src/affiliate.rs
//! Sponsor snippets: category-scoped selection, hard sanitization, and
//! injection into the reserved artifact slot. Priorities are mutated only
//! by the out-of-band click-feedback operation, never by the build path.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::build::validate::SPONSOR_MARKER;

pub const REQUIRED_REL_TOKENS: &[&str] = &["nofollow", "sponsored", "noopener"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffiliateItem {
    pub id: String,
    pub title: String,
    pub html: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    50
}

/// category -> sponsor candidates. Accepts either a bare map or a
/// `{"categories": {...}}` wrapper on disk.
#[derive(Debug, Clone, Default)]
pub struct AffiliateCatalog {
    pub categories: HashMap<String, Vec<AffiliateItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped {
        categories: HashMap<String, Vec<AffiliateItem>>,
    },
    Bare(HashMap<String, Vec<AffiliateItem>>),
}

impl AffiliateCatalog {
    /// Missing file means an empty catalog, not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading affiliate catalog at {}", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing affiliate catalog at {}", path.display()))?;
        let categories = match file {
            CatalogFile::Wrapped { categories } => categories,
            CatalogFile::Bare(categories) => categories,
        };
        Ok(Self { categories })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.categories)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    /// Candidates for a category: executable snippets rejected outright,
    /// survivors hardened and sorted by priority weight descending, capped.
    pub fn select(&self, category: &str, cap: usize) -> Vec<AffiliateItem> {
        let Some(items) = self.categories.get(category) else {
            return Vec::new();
        };
        let mut picked: Vec<AffiliateItem> = items
            .iter()
            .filter(|i| !contains_script_tag(&i.html))
            .cloned()
            .map(|mut i| {
                i.html = sanitize_anchors(&i.html);
                i
            })
            .collect();
        picked.sort_by(|a, b| b.priority.cmp(&a.priority));
        picked.truncate(cap);
        picked
    }
}

static RE_SCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<\s*script\b").unwrap());
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>").unwrap());
static RE_REL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\srel\s*=\s*("[^"]*"|'[^']*')"#).unwrap());
static RE_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\starget\s*=\s*("[^"]*"|'[^']*')"#).unwrap());

/// Any embedded executable-script tag disqualifies a snippet entirely.
pub fn contains_script_tag(html: &str) -> bool {
    RE_SCRIPT.is_match(html)
}

/// Normalize every anchor: force `target="_blank"` and merge any existing
/// rel tokens with the required safety set. Merge, never overwrite.
pub fn sanitize_anchors(html: &str) -> String {
    RE_ANCHOR
        .replace_all(html, |caps: &regex::Captures<'_>| {
            let attrs = &caps[1];

            let mut tokens: Vec<String> = RE_REL
                .captures(attrs)
                .map(|rel| {
                    rel[1]
                        .trim_matches(['"', '\''])
                        .split_whitespace()
                        .map(|t| t.to_lowercase())
                        .collect()
                })
                .unwrap_or_default();
            for required in REQUIRED_REL_TOKENS {
                if !tokens.iter().any(|t| t == required) {
                    tokens.push(required.to_string());
                }
            }

            let mut rest = RE_REL.replace_all(attrs, "").to_string();
            rest = RE_TARGET.replace_all(&rest, "").to_string();
            let rest = rest.trim();

            if rest.is_empty() {
                format!(r#"<a target="_blank" rel="{}">"#, tokens.join(" "))
            } else {
                format!(r#"<a {} target="_blank" rel="{}">"#, rest, tokens.join(" "))
            }
        })
        .to_string()
}

/// Render the chosen sponsors as slot blocks keyed for click tracking.
fn render_blocks(items: &[AffiliateItem], artifact_id: &str) -> String {
    let mut out = String::new();
    for item in items {
        out.push_str(&format!(
            "<div class=\"sponsor\" data-sponsor-id=\"{}\" data-artifact-id=\"{}\">\n<div class=\"sponsor-title\">{}</div>\n{}\n</div>\n",
            html_escape::encode_double_quoted_attribute(&item.id),
            html_escape::encode_double_quoted_attribute(artifact_id),
            html_escape::encode_text(&item.title),
            item.html
        ));
    }
    out
}

/// Best-effort, non-blocking click hook: sendBeacon keyed by sponsor id and
/// artifact id. Only emitted when an endpoint is configured.
fn click_hook_script(endpoint: &str) -> String {
    format!(
        "<script>\ndocument.querySelectorAll('[data-sponsor-id]').forEach(function(el){{\n  el.addEventListener('click', function(){{\n    try {{ navigator.sendBeacon('{}', JSON.stringify({{sponsor_id: el.dataset.sponsorId, artifact_id: el.dataset.artifactId}})); }} catch (e) {{}}\n  }});\n}});\n</script>\n",
        endpoint
    )
}

/// Inject sponsor blocks at the reserved marker, else immediately after the
/// primary content container's opening tag.
pub fn inject_affiliates(
    artifact: &str,
    items: &[AffiliateItem],
    artifact_id: &str,
    click_endpoint: Option<&str>,
) -> String {
    if items.is_empty() {
        return artifact.to_string();
    }
    let mut blocks = render_blocks(items, artifact_id);
    if let Some(endpoint) = click_endpoint {
        blocks.push_str(&click_hook_script(endpoint));
    }

    let marker = format!("<!-- {SPONSOR_MARKER} -->");
    if let Some(pos) = artifact.find(&marker) {
        let mut out = String::with_capacity(artifact.len() + blocks.len());
        out.push_str(&artifact[..pos + marker.len()]);
        out.push('\n');
        out.push_str(&blocks);
        out.push_str(&artifact[pos + marker.len()..]);
        return out;
    }

    static RE_MAIN_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<main\b[^>]*>").unwrap());
    if let Some(m) = RE_MAIN_OPEN.find(artifact) {
        let mut out = String::with_capacity(artifact.len() + blocks.len());
        out.push_str(&artifact[..m.end()]);
        out.push('\n');
        out.push_str(&blocks);
        out.push_str(&artifact[m.end()..]);
        return out;
    }

    artifact.to_string()
}

/// Placeholder tuning function: log-dampened clicks, clamped to 30..=90.
pub fn score_to_priority(clicks: u64) -> i64 {
    let score = (1.0 + clicks as f64).ln();
    (30.0 + score * 20.0).round().clamp(30.0, 90.0) as i64
}

/// Out-of-band feedback: map observed click counts onto item priorities.
/// Items without clicks keep their current priority. Returns whether
/// anything changed.
pub fn refresh_priorities(catalog: &mut AffiliateCatalog, clicks_by_id: &HashMap<String, u64>) -> bool {
    let mut changed = false;
    for items in catalog.categories.values_mut() {
        for item in items.iter_mut() {
            let Some(&clicks) = clicks_by_id.get(&item.id) else {
                continue;
            };
            if clicks == 0 {
                continue;
            }
            let new_priority = score_to_priority(clicks);
            if new_priority != item.priority {
                item.priority = new_priority;
                changed = true;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, html: &str, priority: i64) -> AffiliateItem {
        AffiliateItem {
            id: id.to_string(),
            title: format!("sponsor {id}"),
            html: html.to_string(),
            priority,
        }
    }

    fn catalog_with(items: Vec<AffiliateItem>) -> AffiliateCatalog {
        let mut categories = HashMap::new();
        categories.insert("dev-tools".to_string(), items);
        AffiliateCatalog { categories }
    }

    #[test]
    fn script_snippets_are_rejected_even_at_top_priority() {
        let cat = catalog_with(vec![
            item("evil", r#"<SCRIPT src="x.js"></SCRIPT>"#, 99),
            item("ok", r#"<a href="https://p.test">deal</a>"#, 10),
        ]);
        let picked = cat.select("dev-tools", 2);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "ok");
    }

    #[test]
    fn anchors_get_target_and_merged_rel() {
        let out = sanitize_anchors(r#"<a href="https://p.test" rel="external nofollow">x</a>"#);
        assert!(out.contains(r#"target="_blank""#));
        for tok in REQUIRED_REL_TOKENS {
            assert!(out.contains(tok), "missing {tok} in {out}");
        }
        // pre-existing token preserved, not overwritten
        assert!(out.contains("external"));
        // only one rel attribute remains
        assert_eq!(out.matches("rel=").count(), 1);
    }

    #[test]
    fn selection_sorts_by_priority_and_caps() {
        let cat = catalog_with(vec![
            item("low", "<a href='https://a.test'>a</a>", 10),
            item("high", "<a href='https://b.test'>b</a>", 80),
            item("mid", "<a href='https://c.test'>c</a>", 40),
        ]);
        let picked = cat.select("dev-tools", 2);
        let ids: Vec<&str> = picked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
    }

    #[test]
    fn injection_prefers_the_marker() {
        let html = "<main>\n<!-- AFF_SLOT -->\n</main>";
        let out = inject_affiliates(
            html,
            &[item("s1", "<a href='https://p.test'>x</a>", 50)],
            "artifact-1",
            Some("https://click.test/log"),
        );
        let marker_pos = out.find("AFF_SLOT").unwrap();
        let block_pos = out.find("data-sponsor-id").unwrap();
        assert!(block_pos > marker_pos);
        assert!(out.contains("sendBeacon"));
    }

    #[test]
    fn injection_falls_back_to_main_container() {
        let html = "<main class=\"wrap\"><p>content</p></main>";
        let out = inject_affiliates(
            html,
            &[item("s1", "<a href='https://p.test'>x</a>", 50)],
            "artifact-1",
            None,
        );
        let main_pos = out.find("<main").unwrap();
        let block_pos = out.find("data-sponsor-id").unwrap();
        let content_pos = out.find("<p>content</p>").unwrap();
        assert!(main_pos < block_pos && block_pos < content_pos);
        assert!(!out.contains("sendBeacon"));
    }

    #[test]
    fn priority_feedback_is_log_dampened_and_clamped() {
        assert_eq!(score_to_priority(0), 30);
        assert!(score_to_priority(5) > 30 && score_to_priority(5) < 90);
        assert_eq!(score_to_priority(1_000_000), 90);

        let mut cat = catalog_with(vec![
            item("a", "<a href='https://a.test'>a</a>", 50),
            item("b", "<a href='https://b.test'>b</a>", 50),
        ]);
        let clicks: HashMap<String, u64> = [("a".to_string(), 20u64)].into_iter().collect();
        assert!(refresh_priorities(&mut cat, &clicks));
        let items = &cat.categories["dev-tools"];
        assert_eq!(items[0].priority, score_to_priority(20));
        assert_eq!(items[1].priority, 50);
    }
}
