// src/related.rs
//! Related-link selection: rank catalog entries by tag-set overlap against
//! the current artifact, then backfill from recency so the block is never
//! empty while any catalog data exists.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::cluster::jaccard;

/// One catalog entry: own prior inventory and the external seed catalog
/// both normalize into this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
}

/// Load the external seed catalog; a missing file is an empty catalog.
pub fn load_seed_catalog(path: &Path) -> Result<Vec<CatalogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed catalog at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing seed catalog at {}", path.display()))
}

/// Lowercase, trim, drop empties.
pub fn normalize_tags(tags: &[String]) -> HashSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Rank by tag Jaccard descending, dedup by URL, exclude the artifact's own
/// URL, cap at `k`; backfill first from the inventory (newest first), then
/// from seeds, preserving uniqueness.
pub fn select_related(
    current_tags: &[String],
    current_url: &str,
    inventory: &[CatalogEntry],
    seeds: &[CatalogEntry],
    k: usize,
) -> Vec<RelatedLink> {
    let own = normalize_tags(current_tags);
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(current_url.to_string());

    let pool: Vec<&CatalogEntry> = inventory.iter().chain(seeds.iter()).collect();

    let mut scored: Vec<(f64, usize, &CatalogEntry)> = pool
        .iter()
        .enumerate()
        .map(|(i, e)| (jaccard(&own, &normalize_tags(&e.tags)), i, *e))
        .filter(|(score, _, _)| *score > 0.0)
        .collect();
    // stable on the original pool order for equal scores
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));

    let mut out = Vec::with_capacity(k);
    for (_, _, e) in scored {
        if out.len() >= k {
            break;
        }
        if seen.insert(e.url.clone()) {
            out.push(RelatedLink {
                title: e.title.clone(),
                url: e.url.clone(),
            });
        }
    }

    // Backfill: inventory entries are already newest-first, then seeds.
    for e in inventory.iter().chain(seeds.iter()) {
        if out.len() >= k {
            break;
        }
        if seen.insert(e.url.clone()) {
            out.push(RelatedLink {
                title: e.title.clone(),
                url: e.url.clone(),
            });
        }
    }

    out
}

static RE_RELATED_ASSIGN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.__RELATED__\s*=\s*(\[[^\]]*\]|null)").unwrap());

/// Fill the artifact's related-links data hook with the selected entries.
/// The hook's presence is guaranteed by validation; if it is somehow absent
/// the artifact is returned unchanged.
pub fn inject_related(artifact: &str, links: &[RelatedLink]) -> String {
    let json = serde_json::to_string(links).unwrap_or_else(|_| "[]".to_string());
    RE_RELATED_ASSIGN
        .replace(artifact, format!("window.__RELATED__ = {json}").as_str())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str, tags: &[&str]) -> CatalogEntry {
        CatalogEntry {
            title: title.to_string(),
            url: url.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn tags(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn ranks_by_overlap_and_excludes_own_url() {
        let inventory = vec![
            entry("self", "https://s.test/pages/me/", &["csv", "json"]),
            entry("close", "https://s.test/pages/a/", &["csv", "json", "convert"]),
            entry("far", "https://s.test/pages/b/", &["video"]),
        ];
        let out = select_related(
            &tags(&["csv", "json"]),
            "https://s.test/pages/me/",
            &inventory,
            &[],
            8,
        );
        assert_eq!(out[0].url, "https://s.test/pages/a/");
        assert!(out.iter().all(|l| l.url != "https://s.test/pages/me/"));
    }

    #[test]
    fn backfills_from_recent_then_seeds_without_duplicates() {
        let inventory = vec![
            entry("newest", "https://s.test/pages/n/", &[]),
            entry("older", "https://s.test/pages/o/", &[]),
        ];
        let seeds = vec![
            entry("seed", "https://seed.test/1", &[]),
            entry("newest again", "https://s.test/pages/n/", &[]),
        ];
        let out = select_related(&tags(&["csv"]), "https://s.test/pages/me/", &inventory, &seeds, 3);
        let urls: Vec<&str> = out.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://s.test/pages/n/",
                "https://s.test/pages/o/",
                "https://seed.test/1"
            ]
        );
    }

    #[test]
    fn respects_k_and_uniqueness() {
        let inventory: Vec<CatalogEntry> = (0..20)
            .map(|i| entry("e", &format!("https://s.test/pages/{i}/"), &["csv"]))
            .collect();
        let out = select_related(&tags(&["csv"]), "none", &inventory, &[], 8);
        assert_eq!(out.len(), 8);
        let unique: HashSet<&str> = out.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(unique.len(), 8);
    }

    #[test]
    fn injection_replaces_the_hook_assignment() {
        let html = "<script>window.__RELATED__ = []</script>";
        let links = vec![RelatedLink {
            title: "a".into(),
            url: "https://s.test/a/".into(),
        }];
        let out = inject_related(html, &links);
        assert!(out.contains(r#"window.__RELATED__ = [{"title":"a","url":"https://s.test/a/"}]"#));
    }
}
