// src/collect/mod.rs
pub mod providers;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a collector hands back before normalization. Shapes vary per source,
/// so every field the source may omit is optional here.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub text: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub timestamp: Option<i64>,
    pub engagement: Option<i64>,
}

/// Canonical candidate shape. Immutable once normalized; everything
/// downstream consumes it read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub url: String,
    pub source: String,
    pub timestamp: i64,
    pub engagement: Option<i64>,
}

#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRecord>>;
    fn name(&self) -> &'static str;
}

/// Per-source outcome, kept for the run summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Collected { count: usize },
    ZeroResults,
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

/// Normalize text: entity-decode, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Turn raw records into candidates. A record lacking non-empty text or url
/// is dropped, not an error. Exact duplicates across sources are removed by
/// a (url, text-prefix) key, keeping first occurrence.
pub fn normalize_records(raw: Vec<RawRecord>) -> (Vec<Candidate>, usize) {
    let mut dropped = 0usize;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for rec in raw {
        let text = rec.text.as_deref().map(normalize_text).unwrap_or_default();
        let url = rec.url.unwrap_or_default().trim().to_string();
        if text.is_empty() || url.is_empty() {
            dropped += 1;
            continue;
        }
        let key = format!("{}|{}", url, text.chars().take(160).collect::<String>());
        if !seen.insert(key) {
            dropped += 1;
            continue;
        }
        out.push(Candidate {
            text,
            url,
            source: rec.source,
            timestamp: rec.timestamp.unwrap_or(0),
            engagement: rec.engagement,
        });
    }

    (out, dropped)
}

/// Fetch from every source, isolating per-source failures: a failing source
/// contributes an empty list and a `Failed` report, never an abort.
pub async fn collect_all(
    sources: &[Box<dyn CandidateSource>],
    total_limit: usize,
) -> (Vec<Candidate>, usize, Vec<SourceReport>) {
    let mut raw = Vec::new();
    let mut reports = Vec::with_capacity(sources.len());

    for src in sources {
        match src.fetch().await {
            Ok(records) => {
                let status = if records.is_empty() {
                    SourceStatus::ZeroResults
                } else {
                    SourceStatus::Collected {
                        count: records.len(),
                    }
                };
                reports.push(SourceReport {
                    source: src.name().to_string(),
                    status,
                });
                raw.extend(records);
            }
            Err(e) => {
                tracing::warn!(source = src.name(), error = ?e, "collector error");
                metrics::counter!("collect_source_errors_total").increment(1);
                reports.push(SourceReport {
                    source: src.name().to_string(),
                    status: SourceStatus::Failed {
                        error: e.to_string(),
                    },
                });
            }
        }
    }

    let (mut candidates, dropped) = normalize_records(raw);
    candidates.truncate(total_limit);
    (candidates, dropped, reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tags_and_entities() {
        let s = "  <b>Hello&nbsp;&nbsp;world</b> &ldquo;ok&rdquo;  ";
        assert_eq!(normalize_text(s), r#"Hello world "ok""#);
    }

    #[test]
    fn records_without_text_or_url_are_dropped() {
        let raw = vec![
            RawRecord {
                text: Some("need a csv tool".into()),
                url: Some("https://example.test/1".into()),
                source: "hackernews".into(),
                timestamp: Some(100),
                engagement: Some(4),
            },
            RawRecord {
                text: Some("   ".into()),
                url: Some("https://example.test/2".into()),
                source: "hackernews".into(),
                ..Default::default()
            },
            RawRecord {
                text: Some("no url here".into()),
                url: None,
                source: "mastodon".into(),
                ..Default::default()
            },
        ];
        let (out, dropped) = normalize_records(raw);
        assert_eq!(out.len(), 1);
        assert_eq!(dropped, 2);
        assert_eq!(out[0].source, "hackernews");
    }

    #[test]
    fn exact_duplicates_keep_first() {
        let mk = |url: &str| RawRecord {
            text: Some("same text".into()),
            url: Some(url.into()),
            source: "hackernews".into(),
            ..Default::default()
        };
        let (out, dropped) =
            normalize_records(vec![mk("https://a.test"), mk("https://a.test"), mk("https://b.test")]);
        assert_eq!(out.len(), 2);
        assert_eq!(dropped, 1);
    }
}
