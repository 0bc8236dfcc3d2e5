// src/theme.rs
//! Turns top clusters into scored `Theme` records: keyword extraction,
//! first-match category inference, and the selector scoring formula.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cluster::{tokenize, Cluster};
use crate::collect::Candidate;
use crate::scoring;

pub const DEFAULT_CATEGORY: &str = "dev-tools";
const KEYWORD_TOP_K: usize = 12;
const PROBLEM_MIN: usize = 10;
const PROBLEM_MAX: usize = 20;
const REPRESENTATIVE_MAX: usize = 8;

/// Fixed priority order: the first category whose triggers intersect the
/// aggregated cluster text (or its keywords) wins.
const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    (
        "web-hosting",
        &["dns", "cname", "nameserver", "hosting", "ssl", "https", "domain"],
    ),
    (
        "dev-tools",
        &["python", "node", "npm", "pip", "bash", "cli", "library", "compile"],
    ),
    (
        "ai-automation",
        &["automation", "workflow", "cron", "bot", "llm", "prompt", "agent"],
    ),
    (
        "security-privacy",
        &["privacy", "security", "2fa", "phishing", "cookie", "vpn", "encryption"],
    ),
    (
        "media",
        &["video", "mp4", "codec", "ffmpeg", "audio", "subtitle"],
    ),
    (
        "pdf-docs",
        &["pdf", "docx", "word", "merge", "document"],
    ),
    (
        "images-design",
        &["image", "png", "jpg", "webp", "design", "figma"],
    ),
    (
        "data-spreadsheets",
        &["excel", "spreadsheet", "csv", "vlookup", "pivot", "formula"],
    ),
    (
        "business-finance",
        &["invoice", "tax", "accounting", "pricing", "subscription", "vat"],
    ),
    (
        "marketing-social",
        &["seo", "marketing", "ads", "social", "instagram", "youtube"],
    ),
    (
        "productivity",
        &["productivity", "todo", "note", "calendar", "checklist"],
    ),
    (
        "education-language",
        &["language", "study", "learning", "exam", "flashcard"],
    ),
];

/// Categories weighted up to balance the published distribution.
const BOOSTED_CATEGORIES: &[&str] = &[
    "web-hosting",
    "pdf-docs",
    "media",
    "data-spreadsheets",
    "security-privacy",
    "ai-automation",
];

const SOLVABLE_SIGNALS: &[&str] = &[
    "how", "fix", "error", "failed", "can't", "cannot", "help", "broken",
];
const TOOL_SIGNALS: &[&str] = &[
    "convert", "compress", "calculator", "generator", "template", "checklist", "tool",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub title: String,
    /// Base slug; rewritten once by the allocator before first use.
    pub slug: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub problem_examples: Vec<String>,
    pub score: i32,
    pub representative_candidates: Vec<Candidate>,
}

/// Top-K tokens by frequency, ties broken lexically.
pub fn extract_keywords(members: &[Candidate], top_k: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for c in members {
        for tok in tokenize(&c.text) {
            *freq.entry(tok).or_insert(0) += 1;
        }
    }
    let mut items: Vec<(String, usize)> = freq.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    items.into_iter().take(top_k).map(|(k, _)| k).collect()
}

/// First-match priority lookup over the fixed category table.
pub fn infer_category(aggregated_text: &str, keywords: &[String]) -> &'static str {
    let text = aggregated_text.to_lowercase();
    for (category, triggers) in CATEGORY_TABLE {
        let hit = triggers
            .iter()
            .any(|t| text.contains(t) || keywords.iter().any(|k| k == t));
        if hit {
            return category;
        }
    }
    DEFAULT_CATEGORY
}

fn count_signals(text: &str, signals: &[&str]) -> i32 {
    signals.iter().filter(|s| text.contains(*s)).count() as i32
}

/// Selector formula: cluster size dominates, solvability and tool phrasing
/// nudge, boosted categories get a 15% lift (integer math).
pub fn selector_score(size: usize, aggregated_text: &str, category: &str) -> i32 {
    let s1 = count_signals(aggregated_text, SOLVABLE_SIGNALS);
    let s2 = count_signals(aggregated_text, TOOL_SIGNALS);
    let base = size as i32 * 18 + s1 * 4 + s2 * 6;
    if BOOSTED_CATEGORIES.contains(&category) {
        base * 115 / 100
    } else {
        base
    }
}

fn build_title(keywords: &[String], category: &str) -> String {
    let base: String = {
        let picked: Vec<&str> = keywords
            .iter()
            .filter(|k| k.len() <= 18)
            .take(4)
            .map(String::as_str)
            .collect();
        let joined = picked.join(" / ");
        if joined.is_empty() {
            category.replace('-', " ")
        } else {
            joined
        }
    };
    let mut title = base;
    title.truncate(60);
    format!("{} - Fix Guide & Tool", title.trim_end_matches([' ', '/']))
}

/// Deduplicated problem list from leading member texts, padded with
/// placeholders up to the minimum, capped at the maximum.
fn build_problem_examples(members: &[Candidate], category: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in members.iter().take(12) {
        let line: String = c.text.chars().take(120).collect();
        let line = line.trim().to_string();
        if !line.is_empty() && !out.contains(&line) {
            out.push(line);
        }
    }
    while out.len() < PROBLEM_MIN {
        out.push(format!(
            "Reported trouble related to {}: symptom #{}",
            category.replace('-', "/"),
            out.len() + 1
        ));
    }
    out.truncate(PROBLEM_MAX);
    out
}

/// Build one theme from a cluster. The aggregated text drives category and
/// signal counts; keywords drive the title and base slug.
pub fn make_theme(cluster: &Cluster) -> Theme {
    let aggregated: String = cluster
        .members
        .iter()
        .map(|c| c.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let keywords = extract_keywords(&cluster.members, KEYWORD_TOP_K);
    let category = infer_category(&aggregated, &keywords).to_string();
    let score = selector_score(cluster.size(), &aggregated, &category);
    let title = build_title(&keywords, &category);
    let slug = crate::slug::slugify(&title);
    let problem_examples = build_problem_examples(&cluster.members, &category);

    Theme {
        title,
        slug,
        category,
        keywords,
        problem_examples,
        score,
        representative_candidates: cluster
            .members
            .iter()
            .take(REPRESENTATIVE_MAX)
            .cloned()
            .collect(),
    }
}

/// Themes from qualifying clusters (size >= 2), or from the single
/// top-scoring candidate when none qualifies. At most `max_themes`, ranked
/// by selector score descending.
pub fn select_themes(clusters: &[Cluster], candidates: &[Candidate], max_themes: usize) -> Vec<Theme> {
    let mut themes: Vec<Theme> = clusters
        .iter()
        .filter(|c| c.size() >= 2)
        .map(make_theme)
        .collect();

    if themes.is_empty() && !candidates.is_empty() {
        let best = candidates
            .iter()
            .enumerate()
            .max_by_key(|(i, c)| {
                (
                    scoring::score_text(&c.text, c.engagement, false).total(),
                    // stable: earlier candidate wins ties
                    -(*i as i64),
                )
            })
            .map(|(_, c)| c.clone());
        if let Some(c) = best {
            themes.push(make_theme(&Cluster { members: vec![c] }));
        }
    }

    themes.sort_by(|a, b| b.score.cmp(&a.score));
    themes.truncate(max_themes);
    themes
}
