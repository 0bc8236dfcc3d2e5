// src/scoring.rs
//! Deterministic weighted rule table over lower-cased text. Every category
//! appears in the breakdown, zeros included, so a ranking decision can
//! always be explained after the fact.

use serde::{Deserialize, Serialize};

pub const DUPLICATE_PENALTY: i32 = -200;
pub const ENGAGEMENT_CAP: i32 = 10;

/// Phrase-triggered categories. A category contributes its weight once when
/// any of its phrases occurs in the text, regardless of repetition.
const RULES: &[(&str, i32, &[&str])] = &[
    (
        "tool_request",
        8,
        &[
            "is there a tool",
            "need a tool",
            "looking for a tool",
            "any tool that",
            "is there an app",
        ],
    ),
    (
        "convert_generator_calc",
        7,
        &["convert", "converter", "generator", "calculator", "format"],
    ),
    (
        "structured_output",
        5,
        &["csv", "json", "markdown", "template", "checklist"],
    ),
    (
        "specific_inputs",
        4,
        &["timezone", "tax", "pricing", "compare"],
    ),
    (
        "how_to_code_only",
        -6,
        &["bug in my code", "stack trace", "compile error", "segfault"],
    ),
    (
        "too_broad",
        -4,
        &["ultimate", "all-in-one", "everything app", "do everything"],
    ),
    (
        "adult_or_sensitive",
        -20,
        &["nsfw", "adult content", "gambling", "betting tips", "escort"],
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contribution {
    pub category: String,
    pub points: i32,
}

/// Itemized score. `total` is always the sum of `contributions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub contributions: Vec<Contribution>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.contributions.iter().map(|c| c.points).sum()
    }

    pub fn get(&self, category: &str) -> Option<i32> {
        self.contributions
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.points)
    }

    pub fn is_duplicate(&self) -> bool {
        self.get("duplicate_penalty") == Some(DUPLICATE_PENALTY)
    }
}

/// Score one text. `engagement` is the external metric (capped); `duplicate`
/// reflects the fingerprint check. No category is skipped.
pub fn score_text(text: &str, engagement: Option<i64>, duplicate: bool) -> ScoreBreakdown {
    let lowered = text.to_lowercase();
    let mut contributions = Vec::with_capacity(RULES.len() + 2);

    for (category, weight, phrases) in RULES {
        let hit = phrases.iter().any(|p| lowered.contains(p));
        contributions.push(Contribution {
            category: category.to_string(),
            points: if hit { *weight } else { 0 },
        });
    }

    let engagement_points = engagement
        .map(|e| ((e / 10) as i32).clamp(0, ENGAGEMENT_CAP))
        .unwrap_or(0);
    contributions.push(Contribution {
        category: "source_engagement".to_string(),
        points: engagement_points,
    });

    contributions.push(Contribution {
        category: "duplicate_penalty".to_string(),
        points: if duplicate { DUPLICATE_PENALTY } else { 0 },
    });

    ScoreBreakdown { contributions }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_request_and_keywords_stack() {
        let b = score_text(
            "is there a tool to convert csv into json",
            None,
            false,
        );
        assert_eq!(b.get("tool_request"), Some(8));
        assert_eq!(b.get("convert_generator_calc"), Some(7));
        assert_eq!(b.get("structured_output"), Some(5));
        assert_eq!(b.total(), 20);
    }

    #[test]
    fn negative_signals_pull_the_total_down() {
        let b = score_text("there is a bug in my code, here is the stack trace", None, false);
        assert_eq!(b.get("how_to_code_only"), Some(-6));
        assert!(b.total() < 0);
    }

    #[test]
    fn every_category_is_present_even_at_zero() {
        let b = score_text("nothing matches here", None, false);
        assert_eq!(b.contributions.len(), RULES.len() + 2);
        assert!(b.contributions.iter().all(|c| c.points == 0));
    }

    #[test]
    fn engagement_is_capped() {
        let b = score_text("x", Some(50_000), false);
        assert_eq!(b.get("source_engagement"), Some(ENGAGEMENT_CAP));
        let b2 = score_text("x", Some(37), false);
        assert_eq!(b2.get("source_engagement"), Some(3));
    }

    #[test]
    fn duplicate_penalty_dominates() {
        let b = score_text(
            "is there a tool to convert csv into json",
            Some(100),
            true,
        );
        assert_eq!(b.get("duplicate_penalty"), Some(DUPLICATE_PENALTY));
        assert!(b.total() <= -150);
        assert!(b.is_duplicate());
    }
}
