// src/cluster.rs
//! Token-set clustering: tokenizer, Jaccard similarity, and a single-pass
//! greedy grouping of candidates around seed token sets.
//!
//! This is seed-similarity clustering, not single-linkage: membership is
//! decided against the seed's token set only, so a candidate similar to a
//! non-seed member can still land outside the cluster.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashSet, HashMap};

use crate::collect::Candidate;

/// Per-candidate token cap; keeps pathological posts from dominating sets.
const MAX_TOKENS: usize = 80;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    "a an the and or but if then else when while of for to in on at from by with without into onto \
     over under is are was were be been being do does did done have has had will would can could \
     should may might this that these those it its im youre we they them our your my mine me you \
     he she his her i am not no yes"
        .split_whitespace()
        .collect()
});

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static RE_KEEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\-\s]").unwrap());

/// Lowercase, strip URLs, keep alphanumerics/hyphen, drop stopwords and
/// one-char tokens, cap the result length.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let no_urls = RE_URL.replace_all(&lowered, " ");
    let cleaned = RE_KEEP.replace_all(&no_urls, " ");
    cleaned
        .split_whitespace()
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .take(MAX_TOKENS)
        .map(|t| t.to_string())
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Intersection-over-union of two token sets. Empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// A non-empty group of candidates similar to the seed (first member).
#[derive(Debug, Clone)]
pub struct Cluster {
    pub members: Vec<Candidate>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn earliest_timestamp(&self) -> i64 {
        self.members
            .iter()
            .map(|c| c.timestamp)
            .min()
            .unwrap_or(i64::MAX)
    }
}

/// Single-pass greedy clustering over candidates in their original order.
/// Deterministic for a fixed input order and threshold. Output is sorted by
/// (size desc, earliest timestamp asc).
pub fn cluster_candidates(candidates: &[Candidate], threshold: f64) -> Vec<Cluster> {
    let sets: HashMap<usize, HashSet<String>> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, token_set(&c.text)))
        .collect();

    let mut assigned = vec![false; candidates.len()];
    let mut clusters = Vec::new();

    for i in 0..candidates.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let seed = &sets[&i];
        let mut members = vec![candidates[i].clone()];
        for j in (i + 1)..candidates.len() {
            if assigned[j] {
                continue;
            }
            if jaccard(seed, &sets[&j]) >= threshold {
                assigned[j] = true;
                members.push(candidates[j].clone());
            }
        }
        clusters.push(Cluster { members });
    }

    clusters.sort_by(|a, b| {
        b.size()
            .cmp(&a.size())
            .then(a.earliest_timestamp().cmp(&b.earliest_timestamp()))
    });
    clusters
}
