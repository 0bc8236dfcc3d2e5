// src/fingerprint.rs
//! Published-theme fingerprints: canonical hashing plus a bounded, persisted
//! append log used to keep runs from re-publishing near-duplicate themes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cluster::jaccard;

/// Lowercase, strip non-alphanumerics to spaces, collapse whitespace.
pub fn normalize_for_fingerprint(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for ch in s.chars() {
        let lc = ch.to_ascii_lowercase();
        if lc.is_ascii_alphanumeric() {
            out.push(lc);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Content hash over normalized theme text + lexically sorted normalized
/// tags. Pure: identical normalized inputs always hash identically, and the
/// tag list order does not matter.
pub fn fingerprint(theme_text: &str, tags: &[String]) -> String {
    let mut norm_tags: Vec<String> = tags
        .iter()
        .map(|t| normalize_for_fingerprint(t))
        .filter(|t| !t.is_empty())
        .collect();
    norm_tags.sort();
    norm_tags.dedup();

    let mut hasher = Sha256::new();
    hasher.update(normalize_for_fingerprint(theme_text).as_bytes());
    hasher.update(b"\n");
    hasher.update(norm_tags.join(",").as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Short id for log lines; raw text never reaches the log output.
pub fn anon_hash(text: &str) -> String {
    fingerprint(text, &[]).chars().take(12).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub fingerprint: String,
    pub theme_text: String,
    pub tags: Vec<String>,
    pub created_at: String,
}

/// Why a theme was flagged as a duplicate, with the competing fingerprint
/// so the rejection can be logged with full context.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateKind {
    Exact,
    Similar(f64),
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub competing: String,
    pub kind: DuplicateKind,
}

/// Bounded append log of published fingerprints. Oldest entries are trimmed
/// beyond `cap`; the pipeline only ever appends.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    cap: usize,
    records: Vec<FingerprintRecord>,
}

impl FingerprintStore {
    pub fn load(path: &Path, cap: usize) -> Result<Self> {
        let records = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading fingerprint history at {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing fingerprint history at {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            cap: cap.max(1),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact fingerprint match, or token-Jaccard against any historical
    /// theme text at or above `threshold`.
    pub fn check_duplicate(
        &self,
        theme_text: &str,
        tags: &[String],
        threshold: f64,
    ) -> Option<DuplicateMatch> {
        let fp = fingerprint(theme_text, tags);
        if let Some(hit) = self.records.iter().find(|r| r.fingerprint == fp) {
            return Some(DuplicateMatch {
                competing: hit.fingerprint.clone(),
                kind: DuplicateKind::Exact,
            });
        }

        let probe: HashSet<String> = normalize_for_fingerprint(theme_text)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        for rec in &self.records {
            let hist: HashSet<String> = rec
                .theme_text
                .split_whitespace()
                .map(str::to_string)
                .collect();
            let sim = jaccard(&probe, &hist);
            if sim >= threshold {
                return Some(DuplicateMatch {
                    competing: rec.fingerprint.clone(),
                    kind: DuplicateKind::Similar(sim),
                });
            }
        }
        None
    }

    /// Append a published theme and persist, trimming the oldest entries
    /// past the cap. Write is temp-then-rename.
    pub fn append(&mut self, theme_text: &str, tags: &[String]) -> Result<()> {
        self.records.push(FingerprintRecord {
            fingerprint: fingerprint(theme_text, tags),
            theme_text: normalize_for_fingerprint(theme_text),
            tags: tags.to_vec(),
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        if self.records.len() > self.cap {
            let excess = self.records.len() - self.cap;
            self.records.drain(0..excess);
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}
