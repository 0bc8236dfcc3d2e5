// src/slug.rs
//! Slug derivation and collision-safe allocation against the output
//! namespace. Once a path is published it is never reused or overwritten.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

const MAX_SLUG_LEN: usize = 64;
const FALLBACK_SLUG: &str = "tool";

static RE_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://").unwrap());
static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, strip URL schemes, collapse non-alphanumeric runs to single
/// hyphens, trim to the max length; a generic token when nothing survives.
pub fn slugify(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    let no_scheme = RE_SCHEME.replace_all(&lowered, "");
    let hyphened = RE_NON_ALNUM.replace_all(&no_scheme, "-");
    let trimmed = hyphened.trim_matches('-');
    if trimmed.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    let capped: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    let capped = capped.trim_matches('-');
    if capped.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        capped.to_string()
    }
}

/// Reserves collision-free page paths under one pages directory.
#[derive(Debug)]
pub struct SlugAllocator {
    pages_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedSlug {
    pub slug: String,
    pub dir: PathBuf,
}

impl SlugAllocator {
    pub fn new(pages_dir: &Path) -> Self {
        Self {
            pages_dir: pages_dir.to_path_buf(),
        }
    }

    /// Returns the base slug if its path is free, else the first free
    /// `base-2`, `base-3`, ... The returned path never exists at call time.
    pub fn allocate(&self, base: &str) -> Result<AllocatedSlug> {
        let base = slugify(base);
        let first = self.pages_dir.join(&base);
        if !first.exists() {
            return Ok(AllocatedSlug {
                slug: base,
                dir: first,
            });
        }
        for i in 2..10_000u32 {
            let slug = format!("{base}-{i}");
            let dir = self.pages_dir.join(&slug);
            if !dir.exists() {
                return Ok(AllocatedSlug { slug, dir });
            }
        }
        bail!("slug namespace exhausted for base '{base}'");
    }
}
