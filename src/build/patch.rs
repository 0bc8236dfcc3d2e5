// src/build/patch.rs
//! Deterministic unified-diff application as a small explicit grammar:
//! header parse, hunk list, line-by-line splice. Every failure mode returns
//! a typed `Rejected` with its reason; there is no silent no-op path.

use once_cell::sync::Lazy;
use regex::Regex;

/// Outcome of applying a diff to an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied(String),
    Rejected(String),
}

static RE_HUNK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap()
});

#[derive(Debug)]
struct Hunk {
    old_start: usize,
    old_len: usize,
    lines: Vec<HunkLine>,
}

#[derive(Debug)]
enum HunkLine {
    Context(String),
    Removed(String),
    Added(String),
}

/// Parse the diff text. Grammar:
/// - first line must start with the `--- ` header token;
/// - at least one `@@ -a,b +c,d @@` hunk header must follow;
/// - every hunk body line must carry a ` `, `-`, or `+` prefix.
fn parse(diff: &str) -> Result<Vec<Hunk>, String> {
    let mut lines = diff.lines().peekable();

    match lines.peek() {
        Some(first) if first.starts_with("--- ") => {
            lines.next();
        }
        _ => return Err("diff does not start with the '--- ' header token".to_string()),
    }
    // optional +++ companion header
    if matches!(lines.peek(), Some(l) if l.starts_with("+++ ")) {
        lines.next();
    }

    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in lines {
        if let Some(caps) = RE_HUNK.captures(line) {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            let old_start: usize = caps[1].parse().map_err(|_| "bad hunk header".to_string())?;
            let old_len: usize = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(1))
                .unwrap_or(1);
            current = Some(Hunk {
                old_start,
                old_len,
                lines: Vec::new(),
            });
            continue;
        }

        let Some(h) = current.as_mut() else {
            // Content before the first hunk header (beyond file headers) is
            // not part of the grammar.
            return Err(format!("unexpected line outside any hunk: '{line}'"));
        };

        let mut chars = line.chars();
        match chars.next() {
            Some(' ') => h.lines.push(HunkLine::Context(chars.as_str().to_string())),
            Some('-') => h.lines.push(HunkLine::Removed(chars.as_str().to_string())),
            Some('+') => h.lines.push(HunkLine::Added(chars.as_str().to_string())),
            None => h.lines.push(HunkLine::Context(String::new())),
            Some(other) => {
                return Err(format!("hunk line with invalid prefix '{other}'"));
            }
        }
    }

    if let Some(h) = current.take() {
        hunks.push(h);
    }
    if hunks.is_empty() {
        return Err("no hunks found".to_string());
    }
    Ok(hunks)
}

/// Apply a unified diff. Hunks splice old line ranges with the hunk's
/// context + added lines; a context/removed line that does not match the
/// document rejects the whole patch.
pub fn apply(artifact: &str, diff: &str) -> PatchOutcome {
    let hunks = match parse(diff) {
        Ok(h) => h,
        Err(reason) => return PatchOutcome::Rejected(reason),
    };

    let old_lines: Vec<&str> = artifact.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(old_lines.len());
    let mut cursor = 0usize; // index into old_lines

    for (n, hunk) in hunks.iter().enumerate() {
        let start = hunk.old_start.saturating_sub(1);
        if start < cursor || start > old_lines.len() {
            return PatchOutcome::Rejected(format!("hunk {} out of order or out of range", n + 1));
        }
        // copy unchanged region before the hunk
        out.extend(old_lines[cursor..start].iter().map(|s| s.to_string()));
        cursor = start;

        let mut consumed = 0usize;
        for hl in &hunk.lines {
            match hl {
                HunkLine::Context(text) | HunkLine::Removed(text) => {
                    match old_lines.get(cursor) {
                        Some(orig) if *orig == text => {}
                        _ => {
                            return PatchOutcome::Rejected(format!(
                                "hunk {} does not apply at line {}",
                                n + 1,
                                cursor + 1
                            ));
                        }
                    }
                    if matches!(hl, HunkLine::Context(_)) {
                        out.push(text.clone());
                    }
                    cursor += 1;
                    consumed += 1;
                }
                HunkLine::Added(text) => out.push(text.clone()),
            }
        }
        if consumed != hunk.old_len {
            return PatchOutcome::Rejected(format!(
                "hunk {} consumed {} old lines, header declared {}",
                n + 1,
                consumed,
                hunk.old_len
            ));
        }
    }

    out.extend(old_lines[cursor..].iter().map(|s| s.to_string()));
    let mut result = out.join("\n");
    if artifact.ends_with('\n') {
        result.push('\n');
    }
    PatchOutcome::Applied(result)
}
