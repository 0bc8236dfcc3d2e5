// src/publish.rs
//! Publication: artifact write, append-only inventory, and the index
//! structures derived from it. All writes are write-new-then-rename so a
//! killed run never leaves a partially written inventory or page behind.

use anyhow::{Context, Result};
use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::related::CatalogEntry;
use crate::scoring::ScoreBreakdown;

/// Published-artifact metadata. The inventory is append-only: entries are
/// prepended (newest first) and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub category: String,
    pub tags: Vec<String>,
    pub url: String,
    pub created_at: String,
    pub score: i32,
    #[serde(default)]
    pub related: Vec<String>,
}

impl ToolEntry {
    pub fn as_catalog_entry(&self) -> CatalogEntry {
        CatalogEntry {
            title: self.title.clone(),
            url: self.url.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub entries: Vec<ToolEntry>,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InventoryFile {
    Wrapped(Inventory),
    // legacy shape: a bare entry array
    Bare(Vec<ToolEntry>),
}

impl Inventory {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading inventory at {}", path.display()))?;
        let file: InventoryFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing inventory at {}", path.display()))?;
        Ok(match file {
            InventoryFile::Wrapped(inv) => inv,
            InventoryFile::Bare(entries) => Inventory {
                entries,
                updated_at: String::new(),
            },
        })
    }

    pub fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.entries.iter().map(ToolEntry::as_catalog_entry).collect()
    }
}

/// Temp-then-rename write; the destination is never observable half-written.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[derive(Debug)]
pub struct Publisher {
    site_root: PathBuf,
    base_url: String,
}

impl Publisher {
    pub fn new(site_root: &Path, base_url: &str) -> Self {
        Self {
            site_root: site_root.to_path_buf(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.site_root.join("inventory.json")
    }

    pub fn page_url(&self, slug: &str) -> String {
        format!("{}/pages/{}/", self.base_url, slug)
    }

    /// Commit one artifact. Order matters for crash safety:
    /// 1. artifact lands at its allocated path (temp + rename);
    /// 2. the inventory is prepended and atomically replaced — on failure
    ///    the fresh artifact directory is removed again so neither state
    ///    survives;
    /// 3. sitemap/robots/index are regenerated best-effort.
    pub fn publish(
        &self,
        artifact_dir: &Path,
        artifact_html: &str,
        entry: ToolEntry,
    ) -> Result<Inventory> {
        let index_path = artifact_dir.join("index.html");
        fs::create_dir_all(artifact_dir)
            .with_context(|| format!("creating {}", artifact_dir.display()))?;
        if let Err(e) = write_atomic(&index_path, artifact_html) {
            let _ = fs::remove_dir_all(artifact_dir);
            return Err(e.context("writing artifact"));
        }

        let mut inventory = match Inventory::load(&self.inventory_path()) {
            Ok(inv) => inv,
            Err(e) => {
                let _ = fs::remove_dir_all(artifact_dir);
                return Err(e);
            }
        };
        inventory.entries.insert(0, entry);
        inventory.updated_at = Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(&inventory)?;
        if let Err(e) = write_atomic(&self.inventory_path(), &json) {
            let _ = fs::remove_dir_all(artifact_dir);
            return Err(e.context("updating inventory"));
        }
        metrics::counter!("publish_total").increment(1);

        // Derived indices are regenerated from the committed inventory.
        if let Err(e) = self.write_indices(&inventory) {
            warn!(error = ?e, "index regeneration failed after publish");
            metrics::counter!("publish_index_errors_total").increment(1);
        }

        Ok(inventory)
    }

    fn write_indices(&self, inventory: &Inventory) -> Result<()> {
        write_atomic(&self.site_root.join("sitemap.xml"), &self.render_sitemap(inventory)?)?;
        write_atomic(
            &self.site_root.join("robots.txt"),
            &format!("User-agent: *\nAllow: /\n\nSitemap: {}/sitemap.xml\n", self.base_url),
        )?;

        #[derive(Serialize)]
        struct IndexEntry<'a> {
            title: &'a str,
            url: &'a str,
            category: &'a str,
        }
        let index: Vec<IndexEntry<'_>> = inventory
            .entries
            .iter()
            .map(|e| IndexEntry {
                title: &e.title,
                url: &e.url,
                category: &e.category,
            })
            .collect();
        write_atomic(
            &self.site_root.join("index.json"),
            &serde_json::to_string_pretty(&index)?,
        )?;
        Ok(())
    }

    fn render_sitemap(&self, inventory: &Inventory) -> Result<String> {
        let today = Utc::now().date_naive().to_string();
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut urlset = BytesStart::new("urlset");
        urlset.push_attribute(("xmlns", "http://www.sitemaps.org/schemas/sitemap/0.9"));
        writer.write_event(Event::Start(urlset))?;
        for entry in &inventory.entries {
            writer.write_event(Event::Start(BytesStart::new("url")))?;
            writer.write_event(Event::Start(BytesStart::new("loc")))?;
            writer.write_event(Event::Text(BytesText::new(&entry.url)))?;
            writer.write_event(Event::End(BytesEnd::new("loc")))?;
            writer.write_event(Event::Start(BytesStart::new("lastmod")))?;
            writer.write_event(Event::Text(BytesText::new(&today)))?;
            writer.write_event(Event::End(BytesEnd::new("lastmod")))?;
            writer.write_event(Event::End(BytesEnd::new("url")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("urlset")))?;

        let bytes = writer.into_inner();
        Ok(String::from_utf8(bytes).context("sitemap is not utf-8")?)
    }
}

/// Structured diagnostic for a theme whose build loop ran out of attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFailureDiagnostic {
    pub run_id: String,
    pub theme_title: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub score_breakdown: ScoreBreakdown,
    pub sources: Vec<String>,
    pub failure_reason: String,
    pub attempts: u32,
}

pub fn write_failure_diagnostic(out_root: &Path, diag: &BuildFailureDiagnostic) -> Result<()> {
    let path = out_root.join(format!("build_failure_{}.json", diag.run_id));
    write_atomic(&path, &serde_json::to_string_pretty(diag)?)
}
