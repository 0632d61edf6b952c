//! Item catalog: the ordered listing the ledger is seeded from.
//!
//! The live API crawl lives outside this crate; anything that can produce an
//! ordered [`CatalogListing`] implements [`Catalog`]. [`ManifestCatalog`]
//! reads the listing from a JSON manifest on disk.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::layout::entry_file_name;

/// One item as described by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub format: String,
    pub url: String,
    /// Minimum plausible body size; the configured default is used when absent.
    #[serde(default)]
    pub min_bytes: Option<u64>,
}

/// Ordered catalog output plus the stated total.
#[derive(Debug, Clone, Default)]
pub struct CatalogListing {
    pub total: usize,
    pub entries: Vec<CatalogEntry>,
}

/// Source of the ordered item listing.
pub trait Catalog {
    fn listing(&self) -> Result<CatalogListing>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    total: Option<usize>,
    items: Vec<CatalogEntry>,
}

/// Catalog backed by a JSON manifest:
/// `{ "total": 2, "items": [ { "key": "..", "format": "jpg", "url": "https://..", "min_bytes": 1000 } ] }`.
#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    path: PathBuf,
}

impl ManifestCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Catalog for ManifestCatalog {
    fn listing(&self) -> Result<CatalogListing> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read catalog manifest: {}", self.path.display()))?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse catalog manifest: {}", self.path.display()))?;
        let listing = CatalogListing {
            total: manifest.total.unwrap_or(manifest.items.len()),
            entries: manifest.items,
        };
        validate_listing(&listing)?;
        Ok(listing)
    }
}

/// Checks a listing before it seeds a ledger: stated total matches, keys are
/// non-empty and unique, formats non-empty, URLs absolute http(s).
///
/// Keys are also checked after sanitizing: two entries whose on-disk file
/// names coincide (`a/b` and `a_b`) would overwrite each other's file.
pub fn validate_listing(listing: &CatalogListing) -> Result<()> {
    if listing.total != listing.entries.len() {
        anyhow::bail!(
            "catalog states {} items but lists {}",
            listing.total,
            listing.entries.len()
        );
    }
    let mut seen = HashSet::with_capacity(listing.entries.len());
    let mut files: HashMap<String, &str> = HashMap::with_capacity(listing.entries.len());
    for (i, e) in listing.entries.iter().enumerate() {
        if e.key.trim().is_empty() {
            anyhow::bail!("catalog item {} has an empty key", i);
        }
        if e.format.trim().is_empty() {
            anyhow::bail!("catalog item {} ({}) has an empty format", i, e.key);
        }
        if !seen.insert(e.key.as_str()) {
            anyhow::bail!("duplicate catalog key: {}", e.key);
        }
        let file = entry_file_name(i, &e.key, &e.format);
        if let Some(other) = files.insert(file.clone(), e.key.as_str()) {
            anyhow::bail!(
                "catalog keys {:?} and {:?} map to the same file {}",
                other,
                e.key,
                file
            );
        }
        let parsed = url::Url::parse(&e.url)
            .with_context(|| format!("invalid URL for catalog item {}: {}", e.key, e.url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported URL scheme for catalog item {}: {}", e.key, e.url);
        }
    }
    Ok(())
}
