//! Load and save the ledger snapshot (JSON, atomic replace).

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Ledger;

/// Temp path used while writing a snapshot: `ledger.json` -> `ledger.json.part`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

/// Lock file guarding a snapshot: `ledger.json` -> `ledger.json.lock`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".lock");
    PathBuf::from(o)
}

impl Ledger {
    /// Load a snapshot. Returns `None` when no snapshot exists yet (first run).
    pub fn load_from_path(path: &Path) -> Result<Option<Ledger>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read ledger: {}", path.display())),
        };
        let ledger = Ledger::from_json(&bytes)
            .with_context(|| format!("parse ledger: {}", path.display()))?;
        if ledger.version > super::LEDGER_VERSION {
            anyhow::bail!(
                "ledger {} has format version {}, this build reads up to {}",
                path.display(),
                ledger.version,
                super::LEDGER_VERSION
            );
        }
        Ok(Some(ledger))
    }

    /// Save the snapshot: write `<path>.part`, fsync, then rename over `path`.
    /// A crash mid-write leaves the previous snapshot untouched.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let bytes = self.to_json().context("serialize ledger")?;
        write_atomic(path, &bytes)
    }
}

/// Atomically replace `path` with `bytes`. Creates the parent dir if needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir: {}", parent.display()))?;
    }
    let temp = temp_path_for(path);
    {
        let mut f = File::create(&temp)
            .with_context(|| format!("create ledger temp file: {}", temp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write ledger temp file: {}", temp.display()))?;
        f.sync_all().context("sync ledger temp file")?;
    }
    std::fs::rename(&temp, path).with_context(|| {
        format!("failed to rename {} to {}", temp.display(), path.display())
    })?;
    Ok(())
}

/// Delete the snapshot (and a leftover temp file). Missing files are not an error.
pub fn remove_snapshot(path: &Path) -> Result<bool> {
    let mut removed = false;
    for p in [path.to_path_buf(), temp_path_for(path)] {
        match std::fs::remove_file(&p) {
            Ok(()) => removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("remove {}", p.display())),
        }
    }
    Ok(removed)
}
