//! Output layout: where each ledger item lands on disk.
//!
//! `<base>/<key>.<format>` for small libraries; once the ledger holds more
//! than `split_threshold` items, `<base>/<shard>/<key>.<format>` with
//! `shard = index / shard_capacity + 1`. The shard comes from the item's
//! fixed ledger index, so placement is identical on every resumed run.

use std::path::{Path, PathBuf};

use crate::config::HoardConfig;
use crate::ledger::WorkItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    base_dir: PathBuf,
    /// `Some(capacity)` when sharding applies.
    shard_capacity: Option<usize>,
}

impl OutputLayout {
    /// Layout for a ledger of `total` items.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        total: usize,
        split_threshold: usize,
        shard_capacity: usize,
    ) -> Self {
        let shard_capacity = (total > split_threshold).then_some(shard_capacity.max(1));
        Self {
            base_dir: base_dir.into(),
            shard_capacity,
        }
    }

    pub fn from_config(cfg: &HoardConfig, total: usize) -> Self {
        Self::new(
            cfg.output_dir.clone(),
            total,
            cfg.split_threshold,
            cfg.shard_capacity,
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_sharded(&self) -> bool {
        self.shard_capacity.is_some()
    }

    /// 1-based shard number for a ledger index, or None when unsharded.
    pub fn shard_number(&self, index: usize) -> Option<usize> {
        self.shard_capacity.map(|cap| index / cap + 1)
    }

    /// Directory that holds the item at `index`.
    pub fn dir_for(&self, index: usize) -> PathBuf {
        match self.shard_number(index) {
            Some(n) => self.base_dir.join(n.to_string()),
            None => self.base_dir.clone(),
        }
    }

    /// Full destination path for the item at `index`.
    pub fn path_for(&self, index: usize, item: &WorkItem) -> PathBuf {
        self.dir_for(index).join(file_name(index, item))
    }
}

/// `<key>.<format>`, both parts sanitized. Falls back to `item-<index>` when
/// the key sanitizes to nothing (e.g. `".."`).
pub fn file_name(index: usize, item: &WorkItem) -> String {
    entry_file_name(index, &item.key, &item.format)
}

/// [`file_name`] for a catalog entry that has no [`WorkItem`] yet.
pub fn entry_file_name(index: usize, key: &str, format: &str) -> String {
    let mut stem = sanitize_component(key);
    if stem.is_empty() {
        stem = format!("item-{}", index);
    }
    let ext = sanitize_component(format);
    if ext.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, ext)
    }
}

/// Sanitizes one path component.
///
/// - Replaces NUL, `/`, `\`, and control characters with `_`
/// - Trims leading/trailing dots and underscores, so `..` cannot escape the base dir
/// - Limits length to 200 bytes, leaving room for the extension under NAME_MAX
pub fn sanitize_component(name: &str) -> String {
    const MAX_COMPONENT: usize = 200;

    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.' || c == '_');

    if trimmed.len() > MAX_COMPONENT {
        let mut take = MAX_COMPONENT;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, format: &str) -> WorkItem {
        WorkItem::new(key, format, "https://x/", 1)
    }

    #[test]
    fn unsharded_path_is_base_key_format() {
        let layout = OutputLayout::new("/media", 10, 10, 5);
        assert!(!layout.is_sharded());
        assert_eq!(
            layout.path_for(7, &item("abc", "jpg")),
            PathBuf::from("/media/abc.jpg")
        );
        assert_eq!(layout.shard_number(7), None);
    }

    #[test]
    fn sharded_when_total_exceeds_threshold() {
        let layout = OutputLayout::new("/media", 11, 10, 5);
        assert!(layout.is_sharded());
        assert_eq!(layout.shard_number(0), Some(1));
        assert_eq!(layout.shard_number(4), Some(1));
        assert_eq!(layout.shard_number(5), Some(2));
        assert_eq!(layout.shard_number(10), Some(3));
        assert_eq!(
            layout.path_for(5, &item("k", "mp4")),
            PathBuf::from("/media/2/k.mp4")
        );
    }

    #[test]
    fn shard_depends_only_on_index() {
        let layout = OutputLayout::new("out", 25_000, 10_000, 10_000);
        let mut it = item("same", "jpg");
        let before = layout.path_for(12_345, &it);
        it.status = crate::ledger::ItemStatus::Done;
        it.attempts = 9;
        assert_eq!(layout.path_for(12_345, &it), before);
        assert_eq!(before, PathBuf::from("out/2/same.jpg"));
    }

    #[test]
    fn hostile_keys_stay_inside_base() {
        let layout = OutputLayout::new("/media", 1, 10, 5);
        assert_eq!(
            layout.path_for(0, &item("../../etc/passwd", "jpg")),
            PathBuf::from("/media/etc_passwd.jpg")
        );
        assert_eq!(
            layout.path_for(3, &item("..", "")),
            PathBuf::from("/media/item-3")
        );
    }

    #[test]
    fn sanitize_replaces_separators_and_controls() {
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component("x\x00y"), "x_y");
        assert_eq!(sanitize_component("  .hidden. "), "hidden");
    }
}
