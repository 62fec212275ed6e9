//! Output-directory deduplication.
//!
//! Runs last, over exactly one output directory at a time. Two passes:
//!
//! 1. Content equality: files are grouped by SHA-256; within a group one
//!    canonical file is kept (prefer no ` (n)` suffix, then shorter name,
//!    then lexicographically smaller) and the rest are deleted.
//! 2. Name-pattern collision: any surviving `<base> (n).<ext>` whose
//!    sibling `<base>.<ext>` exists is deleted even when contents differ:
//!    a numbered variant of a canonically-named file is always superseded.
//!
//! Both passes only touch the fixed set of target extensions. Running the
//! whole thing twice is a no-op.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use tenderfold_shared::{ContentDigest, Result, TenderfoldError};

/// Extensions considered for deduplication (documents + images).
const TARGET_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Matches a stem carrying a parenthesized numeric suffix: `report (2)`.
static SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<base>.+) \((?P<n>\d+)\)$").expect("valid regex"));

/// What a dedup run did.
#[derive(Debug, Default, Clone)]
pub struct DedupReport {
    /// Files deleted because their content matched a kept file.
    pub content_duplicates_removed: usize,
    /// Files deleted because a canonically-named sibling exists.
    pub suffix_collisions_removed: usize,
}

impl DedupReport {
    /// Total number of deletions.
    pub fn total_removed(&self) -> usize {
        self.content_duplicates_removed + self.suffix_collisions_removed
    }
}

/// Deduplicate one output directory. Idempotent.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn dedup_dir(dir: &Path) -> Result<DedupReport> {
    let mut report = DedupReport::default();
    if !dir.is_dir() {
        return Ok(report);
    }

    let files = target_files(dir)?;

    // Pass 1: collapse byte-identical files.
    let mut groups: HashMap<ContentDigest, Vec<PathBuf>> = HashMap::new();
    for file in &files {
        match ContentDigest::of_file(file) {
            Ok(digest) => groups.entry(digest).or_default().push(file.clone()),
            Err(e) => warn!(file = %file.display(), error = %e, "hash failed, file left alone"),
        }
    }

    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|p| keep_rank(p));
        let keep = group[0].clone();
        for dup in &group[1..] {
            match std::fs::remove_file(dup) {
                Ok(()) => {
                    debug!(removed = %dup.display(), kept = %keep.display(), "content duplicate");
                    report.content_duplicates_removed += 1;
                }
                Err(e) => warn!(file = %dup.display(), error = %e, "delete failed"),
            }
        }
    }

    // Pass 2: a numbered variant next to its canonical name is superseded
    // regardless of content.
    for file in target_files(dir)? {
        let Some(canonical) = canonical_sibling(&file) else {
            continue;
        };
        if canonical.exists() {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    debug!(removed = %file.display(), kept = %canonical.display(), "suffix collision");
                    report.suffix_collisions_removed += 1;
                }
                Err(e) => warn!(file = %file.display(), error = %e, "delete failed"),
            }
        }
    }

    info!(
        content = report.content_duplicates_removed,
        suffix = report.suffix_collisions_removed,
        "dedup complete"
    );
    Ok(report)
}

/// Snapshot the directory's target files (non-recursive, sorted for
/// deterministic processing).
fn target_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| TenderfoldError::io(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| TARGET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Keep preference within an equal-content group: unsuffixed first, then
/// shorter name, then lexicographically smaller.
fn keep_rank(path: &Path) -> (bool, usize, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (SUFFIX_RE.is_match(&stem), name.len(), name)
}

/// For `<base> (n).<ext>`, the sibling `<base>.<ext>` path; `None` for
/// anything not matching the suffix pattern.
fn canonical_sibling(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?;
    let caps = SUFFIX_RE.captures(stem)?;
    let base = caps.name("base")?.as_str();
    Some(path.with_file_name(format!("{base}.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_keeps_unsuffixed_name() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("report.pdf"), b"same").unwrap();
        std::fs::write(tmp.path().join("report (1).pdf"), b"same").unwrap();

        let report = dedup_dir(tmp.path()).unwrap();
        assert_eq!(report.total_removed(), 1);
        assert!(tmp.path().join("report.pdf").exists());
        assert!(!tmp.path().join("report (1).pdf").exists());
    }

    #[test]
    fn dedup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("report.pdf"), b"same").unwrap();
        std::fs::write(tmp.path().join("report (1).pdf"), b"same").unwrap();

        dedup_dir(tmp.path()).unwrap();
        let second = dedup_dir(tmp.path()).unwrap();
        assert_eq!(second.total_removed(), 0);
        assert!(tmp.path().join("report.pdf").exists());
    }

    #[test]
    fn suffixed_variant_deleted_even_when_content_differs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("report.pdf"), b"content A").unwrap();
        std::fs::write(tmp.path().join("report (2).pdf"), b"content B").unwrap();

        let report = dedup_dir(tmp.path()).unwrap();
        assert_eq!(report.suffix_collisions_removed, 1);
        assert!(tmp.path().join("report.pdf").exists());
        assert!(!tmp.path().join("report (2).pdf").exists());
        assert_eq!(
            std::fs::read(tmp.path().join("report.pdf")).unwrap(),
            b"content A"
        );
    }

    #[test]
    fn suffixed_variant_without_canonical_sibling_survives() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("scan (1).jpg"), b"img").unwrap();

        let report = dedup_dir(tmp.path()).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert!(tmp.path().join("scan (1).jpg").exists());
    }

    #[test]
    fn non_target_extensions_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"same").unwrap();
        std::fs::write(tmp.path().join("notes (1).txt"), b"same").unwrap();

        let report = dedup_dir(tmp.path()).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert!(tmp.path().join("notes (1).txt").exists());
    }

    #[test]
    fn equal_content_tie_breaks_lexicographically() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.pdf"), b"same").unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"same").unwrap();

        dedup_dir(tmp.path()).unwrap();
        assert!(tmp.path().join("a.pdf").exists());
        assert!(!tmp.path().join("b.pdf").exists());
    }

    #[test]
    fn canonical_sibling_parsing() {
        assert_eq!(
            canonical_sibling(Path::new("/x/report (12).pdf")),
            Some(PathBuf::from("/x/report.pdf"))
        );
        assert_eq!(canonical_sibling(Path::new("/x/report.pdf")), None);
        assert_eq!(canonical_sibling(Path::new("/x/report (a).pdf")), None);
    }
}
