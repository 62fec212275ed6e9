//! Project root discovery.
//!
//! A project root is any directory that directly owns the marker
//! subdirectory (`12` by default). Discovery looks in two directions from
//! the scan root: upward through every ancestor, and (in recursive mode)
//! downward through the whole subtree. Alias paths (the marker directory
//! itself, or the data directory beneath it) are folded to the owning
//! root before insertion, so each project is reported exactly once.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use tenderfold_shared::{LayoutConfig, ProjectRoot, Result, TenderfoldError};

/// Fold alias paths onto the project root they belong to.
///
/// - `<root>/<marker>/<data>` → `<root>`
/// - `<root>/<marker>` → `<root>`
/// - anything else is returned unchanged.
pub fn normalize_project_root(path: &Path, layout: &LayoutConfig) -> PathBuf {
    let name = path.file_name().and_then(|n| n.to_str());

    match name {
        Some(n) if n == layout.data_dir => {
            let parent_is_marker = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == layout.marker_dir);
            if parent_is_marker {
                if let Some(grandparent) = path.parent().and_then(Path::parent) {
                    return grandparent.to_path_buf();
                }
            }
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
        }
        Some(n) if n == layout.marker_dir => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Find every project root reachable from `scan_root`.
///
/// Checks `scan_root` and all of its ancestors for a marker subdirectory,
/// then (if `recursive`) walks the subtree collecting the parent of every
/// marker directory found. The result is deduplicated and sorted
/// lexicographically so batch runs are reproducible.
#[instrument(skip_all, fields(root = %scan_root.display(), recursive))]
pub fn find_project_roots(
    scan_root: &Path,
    recursive: bool,
    layout: &LayoutConfig,
) -> Result<Vec<ProjectRoot>> {
    if !scan_root.is_dir() {
        return Err(TenderfoldError::validation(format!(
            "scan root is not a directory: {}",
            scan_root.display()
        )));
    }

    let start = normalize_project_root(scan_root, layout);
    let mut roots: BTreeSet<PathBuf> = BTreeSet::new();

    // Upward: the scan root and each ancestor can itself be a project root.
    let mut cursor = Some(start.as_path());
    while let Some(dir) = cursor {
        if dir.join(&layout.marker_dir).is_dir() {
            roots.insert(normalize_project_root(dir, layout));
        }
        cursor = dir.parent();
    }

    // Downward: every marker directory in the subtree marks its parent.
    if recursive {
        for entry in WalkDir::new(&start).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir()
                && entry.file_name().to_str() == Some(layout.marker_dir.as_str())
            {
                if let Some(parent) = entry.path().parent() {
                    roots.insert(normalize_project_root(parent, layout));
                }
            }
        }
    }

    debug!(count = roots.len(), "project roots discovered");
    let roots: Vec<ProjectRoot> = roots.into_iter().map(ProjectRoot::new).collect();
    info!(count = roots.len(), "discovery complete");
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LayoutConfig {
        LayoutConfig::default()
    }

    /// `<base>/proj/12/开评标资料` with the data area populated.
    fn make_project(base: &Path, name: &str) -> PathBuf {
        let root = base.join(name);
        std::fs::create_dir_all(root.join("12").join("开评标资料")).unwrap();
        root
    }

    #[test]
    fn alias_paths_fold_to_one_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_project(tmp.path(), "proj");
        let layout = layout();

        let from_marker = normalize_project_root(&root.join("12"), &layout);
        let from_data = normalize_project_root(&root.join("12").join("开评标资料"), &layout);
        let from_root = normalize_project_root(&root, &layout);

        assert_eq!(from_marker, root);
        assert_eq!(from_data, root);
        assert_eq!(from_root, root);
    }

    #[test]
    fn discovery_reports_each_project_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_project(tmp.path(), "proj");
        let layout = layout();

        // Scanning from the root, the marker dir, and the data dir must all
        // yield the same single project.
        for scan in [
            root.clone(),
            root.join("12"),
            root.join("12").join("开评标资料"),
        ] {
            let found = find_project_roots(&scan, true, &layout).unwrap();
            assert_eq!(found.len(), 1, "scan from {}", scan.display());
            assert_eq!(found[0].path(), root);
        }
    }

    #[test]
    fn recursive_discovery_finds_nested_projects_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        let b = make_project(tmp.path(), "beta");
        let a = make_project(tmp.path(), "alpha");
        // A project nested inside an unrelated folder.
        let nested = make_project(&tmp.path().join("batch"), "gamma");

        let found = find_project_roots(tmp.path(), true, &layout()).unwrap();
        let paths: Vec<_> = found.iter().map(|r| r.path().to_path_buf()).collect();
        assert_eq!(paths, vec![a, tmp.path().join("batch").join("gamma"), b]);
        assert_eq!(nested, paths[1]);
    }

    #[test]
    fn non_recursive_skips_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        make_project(tmp.path(), "proj");

        let found = find_project_roots(tmp.path(), false, &layout()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn missing_scan_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = find_project_roots(&tmp.path().join("nope"), true, &layout()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
