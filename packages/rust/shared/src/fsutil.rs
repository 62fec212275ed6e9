//! Filesystem helpers shared by the pipeline crates.
//!
//! Collision handling is uniform everywhere: a destination that already
//! exists gets a ` (n)` suffix probe, never an overwrite.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TenderfoldError};

/// Image extensions copied verbatim into the output directory.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Return `target` if free, otherwise the first free `<stem> (n).<ext>`
/// sibling, probing n = 1, 2, ...
pub fn unique_path(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }

    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|s| s.to_string_lossy().into_owned());

    let mut i = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

/// Move a file or directory to `dst`, suffixing on collision.
///
/// `fs::rename` first; falls back to copy + remove for files when the
/// rename fails (e.g. across filesystems). Returns the actual destination.
pub fn move_entry(src: &Path, dst: &Path) -> Result<PathBuf> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenderfoldError::io(parent, e))?;
    }

    let target = unique_path(dst);
    match std::fs::rename(src, &target) {
        Ok(()) => {}
        Err(rename_err) => {
            if src.is_file() {
                std::fs::copy(src, &target).map_err(|e| TenderfoldError::io(&target, e))?;
                std::fs::remove_file(src).map_err(|e| TenderfoldError::io(src, e))?;
            } else {
                return Err(TenderfoldError::io(src, rename_err));
            }
        }
    }

    debug!(src = %src.display(), dst = %target.display(), "moved entry");
    Ok(target)
}

/// Whether a string contains at least one CJK unified ideograph.
pub fn has_cjk(s: &str) -> bool {
    s.chars().any(|ch| ('\u{4e00}'..='\u{9fff}').contains(&ch))
}

/// Whether a path looks like an auxiliary image file.
pub fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}
