//! Archive ingestion and outgoing bundle creation.
//!
//! Incoming bundles are zip files whose entry names may carry legacy
//! byte-oriented encodings: archivers on Chinese-locale Windows machines
//! commonly store GBK bytes without setting the UTF-8 flag. Extraction
//! recovers those names best-effort, defends against path-escaping
//! entries, and transparently unwraps a single enclosing folder.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use tenderfold_shared::{Result, TenderfoldError};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract a zip bundle into `dest_dir` and return the effective root.
///
/// If extraction yields exactly one top-level directory, that directory is
/// returned; otherwise `dest_dir` itself is. Entries that resolve outside
/// `dest_dir` are skipped with a warning, never written.
#[instrument(skip_all, fields(archive = %archive_path.display()))]
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(TenderfoldError::validation(format!(
            "archive does not exist or is not a file: {}",
            archive_path.display()
        )));
    }
    std::fs::create_dir_all(dest_dir).map_err(|e| TenderfoldError::io(dest_dir, e))?;

    let file = File::open(archive_path).map_err(|e| TenderfoldError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| TenderfoldError::archive(format!("{}: {e}", archive_path.display())))?;

    let mut extracted = 0usize;
    let mut skipped = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| TenderfoldError::archive(format!("entry {i}: {e}")))?;

        let declared = entry.name().to_string();
        let name = recover_entry_name(entry.name_raw(), &declared);

        let Some(out_path) = resolve_within(dest_dir, &name) else {
            warn!(entry = %name, "entry escapes destination root, skipped");
            skipped += 1;
            continue;
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| TenderfoldError::io(&out_path, e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TenderfoldError::io(parent, e))?;
            }
            let mut out =
                File::create(&out_path).map_err(|e| TenderfoldError::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out)
                .map_err(|e| TenderfoldError::io(&out_path, e))?;
            extracted += 1;
        }
    }

    info!(extracted, skipped, dest = %dest_dir.display(), "archive extracted");

    // A bundle wrapped in a single enclosing folder is unwrapped
    // transparently. Loose top-level files do not count against the
    // single-folder check.
    let top_dirs: Vec<PathBuf> = std::fs::read_dir(dest_dir)
        .map_err(|e| TenderfoldError::io(dest_dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    match top_dirs.as_slice() {
        [only] => Ok(only.clone()),
        _ => Ok(dest_dir.to_path_buf()),
    }
}

/// Recover an entry name from its raw bytes.
///
/// Valid UTF-8 is trusted as-is (covers entries with the UTF-8 flag).
/// Otherwise the raw bytes are reinterpreted as GBK. If that fails too we
/// silently fall back to the declared (CP437-decoded) name; some names
/// simply need no recovery.
fn recover_entry_name(raw: &[u8], declared: &str) -> String {
    if let Ok(utf8) = std::str::from_utf8(raw) {
        return utf8.to_string();
    }

    let (decoded, _, malformed) = encoding_rs::GBK.decode(raw);
    if !malformed {
        debug!(declared, recovered = %decoded, "recovered GBK entry name");
        return decoded.into_owned();
    }

    declared.to_string()
}

/// Join `name` onto `root`, rejecting anything that would escape it.
///
/// Returns `None` for absolute names or names containing parent references.
fn resolve_within(root: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    let mut out = root.to_path_buf();

    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    // The joined path must remain a descendant of the root.
    if out.starts_with(root) && out != root {
        Some(out)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Outgoing bundles
// ---------------------------------------------------------------------------

/// Bundle a set of per-project output directories into one zip.
///
/// Each `(label, dir)` pair lands under `<label>/` inside the archive so a
/// downstream consumer can tell the projects apart.
#[instrument(skip_all, fields(zip = %zip_path.display(), outputs = outputs.len()))]
pub fn bundle_outputs(outputs: &[(String, PathBuf)], zip_path: &Path) -> Result<()> {
    if outputs.is_empty() {
        warn!("no output directories to bundle, skipping");
        return Ok(());
    }
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenderfoldError::io(parent, e))?;
    }

    let file = File::create(zip_path).map_err(|e| TenderfoldError::io(zip_path, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    let mut count = 0usize;

    for (label, dir) in outputs {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "output directory missing, skipped");
            continue;
        }
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| TenderfoldError::archive(e.to_string()))?;
            let arc_name = format!("{label}/{}", rel.to_string_lossy().replace('\\', "/"));

            writer
                .start_file(arc_name, options)
                .map_err(|e| TenderfoldError::archive(e.to_string()))?;
            let mut src =
                File::open(entry.path()).map_err(|e| TenderfoldError::io(entry.path(), e))?;
            std::io::copy(&mut src, &mut writer)
                .map_err(|e| TenderfoldError::io(entry.path(), e))?;
            count += 1;
        }
    }

    writer
        .finish()
        .map_err(|e| TenderfoldError::archive(e.to_string()))?;
    info!(files = count, "outgoing bundle written");
    Ok(())
}
