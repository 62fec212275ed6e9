//! Per-project assembly driver.
//!
//! One pass, linear stages, no backtracking: normalize the root, locate
//! the data area, probe the numbered source folders, decide where output
//! is staged, apply every rule of the table (a rule's failure never aborts
//! the pass), copy loose images, merge staged output up to the project
//! root, and drop the temp directory.
//!
//! A "complete" packet (all numbered folders present) is summarized in
//! place under the data area and lifted to the root at the end; an
//! incomplete one writes to the root from the start so no ambiguous
//! partial state lives under the data area.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use tenderfold_discovery::normalize_project_root;
use tenderfold_shared::{
    Capabilities, LayoutConfig, ProjectRoot, Result, TenderfoldError, fsutil,
};

use crate::compose::compose;
use crate::convert::DocumentConverter;
use crate::order::sort_candidates;
use crate::rules::{ArtifactRule, SourceSelector, rule_table};

/// Name of the per-project scratch directory, removed unconditionally at
/// the end of the pass.
const TMP_DIR_NAME: &str = ".tenderfold_tmp";

/// Result of one project pass.
#[derive(Debug, Clone)]
pub struct ProjectOutput {
    /// The processed project.
    pub project: ProjectRoot,
    /// The canonical output directory under the project root.
    pub output_dir: PathBuf,
}

/// Progress callback for batch runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when a project's pass begins.
    fn project_started(&self, project: &ProjectRoot);
    /// Called when an artifact rule produced its output.
    fn artifact_produced(&self, output_name: &str);
    /// Called when a project's pass completed.
    fn project_finished(&self, output: &ProjectOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn project_started(&self, _project: &ProjectRoot) {}
    fn artifact_produced(&self, _output_name: &str) {}
    fn project_finished(&self, _output: &ProjectOutput) {}
}

// ---------------------------------------------------------------------------
// Batch driver
// ---------------------------------------------------------------------------

/// Process every project in sequence, then deduplicate each produced
/// output directory.
///
/// One project's fatal condition never prevents the remaining projects
/// from being attempted.
pub fn run_batch(
    projects: &[ProjectRoot],
    layout: &LayoutConfig,
    caps: Capabilities,
    converter: Option<&dyn DocumentConverter>,
    progress: &dyn ProgressReporter,
) -> Vec<ProjectOutput> {
    let mut outputs = Vec::new();

    for project in projects {
        progress.project_started(project);
        match process_project(project, layout, caps, converter, progress) {
            Ok(output) => {
                progress.project_finished(&output);
                outputs.push(output);
            }
            Err(e) => {
                warn!(project = %project, error = %e, "project pass failed, continuing");
            }
        }
    }

    for output in &outputs {
        if let Err(e) = tenderfold_dedup::dedup_dir(&output.output_dir) {
            warn!(dir = %output.output_dir.display(), error = %e, "dedup failed");
        }
    }

    outputs
}

// ---------------------------------------------------------------------------
// Single-project pass
// ---------------------------------------------------------------------------

struct RuleContext<'a> {
    root: &'a Path,
    data_area: Option<&'a Path>,
    staging_dir: &'a Path,
    tmp_dir: &'a Path,
    layout: &'a LayoutConfig,
    caps: Capabilities,
    converter: Option<&'a dyn DocumentConverter>,
}

/// Run the full assembly pass for one project root.
#[instrument(skip_all, fields(project = %project))]
pub fn process_project(
    project: &ProjectRoot,
    layout: &LayoutConfig,
    caps: Capabilities,
    converter: Option<&dyn DocumentConverter>,
    progress: &dyn ProgressReporter,
) -> Result<ProjectOutput> {
    // Stage 1: normalize and locate the data area.
    let root = normalize_project_root(project.path(), layout);
    if !root.is_dir() {
        return Err(TenderfoldError::validation(format!(
            "project root is not a directory: {}",
            root.display()
        )));
    }
    let data_area = locate_data_area(&root, layout);
    match &data_area {
        Some(area) => info!(data_area = %area.display(), "data area located"),
        None => warn!(
            "no '{}' or '{}/{}' under project, root-level rules only",
            layout.marker_dir, layout.marker_dir, layout.data_dir
        ),
    }

    // Stage 2: probe the numbered folders.
    let missing = match data_area.as_deref() {
        Some(area) => missing_numbered_folders(area, layout),
        None => (1..=layout.complete_threshold).collect(),
    };
    let has_all = missing.is_empty();
    if !missing.is_empty() {
        warn!(?missing, "numbered folders missing, continuing with what exists");
    }

    // Stage 3: staging decision. A complete packet is summarized under the
    // data area first, then lifted to the root; anything less writes to the
    // root directly.
    let final_output = root.join(&layout.output_dir);
    let staging_dir = match (has_all, data_area.as_deref()) {
        (true, Some(area)) => area.join(&layout.output_dir),
        _ => final_output.clone(),
    };
    std::fs::create_dir_all(&staging_dir).map_err(|e| TenderfoldError::io(&staging_dir, e))?;
    info!(staging = %staging_dir.display(), "output staging decided");

    let tmp_dir = root.join(TMP_DIR_NAME);
    std::fs::create_dir_all(&tmp_dir).map_err(|e| TenderfoldError::io(&tmp_dir, e))?;

    let ctx = RuleContext {
        root: &root,
        data_area: data_area.as_deref(),
        staging_dir: &staging_dir,
        tmp_dir: &tmp_dir,
        layout,
        caps,
        converter,
    };

    // Stages 4-6, with the temp directory removed no matter what.
    let result = run_rule_stages(&ctx, &final_output, progress);
    let _ = std::fs::remove_dir_all(&tmp_dir);
    result?;

    info!(output = %final_output.display(), "project pass complete");
    Ok(ProjectOutput {
        project: ProjectRoot::new(root),
        output_dir: final_output,
    })
}

fn run_rule_stages(
    ctx: &RuleContext<'_>,
    final_output: &Path,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    // Stage 4: apply every rule; failures warn and move on.
    for rule in rule_table() {
        match apply_rule(rule, ctx) {
            Ok(true) => progress.artifact_produced(rule.output_name),
            Ok(false) => {}
            Err(e) => warn!(output = rule.output_name, error = %e, "rule failed, skipped"),
        }
    }

    // Stage 5: loose images, copied verbatim.
    copy_loose_images(ctx)?;

    // Stage 6: lift staged output to the project root if it was staged
    // under the data area.
    if ctx.staging_dir != final_output {
        merge_directories(ctx.staging_dir, final_output)?;
        let _ = std::fs::remove_dir_all(ctx.staging_dir);
        info!(dest = %final_output.display(), "staged output merged into project root");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Layout probing
// ---------------------------------------------------------------------------

/// Prefer `<root>/<marker>/<data>`; fall back to `<root>/<marker>`.
fn locate_data_area(root: &Path, layout: &LayoutConfig) -> Option<PathBuf> {
    let nested = root.join(&layout.marker_dir).join(&layout.data_dir);
    if nested.is_dir() {
        return Some(nested);
    }
    let marker = root.join(&layout.marker_dir);
    marker.is_dir().then_some(marker)
}

/// Numbered folder names absent anywhere under the data area.
fn missing_numbered_folders(data_area: &Path, layout: &LayoutConfig) -> Vec<u32> {
    let mut found = vec![false; layout.complete_threshold as usize];
    for entry in WalkDir::new(data_area).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(n) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        {
            if (1..=layout.complete_threshold).contains(&n) {
                found[(n - 1) as usize] = true;
            }
        }
    }
    (1..=layout.complete_threshold)
        .filter(|n| !found[(n - 1) as usize])
        .collect()
}

/// The numbered folder as a direct child of the data area, if it exists.
fn numbered_dir(data_area: &Path, n: u32) -> Option<PathBuf> {
    let dir = data_area.join(n.to_string());
    dir.is_dir().then_some(dir)
}

// ---------------------------------------------------------------------------
// Rule application
// ---------------------------------------------------------------------------

/// Apply one rule. `Ok(true)` means the artifact was produced, `Ok(false)`
/// means its inputs were missing (already warned). `Err` aborts only this
/// artifact.
fn apply_rule(rule: &ArtifactRule, ctx: &RuleContext<'_>) -> Result<bool> {
    match rule.selector {
        SourceSelector::RootFile { file_name } => {
            let src = ctx.root.join(file_name);
            if !src.is_file() {
                warn!(file = file_name, "root file not found");
                return Ok(false);
            }
            fsutil::move_entry(&src, &ctx.staging_dir.join(rule.output_name))?;
            Ok(true)
        }

        SourceSelector::RootConvert { file_name } => {
            let src = ctx.root.join(file_name);
            if !src.is_file() {
                warn!(file = file_name, "root document not found");
                return Ok(false);
            }
            if !ctx.caps.can_convert {
                warn!(file = file_name, "converter unavailable, artifact not produced");
                return Ok(false);
            }
            let Some(converter) = ctx.converter else {
                warn!(file = file_name, "no converter injected, artifact not produced");
                return Ok(false);
            };
            let converted = ctx.tmp_dir.join(rule.output_name);
            converter.convert(&src, &converted)?;
            fsutil::move_entry(&converted, &ctx.staging_dir.join(rule.output_name))?;
            Ok(true)
        }

        SourceSelector::NumberedFile { folder, file_name } => {
            let Some(dir) = ctx.data_area.and_then(|a| numbered_dir(a, folder)) else {
                warn!(folder, "numbered folder not found");
                return Ok(false);
            };
            let src = dir.join(file_name);
            if !src.is_file() {
                warn!(folder, file = file_name, "expected file not found");
                return Ok(false);
            }
            fsutil::move_entry(&src, &ctx.staging_dir.join(rule.output_name))?;
            Ok(true)
        }

        SourceSelector::RankedMerge { folder, tail } => {
            apply_ranked_merge(rule, folder, tail, ctx)
        }
    }
}

fn apply_ranked_merge(
    rule: &ArtifactRule,
    folder: u32,
    tail: Option<&'static str>,
    ctx: &RuleContext<'_>,
) -> Result<bool> {
    if !ctx.caps.can_compose {
        warn!(folder, "composition unavailable, merge skipped");
        return Ok(false);
    }
    let Some(dir) = ctx.data_area.and_then(|a| numbered_dir(a, folder)) else {
        warn!(folder, "numbered folder not found");
        return Ok(false);
    };

    // Candidates are the CJK-named subfolders; snapshot before ranking.
    let candidates: Vec<PathBuf> = read_dir_snapshot(&dir)?
        .into_iter()
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(fsutil::has_cjk)
        })
        .collect();
    let ranked = sort_candidates(candidates);

    let take = ctx.layout.top_candidates;
    if ranked.len() < take {
        warn!(
            folder,
            found = ranked.len(),
            need = take,
            "not enough candidate folders for merge"
        );
        return Ok(false);
    }

    let mut inputs: Vec<PathBuf> = Vec::with_capacity(take + 1);
    for candidate in ranked.iter().take(take) {
        let mut pdfs: Vec<PathBuf> = read_dir_snapshot(candidate)?
            .into_iter()
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        pdfs.sort();
        match pdfs.into_iter().next() {
            Some(pdf) => inputs.push(pdf),
            None => {
                warn!(folder, candidate = %candidate.display(), "candidate has no PDF");
                return Ok(false);
            }
        }
    }

    if let Some(tail_name) = tail {
        let tail_path = dir.join(tail_name);
        if !tail_path.is_file() {
            warn!(folder, tail = tail_name, "trailing document missing");
            return Ok(false);
        }
        inputs.push(tail_path);
    }

    let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    let merged = ctx.tmp_dir.join(rule.output_name);
    compose(&refs, &merged)?;
    fsutil::move_entry(&merged, &ctx.staging_dir.join(rule.output_name))?;
    debug!(folder, output = rule.output_name, "merge composed");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Loose images
// ---------------------------------------------------------------------------

/// Copy auxiliary image files from the project root and the data area into
/// the staging directory, skipping anything already inside it. The source
/// lists are snapshotted before any copy mutates the tree.
fn copy_loose_images(ctx: &RuleContext<'_>) -> Result<()> {
    let mut sources: Vec<PathBuf> = read_dir_snapshot(ctx.root)?
        .into_iter()
        .filter(|p| fsutil::is_image_file(p))
        .collect();

    if let Some(area) = ctx.data_area {
        let nested: Vec<PathBuf> = WalkDir::new(area)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| fsutil::is_image_file(p))
            .collect();
        sources.extend(nested);
    }

    let mut copied = 0usize;
    for src in sources {
        if src.starts_with(ctx.staging_dir) {
            continue;
        }
        let Some(name) = src.file_name() else { continue };
        let dst = fsutil::unique_path(&ctx.staging_dir.join(name));
        match std::fs::copy(&src, &dst) {
            Ok(_) => copied += 1,
            Err(e) => warn!(src = %src.display(), error = %e, "image copy failed"),
        }
    }
    if copied > 0 {
        info!(copied, "loose images copied");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Staged-output merge
// ---------------------------------------------------------------------------

/// Merge `src_dir` into `dst_dir`: same-named directories merge
/// child-by-child, everything else moves with rename-on-collision.
fn merge_directories(src_dir: &Path, dst_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dst_dir).map_err(|e| TenderfoldError::io(dst_dir, e))?;

    for entry in read_dir_snapshot(src_dir)? {
        let Some(name) = entry.file_name() else { continue };
        let target = dst_dir.join(name);

        if entry.is_dir() && target.is_dir() {
            merge_directories(&entry, &target)?;
            let _ = std::fs::remove_dir(&entry);
        } else {
            fsutil::move_entry(&entry, &target)?;
        }
    }
    Ok(())
}

/// Snapshot a directory's entries before mutating within the same subtree.
fn read_dir_snapshot(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| TenderfoldError::io(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::test_pdf;

    fn layout() -> LayoutConfig {
        LayoutConfig::default()
    }

    fn caps() -> Capabilities {
        Capabilities {
            can_compose: true,
            can_convert: false,
        }
    }

    /// A candidate subfolder holding one single-page PDF.
    fn add_candidate(folder: &Path, name: &str, text: &str) {
        let dir = folder.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        test_pdf::write_one_page(&dir.join("评审表.pdf"), text);
    }

    /// A merge folder with three candidates and an optional tail document.
    fn fill_merge_folder(data_area: &Path, n: u32, tail: Option<&str>) {
        let dir = data_area.join(n.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        add_candidate(&dir, "张三", &format!("zhang-{n}"));
        add_candidate(&dir, "李四", &format!("li-{n}"));
        add_candidate(&dir, "王五", &format!("wang-{n}"));
        if let Some(tail_name) = tail {
            test_pdf::write_one_page(&dir.join(tail_name), &format!("tail-{n}"));
        }
    }

    /// A numbered folder holding one exactly-named PDF.
    fn fill_single_folder(data_area: &Path, n: u32, file_name: &str) {
        let dir = data_area.join(n.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        test_pdf::write_one_page(&dir.join(file_name), &format!("single-{n}"));
    }

    /// Build a full packet: root files plus all 12 numbered folders.
    fn make_complete_project(base: &Path) -> PathBuf {
        let root = base.join("项目甲");
        let data_area = root.join("12").join("开评标资料");
        std::fs::create_dir_all(&data_area).unwrap();

        test_pdf::write_one_page(&root.join("1.pdf"), "root-1");
        test_pdf::write_one_page(&root.join("6.pdf"), "root-6");
        test_pdf::write_one_page(&root.join("8.pdf"), "root-8");

        fill_single_folder(&data_area, 1, "评标委员会成员签到表.pdf");
        fill_single_folder(&data_area, 2, "评标委员会声明书.pdf");
        fill_merge_folder(&data_area, 3, Some("初步评审标准及记录表.pdf"));
        fill_merge_folder(&data_area, 4, Some("初步评审标准及记录表（其他情况）.pdf"));
        fill_single_folder(&data_area, 5, "未通过初步评审等情况汇总表.pdf");
        fill_merge_folder(&data_area, 6, None);
        fill_merge_folder(&data_area, 7, None);
        fill_merge_folder(&data_area, 8, None);
        fill_single_folder(&data_area, 9, "投标报价得分汇总表.pdf");
        fill_single_folder(&data_area, 10, "评分汇总及得分记录表.pdf");
        fill_single_folder(&data_area, 11, "承包商排序表.pdf");
        fill_single_folder(&data_area, 12, "评审报告.pdf");

        root
    }

    #[test]
    fn complete_packet_produces_all_slots_at_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_complete_project(tmp.path());

        let output = process_project(
            &ProjectRoot::new(&root),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(output.output_dir, root.join("1"));
        for name in [
            "1.pdf",
            "2.pdf",
            "5.pdf",
            "7评标委员会成员签到表.pdf",
            "8评标委员会声明书.pdf",
            "9.pdf",
            "10.pdf",
            "11未通过初步评审等情况汇总表.pdf",
            "12.pdf",
            "13.pdf",
            "14.pdf",
            "15投标报价得分汇总表.pdf",
            "16评分汇总及得分记录表.pdf",
            "17承包商排序表.pdf",
            "18评审报告.pdf",
        ] {
            assert!(output.output_dir.join(name).is_file(), "missing {name}");
        }

        // Slot 4 needs the converter, which was not injected.
        assert!(!output.output_dir.join("4.pdf").exists());
        // The staged dir under the data area was lifted away.
        assert!(!root.join("12/开评标资料/1/1.pdf").exists());
        // Scratch dir is gone.
        assert!(!root.join(TMP_DIR_NAME).exists());
    }

    #[test]
    fn merge_preserves_rank_order_and_appends_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_complete_project(tmp.path());

        let output = process_project(
            &ProjectRoot::new(&root),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        let merged = lopdf::Document::load(output.output_dir.join("9.pdf")).unwrap();
        assert_eq!(merged.get_pages().len(), 4);

        // Pinyin rank: 李(L) < 王(W) < 张(Z), then the trailing summary.
        let texts: Vec<String> = (1..=4)
            .map(|n| merged.extract_text(&[n]).unwrap_or_default())
            .collect();
        assert!(texts[0].contains("li-3"));
        assert!(texts[1].contains("wang-3"));
        assert!(texts[2].contains("zhang-3"));
        assert!(texts[3].contains("tail-3"));
    }

    #[test]
    fn partial_packet_stages_at_root_and_keeps_going() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_complete_project(tmp.path());
        // Knock out four numbered folders.
        for n in [3, 6, 7, 12] {
            std::fs::remove_dir_all(root.join("12/开评标资料").join(n.to_string())).unwrap();
        }

        let output = process_project(
            &ProjectRoot::new(&root),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        // Satisfiable rules still produced artifacts...
        assert!(output.output_dir.join("1.pdf").is_file());
        assert!(output.output_dir.join("10.pdf").is_file());
        assert!(output.output_dir.join("17承包商排序表.pdf").is_file());
        // ...while rules over the removed folders did not.
        assert!(!output.output_dir.join("9.pdf").exists());
        assert!(!output.output_dir.join("12.pdf").exists());
        assert!(!output.output_dir.join("18评审报告.pdf").exists());
        // Incomplete packets never stage under the data area.
        assert!(!root.join("12/开评标资料/1/1.pdf").exists());
    }

    #[test]
    fn alias_path_is_normalized_before_processing() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_complete_project(tmp.path());

        let output = process_project(
            &ProjectRoot::new(root.join("12").join("开评标资料")),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        assert_eq!(output.output_dir, root.join("1"));
    }

    #[test]
    fn loose_images_are_copied_not_moved() {
        let tmp = tempfile::tempdir().unwrap();
        let root = make_complete_project(tmp.path());
        std::fs::write(root.join("现场照片.jpg"), b"jpeg-bytes").unwrap();

        let output = process_project(
            &ProjectRoot::new(&root),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        assert!(output.output_dir.join("现场照片.jpg").is_file());
        assert!(root.join("现场照片.jpg").is_file());
    }

    #[test]
    fn merge_without_enough_candidates_skips_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("proj");
        let data_area = root.join("12").join("开评标资料");
        let dir6 = data_area.join("6");
        std::fs::create_dir_all(&dir6).unwrap();
        add_candidate(&dir6, "张三", "only-one");

        let output = process_project(
            &ProjectRoot::new(&root),
            &layout(),
            caps(),
            None,
            &SilentProgress,
        )
        .unwrap();

        assert!(!output.output_dir.join("12.pdf").exists());
    }

    #[test]
    fn batch_continues_past_a_failing_project() {
        let tmp = tempfile::tempdir().unwrap();
        let good = make_complete_project(tmp.path());
        let bogus = ProjectRoot::new(tmp.path().join("does-not-exist"));

        let outputs = run_batch(
            &[bogus, ProjectRoot::new(&good)],
            &layout(),
            caps(),
            None,
            &SilentProgress,
        );

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output_dir, good.join("1"));
    }
}
