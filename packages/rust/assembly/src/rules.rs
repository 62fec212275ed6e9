//! The static artifact rule table.
//!
//! Maps "marker folder index → expected source artifact(s) → canonical
//! output name" as data instead of control flow: the driver consumes the
//! table uniformly, so adding or changing a mapping is a table edit.
//!
//! Output slots are numbered 1..18; slots 3 and 6 are retired (they
//! belonged to image-to-document handling that was dropped upstream).

/// How a rule's source artifact(s) are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelector {
    /// A file at the project root, moved as-is.
    RootFile {
        /// Exact file name at the project root.
        file_name: &'static str,
    },
    /// A file at the project root, run through the document converter.
    RootConvert {
        /// Exact file name at the project root.
        file_name: &'static str,
    },
    /// An exactly-named file inside numbered folder `folder`.
    NumberedFile {
        /// Numbered source folder under the data area.
        folder: u32,
        /// Exact file name inside that folder.
        file_name: &'static str,
    },
    /// The top-K ranked CJK-named candidate subfolders of numbered folder
    /// `folder`, each contributing its first PDF, composed in rank order
    /// with an optional fixed trailing document.
    RankedMerge {
        /// Numbered source folder under the data area.
        folder: u32,
        /// Fixed trailing document appended after the ranked candidates.
        tail: Option<&'static str>,
    },
}

/// One entry of the rule table.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRule {
    /// Where the source artifact(s) come from.
    pub selector: SourceSelector,
    /// Canonical output file name in the output directory.
    pub output_name: &'static str,
}

/// The full rule table, in application order.
pub fn rule_table() -> &'static [ArtifactRule] {
    RULES
}

static RULES: &[ArtifactRule] = &[
    // Root-level files, moved and renamed into slots 1/2/5.
    ArtifactRule {
        selector: SourceSelector::RootFile { file_name: "1.pdf" },
        output_name: "1.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::RootFile { file_name: "6.pdf" },
        output_name: "2.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::RootFile { file_name: "8.pdf" },
        output_name: "5.pdf",
    },
    // Root-level DOCX converted into slot 4.
    ArtifactRule {
        selector: SourceSelector::RootConvert {
            file_name: "7.docx",
        },
        output_name: "4.pdf",
    },
    // Numbered folders 1/2: exactly-named sign-in sheet and declaration.
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 1,
            file_name: "评标委员会成员签到表.pdf",
        },
        output_name: "7评标委员会成员签到表.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 2,
            file_name: "评标委员会声明书.pdf",
        },
        output_name: "8评标委员会声明书.pdf",
    },
    // Folders 3/4: per-expert merges with a mandatory trailing summary.
    ArtifactRule {
        selector: SourceSelector::RankedMerge {
            folder: 3,
            tail: Some("初步评审标准及记录表.pdf"),
        },
        output_name: "9.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::RankedMerge {
            folder: 4,
            tail: Some("初步评审标准及记录表（其他情况）.pdf"),
        },
        output_name: "10.pdf",
    },
    // Folder 5: exactly-named rejection summary.
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 5,
            file_name: "未通过初步评审等情况汇总表.pdf",
        },
        output_name: "11未通过初步评审等情况汇总表.pdf",
    },
    // Folders 6/7/8: plain per-expert merges.
    ArtifactRule {
        selector: SourceSelector::RankedMerge {
            folder: 6,
            tail: None,
        },
        output_name: "12.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::RankedMerge {
            folder: 7,
            tail: None,
        },
        output_name: "13.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::RankedMerge {
            folder: 8,
            tail: None,
        },
        output_name: "14.pdf",
    },
    // Folders 9..12: exactly-named summary tables and the final report.
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 9,
            file_name: "投标报价得分汇总表.pdf",
        },
        output_name: "15投标报价得分汇总表.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 10,
            file_name: "评分汇总及得分记录表.pdf",
        },
        output_name: "16评分汇总及得分记录表.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 11,
            file_name: "承包商排序表.pdf",
        },
        output_name: "17承包商排序表.pdf",
    },
    ArtifactRule {
        selector: SourceSelector::NumberedFile {
            folder: 12,
            file_name: "评审报告.pdf",
        },
        output_name: "18评审报告.pdf",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn output_names_are_unique() {
        let names: HashSet<_> = rule_table().iter().map(|r| r.output_name).collect();
        assert_eq!(names.len(), rule_table().len());
    }

    #[test]
    fn every_numbered_folder_is_covered() {
        let folders: HashSet<u32> = rule_table()
            .iter()
            .filter_map(|r| match r.selector {
                SourceSelector::NumberedFile { folder, .. }
                | SourceSelector::RankedMerge { folder, .. } => Some(folder),
                _ => None,
            })
            .collect();
        assert_eq!(folders, (1..=12).collect());
    }

    #[test]
    fn merges_with_tails_are_folders_3_and_4() {
        let tailed: Vec<u32> = rule_table()
            .iter()
            .filter_map(|r| match r.selector {
                SourceSelector::RankedMerge {
                    folder,
                    tail: Some(_),
                } => Some(folder),
                _ => None,
            })
            .collect();
        assert_eq!(tailed, vec![3, 4]);
    }
}
