//! Deterministic candidate ordering.
//!
//! Multi-expert merges pull the "top 3" candidate folders, so their order
//! has to be reproducible across machines and runs. The ranking key is the
//! pinyin initial (A..Z) of the first CJK character in the name; names
//! with no determinable initial get a sentinel that sorts after every
//! letter, and ties break on the raw name. The order is a pure function of
//! names, never of enumeration order, mtime, or the process locale.

use std::path::PathBuf;

use pinyin::ToPinyin;

/// Sentinel ranking key: `'{'` is the ASCII character after `'Z'`/`'z'`
/// case-folded range end, so undetermined initials sort last.
const UNDETERMINED: char = '{';

/// The pinyin initial (uppercase A..Z) of the first CJK character in `s`,
/// or the sentinel when there is none or romanization yields nothing.
pub fn pinyin_initial(s: &str) -> char {
    let Some(ch) = s.chars().find(|c| ('\u{4e00}'..='\u{9fff}').contains(c)) else {
        return UNDETERMINED;
    };

    match ch.to_pinyin() {
        Some(p) => {
            let initial = p
                .first_letter()
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase());
            match initial {
                Some(c) if c.is_ascii_uppercase() => c,
                _ => UNDETERMINED,
            }
        }
        None => UNDETERMINED,
    }
}

/// Sort candidate paths by (pinyin initial of file name, raw file name).
pub fn sort_candidates(mut candidates: Vec<PathBuf>) -> Vec<PathBuf> {
    candidates.sort_by_key(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (pinyin_initial(&name), name)
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initials_romanize_first_cjk_char() {
        assert_eq!(pinyin_initial("张三"), 'Z');
        assert_eq!(pinyin_initial("李四"), 'L');
        assert_eq!(pinyin_initial("王五"), 'W');
        // Leading Latin characters are skipped.
        assert_eq!(pinyin_initial("03-陈某"), 'C');
    }

    #[test]
    fn no_cjk_maps_to_sentinel_after_z() {
        let sentinel = pinyin_initial("expert-a");
        assert_eq!(sentinel, '{');
        assert!(sentinel > 'Z');
    }

    #[test]
    fn order_is_independent_of_input_permutation() {
        let names = ["张三", "李四", "王五", "陈六"];
        let expected: Vec<PathBuf> = ["陈六", "李四", "王五", "张三"]
            .iter()
            .map(PathBuf::from)
            .collect();

        // Every permutation of the input must produce the same order.
        let perms: Vec<Vec<&str>> = vec![
            names.to_vec(),
            vec![names[3], names[2], names[1], names[0]],
            vec![names[1], names[3], names[0], names[2]],
        ];
        for perm in perms {
            let sorted = sort_candidates(perm.iter().map(PathBuf::from).collect());
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn equal_initials_tie_break_on_raw_name() {
        // 张 and 周 both romanize to Z.
        let sorted = sort_candidates(vec![PathBuf::from("周九"), PathBuf::from("张三")]);
        let names: Vec<_> = sorted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        // Same initial Z, so raw-name lexicographic order decides.
        let mut expected = vec!["周九".to_string(), "张三".to_string()];
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn undetermined_sorts_after_every_real_initial() {
        let sorted = sort_candidates(vec![
            PathBuf::from("no-cjk-here"),
            PathBuf::from("张三"),
            PathBuf::from("安一"),
        ]);
        let names: Vec<_> = sorted
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["安一", "张三", "no-cjk-here"]);
    }
}
