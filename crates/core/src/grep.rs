//! Grep-style literal search with line-accurate occurrences and context.
//!
//! Each file is scanned independently (in parallel); per-file match counts
//! cover the whole file even when the reported occurrences are capped.

use crate::types::{file_extension, is_binary_extension, MAX_FILE_READ};
use rayon::prelude::*;
use serde::Serialize;

/// Options for [`search_files`].
#[derive(Debug, Clone)]
pub struct SimpleSearchOptions {
    pub case_insensitive: bool,
    /// Maximum number of files reported.
    pub max_files: usize,
    /// Maximum occurrences reported per file; counting is unaffected.
    pub max_occurrences_per_file: usize,
    /// Context lines on each side of an occurrence.
    pub context_lines: usize,
}

impl Default for SimpleSearchOptions {
    fn default() -> Self {
        SimpleSearchOptions {
            case_insensitive: false,
            max_files: 20,
            max_occurrences_per_file: 5,
            context_lines: 1,
        }
    }
}

/// One matching line with its surrounding context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// 1-based.
    pub line_number: usize,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// All matches within one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMatches {
    pub filepath: String,
    /// Total occurrences in the file, not capped.
    pub match_count: usize,
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSearchResult {
    pub files: Vec<FileMatches>,
    /// Sum of match counts across all matching files.
    pub total_matches: usize,
    /// True when more files matched than `max_files` allowed reporting.
    pub truncated: bool,
}

/// A file is searchable when it is plain text of reasonable size: no NUL
/// bytes, at most 1 MiB, and not a known binary extension.
pub fn is_searchable(filepath: &str, content: &str) -> bool {
    !is_binary_extension(file_extension(filepath))
        && content.len() as u64 <= MAX_FILE_READ
        && !content.contains('\0')
}

fn count_in_line(line: &str, literal: &str, case_insensitive: bool) -> usize {
    if case_insensitive {
        line.to_lowercase().matches(&literal.to_lowercase()).count()
    } else {
        line.matches(literal).count()
    }
}

/// Scan the given (path, content) pairs for exact occurrences of a literal.
pub fn search_files(
    files: &[(String, String)],
    literal: &str,
    opts: &SimpleSearchOptions,
) -> SimpleSearchResult {
    if literal.is_empty() {
        return SimpleSearchResult { files: Vec::new(), total_matches: 0, truncated: false };
    }

    let mut matched: Vec<FileMatches> = files
        .par_iter()
        .filter(|(path, content)| is_searchable(path, content))
        .filter_map(|(path, content)| {
            let lines: Vec<&str> = content.lines().collect();
            let mut match_count = 0usize;
            let mut occurrences = Vec::new();

            for (i, line) in lines.iter().enumerate() {
                let hits = count_in_line(line, literal, opts.case_insensitive);
                if hits == 0 {
                    continue;
                }
                match_count += hits;
                if occurrences.len() < opts.max_occurrences_per_file {
                    let before_start = i.saturating_sub(opts.context_lines);
                    let after_end = (i + 1 + opts.context_lines).min(lines.len());
                    occurrences.push(Occurrence {
                        line_number: i + 1,
                        line: line.to_string(),
                        context_before: lines[before_start..i]
                            .iter()
                            .map(|l| l.to_string())
                            .collect(),
                        context_after: lines[i + 1..after_end]
                            .iter()
                            .map(|l| l.to_string())
                            .collect(),
                    });
                }
            }

            if match_count == 0 {
                None
            } else {
                Some(FileMatches { filepath: path.clone(), match_count, occurrences })
            }
        })
        .collect();

    matched.sort_by(|a, b| {
        b.match_count.cmp(&a.match_count).then_with(|| a.filepath.cmp(&b.filepath))
    });

    let total_matches = matched.iter().map(|f| f.match_count).sum();
    let truncated = matched.len() > opts.max_files;
    matched.truncate(opts.max_files);

    SimpleSearchResult { files: matched, total_matches, truncated }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(p, c)| (p.to_string(), c.to_string())).collect()
    }

    #[test]
    fn test_counts_across_whole_file_with_capped_occurrences() {
        let content = (0..10).map(|i| format!("use TARGET here {i}")).collect::<Vec<_>>().join("\n");
        let fs = files(&[("src/a.ts", &content)]);
        let opts = SimpleSearchOptions { max_occurrences_per_file: 3, ..Default::default() };
        let result = search_files(&fs, "TARGET", &opts);
        assert_eq!(result.files[0].match_count, 10);
        assert_eq!(result.files[0].occurrences.len(), 3);
        assert_eq!(result.total_matches, 10);
    }

    #[test]
    fn test_auth_service_url_scenario() {
        // config.ts: one literal defining line plus a lowercase mention that
        // is not an exact match; client.ts: two literal uses.
        let config = "export const AUTH_SERVICE_URL = env.AUTH;\n// lowercase auth_service_url note\n";
        let client = "fetch(AUTH_SERVICE_URL);\nretry(AUTH_SERVICE_URL);\n";
        let fs = files(&[("config.ts", config), ("client.ts", client)]);
        let result = search_files(&fs, "AUTH_SERVICE_URL", &SimpleSearchOptions::default());

        assert_eq!(result.total_matches, 3);
        // Sorted by match count descending.
        assert_eq!(result.files[0].filepath, "client.ts");
        assert_eq!(result.files[0].match_count, 2);
        assert_eq!(result.files[1].filepath, "config.ts");
        assert_eq!(result.files[1].match_count, 1);
        assert!(!result.truncated);
    }

    #[test]
    fn test_case_insensitive_option() {
        let fs = files(&[("a.ts", "const authServiceUrl = 1;\n")]);
        let sensitive = search_files(&fs, "AUTHSERVICEURL", &SimpleSearchOptions::default());
        assert!(sensitive.files.is_empty());
        let insensitive = search_files(
            &fs,
            "AUTHSERVICEURL",
            &SimpleSearchOptions { case_insensitive: true, ..Default::default() },
        );
        assert_eq!(insensitive.total_matches, 1);
    }

    #[test]
    fn test_context_lines() {
        let fs = files(&[("a.ts", "before\nHIT\nafter\n")]);
        let result = search_files(&fs, "HIT", &SimpleSearchOptions::default());
        let occ = &result.files[0].occurrences[0];
        assert_eq!(occ.line_number, 2);
        assert_eq!(occ.context_before, vec!["before"]);
        assert_eq!(occ.context_after, vec!["after"]);
    }

    #[test]
    fn test_unsearchable_files_skipped() {
        let nul = "data\0binary".to_string();
        let big = "x".repeat((MAX_FILE_READ + 1) as usize);
        let fs = vec![
            ("img.png".to_string(), "TARGET".to_string()),
            ("nul.ts".to_string(), format!("TARGET {nul}")),
            ("big.ts".to_string(), format!("TARGET {big}")),
            ("ok.ts".to_string(), "TARGET".to_string()),
        ];
        let result = search_files(&fs, "TARGET", &SimpleSearchOptions::default());
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].filepath, "ok.ts");
    }

    #[test]
    fn test_truncated_flag() {
        let fs: Vec<(String, String)> =
            (0..5).map(|i| (format!("f{i}.ts"), "TARGET".to_string())).collect();
        let opts = SimpleSearchOptions { max_files: 3, ..Default::default() };
        let result = search_files(&fs, "TARGET", &opts);
        assert!(result.truncated);
        assert_eq!(result.files.len(), 3);
        // Totals still cover every matching file.
        assert_eq!(result.total_matches, 5);
    }
}
