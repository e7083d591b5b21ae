//! Path filtering for search: glob patterns when the filter contains glob
//! metacharacters, prefix semantics otherwise.

use crate::error::{Error, Result};
use globset::{Glob, GlobMatcher};

#[derive(Debug)]
enum Matcher {
    Glob(GlobMatcher),
    Prefix(String),
}

/// A compiled set of path filters. An empty set matches everything.
#[derive(Debug)]
pub struct PathFilter {
    matchers: Vec<Matcher>,
}

fn is_glob(filter: &str) -> bool {
    filter.chars().any(|c| matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '!'))
}

impl PathFilter {
    pub fn new(filters: &[String]) -> Result<Self> {
        let mut matchers = Vec::with_capacity(filters.len());
        for filter in filters {
            let filter = crate::types::sanitize_path(filter.trim().trim_matches('/'));
            if filter.is_empty() {
                continue;
            }
            if is_glob(&filter) {
                let glob = Glob::new(&filter)
                    .map_err(|e| Error::Validation(format!("invalid path glob '{filter}': {e}")))?;
                matchers.push(Matcher::Glob(glob.compile_matcher()));
            } else {
                matchers.push(Matcher::Prefix(filter));
            }
        }
        Ok(PathFilter { matchers })
    }

    /// True when the path passes the filter set.
    pub fn matches(&self, filepath: &str) -> bool {
        if self.matchers.is_empty() {
            return true;
        }
        let path = crate::types::sanitize_path(filepath);
        self.matchers.iter().any(|m| match m {
            Matcher::Glob(glob) => glob.is_match(&path),
            Matcher::Prefix(prefix) => {
                path == *prefix
                    || path.starts_with(&format!("{prefix}/"))
                    || path.contains(&format!("/{prefix}/"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> PathFilter {
        PathFilter::new(&patterns.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_empty_matches_everything() {
        assert!(filter(&[]).matches("any/path.ts"));
    }

    #[test]
    fn test_prefix_semantics() {
        let f = filter(&["src"]);
        assert!(f.matches("src"));
        assert!(f.matches("src/auth/login.ts"));
        assert!(f.matches("packages/app/src/main.ts"));
        assert!(!f.matches("srcdir/file.ts"));
    }

    #[test]
    fn test_segment_prefix() {
        let f = filter(&["auth"]);
        assert!(f.matches("src/auth/login.ts"));
        assert!(!f.matches("src/author/profile.ts"));
    }

    #[test]
    fn test_glob_patterns() {
        let f = filter(&["src/**/*.ts"]);
        assert!(f.matches("src/auth/login.ts"));
        assert!(!f.matches("docs/readme.md"));
    }

    #[test]
    fn test_invalid_glob_is_validation_error() {
        let err = PathFilter::new(&["[".to_string()]).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_multiple_filters_union() {
        let f = filter(&["docs", "*.rs"]);
        assert!(f.matches("docs/guide.md"));
        assert!(f.matches("main.rs"));
        assert!(!f.matches("src/app.ts"));
    }
}
