//! Exclusion rules applied while walking the server directory.

use glob::{MatchOptions, Pattern};

use crate::error::{BackupError, BackupResult};

/// `*` and `?` never cross a `/`, so `*.log` only matches top-level files
/// while `**/*.log` matches at any depth.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled exclusion rules for one archive run.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    include_logs: bool,
    patterns: Vec<Pattern>,
}

impl ExclusionRules {
    /// Compiles `patterns`; an invalid glob is a validation error.
    pub fn new(include_logs: bool, patterns: &[String]) -> BackupResult<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                Pattern::new(raw).map_err(|e| BackupError::InvalidPattern {
                    pattern: raw.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<BackupResult<Vec<_>>>()?;

        Ok(Self {
            include_logs,
            patterns,
        })
    }

    /// Whether the entry at `rel_path` (relative, `/`-separated) is skipped.
    ///
    /// Directories are also matched with a trailing `/`, so `cache/` excludes
    /// a directory named `cache` but not a file of that name.
    pub fn is_excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        if !self.include_logs && (rel_path == "logs" || rel_path.starts_with("logs/")) {
            return true;
        }

        let dir_form = if is_dir && !rel_path.ends_with('/') {
            Some(format!("{rel_path}/"))
        } else {
            None
        };

        self.patterns.iter().any(|pattern| {
            pattern.matches_with(rel_path, MATCH_OPTIONS)
                || dir_form
                    .as_deref()
                    .is_some_and(|dir| pattern.matches_with(dir, MATCH_OPTIONS))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(include_logs: bool, patterns: &[&str]) -> ExclusionRules {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ExclusionRules::new(include_logs, &owned).unwrap()
    }

    #[test]
    fn test_directory_pattern_needs_trailing_slash() {
        let rules = rules(true, &["cache/"]);
        assert!(rules.is_excluded("cache", true));
        assert!(!rules.is_excluded("cache", false));
        assert!(!rules.is_excluded("cachefile", false));
    }

    #[test]
    fn test_wildcards_stay_within_one_component() {
        let rules = rules(true, &["*.log", "**/*.tmp"]);
        assert!(rules.is_excluded("latest.log", false));
        assert!(!rules.is_excluded("world/latest.log", false));
        assert!(rules.is_excluded("world/region/r.0.0.tmp", false));
        assert!(!rules.is_excluded("keep.txt", false));
    }

    #[test]
    fn test_logs_directory_follows_include_flag() {
        let excluded = rules(false, &[]);
        assert!(excluded.is_excluded("logs", true));
        assert!(excluded.is_excluded("logs/latest.txt", false));
        assert!(!excluded.is_excluded("logsbook.txt", false));

        let included = rules(true, &[]);
        assert!(!included.is_excluded("logs", true));
        assert!(!included.is_excluded("logs/latest.txt", false));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ExclusionRules::new(false, &["[".to_string()]).unwrap_err();
        assert!(matches!(err, BackupError::InvalidPattern { ref pattern, .. } if pattern == "["));
    }
}
