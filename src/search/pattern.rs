//! Description of a text pattern search

use crate::error::{Result, SearchError};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Default number of file matches when the query does not set a count
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 30;

/// How a search may use the indexed backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Use the index where possible, fall back to unindexed search otherwise
    #[default]
    Yes,
    /// Never use the index
    No,
    /// Only use the index; fail instead of falling back
    Only,
}

/// What to look for and where
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPatternInfo {
    pub pattern: String,
    pub is_regexp: bool,
    pub is_case_sensitive: bool,
    pub is_negated: bool,
    pub pattern_matches_content: bool,
    pub pattern_matches_path: bool,
    /// Every file path must match all of these
    pub include_patterns: Vec<String>,
    /// File paths matching this are skipped
    pub exclude_pattern: Option<String>,
    pub path_patterns_are_case_sensitive: bool,
    /// Repositories must contain a file matching each of these
    pub file_patterns_repos_must_include: Vec<String>,
    /// Repositories must not contain a file matching any of these
    pub file_patterns_repos_must_exclude: Vec<String>,
    /// Zero means [`DEFAULT_MAX_SEARCH_RESULTS`]
    pub file_match_limit: usize,
    pub index: IndexMode,
    /// Let backends use all of the remaining request deadline
    pub use_full_deadline: bool,
}

impl TextPatternInfo {
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regexp: true,
            ..Self::default()
        }
    }

    pub fn effective_file_match_limit(&self) -> usize {
        if self.file_match_limit == 0 {
            DEFAULT_MAX_SEARCH_RESULTS
        } else {
            self.file_match_limit
        }
    }

    /// Whether the pattern applies to file contents and/or paths. Setting
    /// neither means both.
    pub fn targets(&self) -> (bool, bool) {
        match (self.pattern_matches_content, self.pattern_matches_path) {
            (false, false) => (true, true),
            other => other,
        }
    }

    /// The pattern compiled as a regular expression
    pub fn pattern_regex(&self) -> Result<Regex> {
        let source = if self.is_regexp {
            self.pattern.clone()
        } else {
            regex::escape(&self.pattern)
        };
        compile(&source, self.is_case_sensitive)
    }

    pub fn include_regexes(&self) -> Result<Vec<Regex>> {
        self.include_patterns
            .iter()
            .map(|p| compile(p, self.path_patterns_are_case_sensitive))
            .collect()
    }

    pub fn exclude_regex(&self) -> Result<Option<Regex>> {
        self.exclude_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| compile(p, self.path_patterns_are_case_sensitive))
            .transpose()
    }

    /// Check every regular expression in the pattern compiles
    pub fn validate(&self) -> Result<()> {
        self.pattern_regex()?;
        self.include_regexes()?;
        self.exclude_regex()?;
        for p in self
            .file_patterns_repos_must_include
            .iter()
            .chain(&self.file_patterns_repos_must_exclude)
        {
            compile(p, self.path_patterns_are_case_sensitive)?;
        }
        Ok(())
    }
}

pub(crate) fn compile(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| SearchError::InvalidQuery(format!("invalid regex {:?}: {}", pattern, e)))
}

/// Compiled path filters of a [`TextPatternInfo`]
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Regex>,
    exclude: Option<Regex>,
}

impl PathFilter {
    pub fn new(info: &TextPatternInfo) -> Result<Self> {
        Ok(Self {
            include: info.include_regexes()?,
            exclude: info.exclude_regex()?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.include.iter().all(|re| re.is_match(path))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(path))
    }
}
