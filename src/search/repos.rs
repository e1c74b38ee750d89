//! Repositories and the revisions requested for them

use crate::error::{Result, SearchError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repository identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName {
    pub id: u32,
    pub name: String,
}

impl RepoName {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One requested revision of a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionSpecifier {
    /// An explicit ref or commit SHA; the empty string means the default branch
    Rev(String),
    /// Every ref matching the glob
    RefGlob(String),
    /// Exclude refs matching the glob
    ExcludeRefGlob(String),
}

impl RevisionSpecifier {
    pub fn default_branch() -> Self {
        RevisionSpecifier::Rev(String::new())
    }

    pub fn rev(rev: impl Into<String>) -> Self {
        RevisionSpecifier::Rev(rev.into())
    }

    /// Parse a single `:`-separated component of a `repo@revs` spec
    pub fn parse(part: &str) -> Self {
        if let Some(glob) = part.strip_prefix("*!") {
            RevisionSpecifier::ExcludeRefGlob(glob.to_string())
        } else if let Some(glob) = part.strip_prefix('*') {
            RevisionSpecifier::RefGlob(glob.to_string())
        } else {
            RevisionSpecifier::Rev(part.to_string())
        }
    }

    /// The explicit revision, or `None` for glob patterns
    pub fn as_rev(&self) -> Option<&str> {
        match self {
            RevisionSpecifier::Rev(rev) => Some(rev),
            _ => None,
        }
    }

    pub fn is_glob(&self) -> bool {
        !matches!(self, RevisionSpecifier::Rev(_))
    }
}

impl fmt::Display for RevisionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionSpecifier::Rev(rev) => f.write_str(rev),
            RevisionSpecifier::RefGlob(glob) => write!(f, "*{}", glob),
            RevisionSpecifier::ExcludeRefGlob(glob) => write!(f, "*!{}", glob),
        }
    }
}

/// Split `name@rev1:rev2` into the name and its revision specifiers.
///
/// Empty components are skipped; an empty result means "default branch"
/// and is normalized to `[""]`.
pub fn parse_repository_revisions(spec: &str) -> (String, Vec<RevisionSpecifier>) {
    let (name, revs) = match spec.split_once('@') {
        Some((name, revs)) => (name, revs),
        None => (spec, ""),
    };

    let mut parsed: Vec<RevisionSpecifier> = revs
        .split(':')
        .filter(|part| !part.is_empty())
        .map(RevisionSpecifier::parse)
        .collect();
    if parsed.is_empty() {
        parsed.push(RevisionSpecifier::default_branch());
    }

    (name.to_string(), parsed)
}

/// A repository and the ordered revisions requested for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRevisions {
    pub repo: RepoName,
    pub revs: Vec<RevisionSpecifier>,
}

impl RepositoryRevisions {
    pub fn new(repo: RepoName, revs: Vec<RevisionSpecifier>) -> Self {
        Self { repo, revs }
    }

    /// True when no revision is a glob pattern
    pub fn only_explicit(&self) -> bool {
        self.revs.iter().all(|r| !r.is_glob())
    }

    pub fn rev_specs(&self) -> Vec<String> {
        self.revs.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for RepositoryRevisions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let revs = self.rev_specs().join(":");
        if revs.is_empty() {
            write!(f, "{}", self.repo.name)
        } else {
            write!(f, "{}@{}", self.repo.name, revs)
        }
    }
}

/// A repository name pattern with the revisions to search in matching repos
#[derive(Debug, Clone)]
pub struct RepoFilter {
    pub pattern: Regex,
    pub revs: Vec<RevisionSpecifier>,
}

impl RepoFilter {
    /// Parse `pattern@revs`, where `pattern` is a regular expression over
    /// repository names
    pub fn parse(spec: &str) -> Result<Self> {
        let (pattern, revs) = parse_repository_revisions(spec);
        let pattern = Regex::new(&pattern).map_err(|e| {
            SearchError::InvalidQuery(format!("invalid repo pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self { pattern, revs })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

/// Which repositories a leaf job searches
#[derive(Debug, Clone, Default)]
pub struct RepoOptions {
    pub filters: Vec<RepoFilter>,
}

impl RepoOptions {
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let filters = specs
            .iter()
            .map(|s| RepoFilter::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    /// True when any requested revision is a ref glob
    pub fn contains_ref_globs(&self) -> bool {
        self.filters
            .iter()
            .any(|f| f.revs.iter().any(RevisionSpecifier::is_glob))
    }
}
