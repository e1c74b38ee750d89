//! Search result values
//!
//! Every match carries a canonical identity ([`Key`]) used for
//! deduplication and for intersecting the output of several jobs.

mod deduper;
mod intersect;

pub use deduper::Deduper;
pub use intersect::IntersectionMerger;

use crate::search::RepoName;
use serde::{Deserialize, Serialize};

/// Kind component of a match identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Repo,
    File,
    Commit,
    Diff,
}

/// Canonical identity of a match
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub kind: MatchKind,
    pub repo: String,
    /// Input revision the match was found through
    pub rev: String,
    pub commit: String,
    pub path: String,
}

/// A single matching line and the byte ranges matched within it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    /// Zero-based line number
    pub line_number: u32,
    /// Line contents, without the trailing newline
    pub preview: String,
    /// `(offset, length)` pairs into `preview`
    pub offsets: Vec<(u32, u32)>,
}

impl LineMatch {
    pub fn new(line_number: u32, preview: impl Into<String>, offsets: Vec<(u32, u32)>) -> Self {
        Self {
            line_number,
            preview: preview.into(),
            offsets,
        }
    }
}

/// A symbol definition found in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: String,
    pub line_number: u32,
}

/// A file at a specific commit, with the input revision that led to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub repo: RepoName,
    pub commit_id: String,
    /// Revision specifier as typed by the user, if any
    pub input_rev: Option<String>,
    pub path: String,
}

/// Matches inside a single file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMatch {
    pub file: File,
    #[serde(default)]
    pub line_matches: Vec<LineMatch>,
    #[serde(default)]
    pub symbols: Vec<SymbolMatch>,
    #[serde(default)]
    pub limit_hit: bool,
}

impl FileMatch {
    pub fn new(file: File) -> Self {
        Self {
            file,
            line_matches: Vec::new(),
            symbols: Vec::new(),
            limit_hit: false,
        }
    }

    pub fn with_line_matches(mut self, line_matches: Vec<LineMatch>) -> Self {
        self.line_matches = line_matches;
        self
    }

    pub fn key(&self) -> Key {
        Key {
            kind: MatchKind::File,
            repo: self.file.repo.name.clone(),
            rev: self.file.input_rev.clone().unwrap_or_default(),
            commit: self.file.commit_id.clone(),
            path: self.file.path.clone(),
        }
    }

    pub fn url(&self) -> String {
        let rev = self
            .file
            .input_rev
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(self.file.commit_id.as_str());
        if rev.is_empty() {
            format!("/{}/-/blob/{}", self.file.repo.name, self.file.path)
        } else {
            format!("/{}@{}/-/blob/{}", self.file.repo.name, rev, self.file.path)
        }
    }

    /// Number of results this file contributes to a result budget
    pub fn result_count(&self) -> usize {
        let ranges: usize = self.line_matches.iter().map(|l| l.offsets.len().max(1)).sum();
        (ranges + self.symbols.len()).max(1)
    }

    /// Merge the line and symbol matches of `other` into `self`.
    ///
    /// Lines already present have their ranges unioned; new lines are
    /// inserted in line-number order. Nothing in `self` is removed.
    pub fn append_matches(&mut self, other: &FileMatch) {
        for line in &other.line_matches {
            match self
                .line_matches
                .binary_search_by_key(&line.line_number, |l| l.line_number)
            {
                Ok(idx) => {
                    let existing = &mut self.line_matches[idx];
                    for offset in &line.offsets {
                        if !existing.offsets.contains(offset) {
                            existing.offsets.push(*offset);
                        }
                    }
                    existing.offsets.sort_unstable();
                }
                Err(idx) => self.line_matches.insert(idx, line.clone()),
            }
        }

        for symbol in &other.symbols {
            if !self.symbols.contains(symbol) {
                self.symbols.push(symbol.clone());
            }
        }

        self.limit_hit |= other.limit_hit;
    }
}

/// A repository whose name matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMatch {
    pub repo: RepoName,
    pub rev: Option<String>,
}

impl RepoMatch {
    pub fn key(&self) -> Key {
        Key {
            kind: MatchKind::Repo,
            repo: self.repo.name.clone(),
            rev: self.rev.clone().unwrap_or_default(),
            commit: String::new(),
            path: String::new(),
        }
    }

    pub fn url(&self) -> String {
        match self.rev.as_deref() {
            Some(rev) if !rev.is_empty() => format!("/{}@{}", self.repo.name, rev),
            _ => format!("/{}", self.repo.name),
        }
    }
}

/// A commit (or a commit's diff) that matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMatch {
    pub repo: RepoName,
    pub commit_id: String,
    pub summary: String,
    /// Whether this match describes the commit's diff rather than its message
    #[serde(default)]
    pub diff: bool,
}

impl CommitMatch {
    pub fn key(&self) -> Key {
        Key {
            kind: if self.diff {
                MatchKind::Diff
            } else {
                MatchKind::Commit
            },
            repo: self.repo.name.clone(),
            rev: String::new(),
            commit: self.commit_id.clone(),
            path: String::new(),
        }
    }

    pub fn url(&self) -> String {
        format!("/{}/-/commit/{}", self.repo.name, self.commit_id)
    }
}

/// Any search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Match {
    File(FileMatch),
    Repo(RepoMatch),
    Commit(CommitMatch),
}

impl Match {
    pub fn key(&self) -> Key {
        match self {
            Match::File(m) => m.key(),
            Match::Repo(m) => m.key(),
            Match::Commit(m) => m.key(),
        }
    }

    pub fn url(&self) -> String {
        match self {
            Match::File(m) => m.url(),
            Match::Repo(m) => m.url(),
            Match::Commit(m) => m.url(),
        }
    }

    pub fn repo_name(&self) -> &RepoName {
        match self {
            Match::File(m) => &m.file.repo,
            Match::Repo(m) => &m.repo,
            Match::Commit(m) => &m.repo,
        }
    }

    pub fn result_count(&self) -> usize {
        match self {
            Match::File(m) => m.result_count(),
            Match::Repo(_) | Match::Commit(_) => 1,
        }
    }

    /// Fold `other` (same identity) into `self`. Only file matches carry
    /// mergeable state; for the other kinds the first value wins.
    pub fn merge(&mut self, other: &Match) {
        if let (Match::File(a), Match::File(b)) = (self, other) {
            a.append_matches(b);
        }
    }
}

impl From<FileMatch> for Match {
    fn from(m: FileMatch) -> Self {
        Match::File(m)
    }
}

impl From<RepoMatch> for Match {
    fn from(m: RepoMatch) -> Self {
        Match::Repo(m)
    }
}

impl From<CommitMatch> for Match {
    fn from(m: CommitMatch) -> Self {
        Match::Commit(m)
    }
}

/// Total budget cost of a batch of matches
pub fn result_count(matches: &[Match]) -> usize {
    matches.iter().map(Match::result_count).sum()
}

/// Sort matches by repository name, then by URL.
///
/// Combinators never order their output; this is applied once at the
/// outermost boundary.
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        a.repo_name()
            .name
            .cmp(&b.repo_name().name)
            .then_with(|| a.key().cmp(&b.key()))
    });
}
