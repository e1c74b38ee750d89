//! Interfaces to the services a search talks to
//!
//! The core only depends on these traits. `memory` provides in-process
//! implementations backed by a TOML corpus.

pub mod memory;

use crate::config::SearchSettings;
use crate::error::Result;
use crate::indexed::{IndexedQuery, SearchOptions};
use crate::result::FileMatch;
use crate::search::{
    RepoName, RepoOptions, RepositoryRevisions, RevisionSpecifier, SearchContext, TextPatternInfo,
};
use ahash::HashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A branch the indexed backend has indexed, and the commit it indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryBranch {
    pub name: String,
    pub version: String,
}

impl RepositoryBranch {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// What the indexed backend knows about one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRepository {
    pub id: u32,
    pub name: String,
    /// Indexed branches; the first one is the primary branch
    pub branches: Vec<RepositoryBranch>,
    pub has_symbols: bool,
}

/// Repositories known to the indexed backend, keyed by name
pub type IndexedRepoSet = HashMap<String, IndexedRepository>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSymbol {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFragment {
    pub offset: u32,
    pub length: u32,
    /// Set when the fragment is a symbol definition
    pub symbol: Option<IndexedSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLineMatch {
    pub line: String,
    /// Zero-based
    pub line_number: u32,
    pub fragments: Vec<IndexedFragment>,
    /// The match is on the file name rather than its contents
    pub file_name: bool,
}

/// A file returned by the indexed backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFileMatch {
    pub repository: String,
    pub repository_id: u32,
    pub file_name: String,
    /// Branches the file was found on
    pub branches: Vec<String>,
    /// Commit of the first branch
    pub version: String,
    pub line_matches: Vec<IndexedLineMatch>,
}

/// One batch streamed back by the indexed backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedSearchResult {
    pub files: Vec<IndexedFileMatch>,
    pub file_count: usize,
    pub match_count: usize,
    pub files_skipped: usize,
    pub shards_skipped: usize,
}

/// Trigram-indexed search service
#[async_trait]
pub trait IndexedBackend: Send + Sync {
    /// Every repository in the index
    async fn list_all(&self, ctx: &SearchContext) -> Result<IndexedRepoSet>;

    /// Run `query`, sending result batches to `sender` as they are found.
    /// Returns once the search is complete or `ctx` is done.
    async fn stream_search(
        &self,
        ctx: &SearchContext,
        query: &IndexedQuery,
        opts: &SearchOptions,
        sender: mpsc::Sender<IndexedSearchResult>,
    ) -> Result<()>;
}

/// What the unindexed backend is asked to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnindexedKind {
    Text,
    Symbol,
    /// Structural pattern with `:[hole]` placeholders
    Structural,
}

/// Search a single revision of a single repository
#[derive(Debug, Clone)]
pub struct UnindexedRequest {
    pub repo: RepoName,
    /// Revision as requested; empty means the default branch
    pub rev: String,
    pub pattern: TextPatternInfo,
    pub kind: UnindexedKind,
    /// Stop after this many file matches
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct UnindexedResponse {
    pub matches: Vec<FileMatch>,
    pub limit_hit: bool,
}

/// Grep-like service that searches any revision directly
#[async_trait]
pub trait UnindexedBackend: Send + Sync {
    async fn search(&self, ctx: &SearchContext, request: &UnindexedRequest) -> Result<UnindexedResponse>;
}

/// Revisions that could not be resolved for a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRevisions {
    pub repo: RepoName,
    pub revs: Vec<String>,
}

/// Output of resolving repository options
#[derive(Debug, Clone, Default)]
pub struct ResolvedRepos {
    pub repo_revs: Vec<RepositoryRevisions>,
    pub missing: Vec<MissingRevisions>,
}

/// Resolves repository options to concrete repositories and revisions
#[async_trait]
pub trait RepoProvider: Send + Sync {
    async fn resolve(&self, ctx: &SearchContext, opts: &RepoOptions) -> Result<ResolvedRepos>;

    /// Revision names of `repo` selected by ref globs, after applying
    /// exclusion globs
    async fn expand_ref_globs(
        &self,
        ctx: &SearchContext,
        repo: &RepoName,
        globs: &[RevisionSpecifier],
    ) -> Result<Vec<String>>;
}

/// Everything a job needs to reach its backends
#[derive(Clone)]
pub struct Clients {
    /// `None` when indexed search is disabled or unavailable
    pub indexed: Option<Arc<dyn IndexedBackend>>,
    pub unindexed: Arc<dyn UnindexedBackend>,
    pub repos: Arc<dyn RepoProvider>,
    pub settings: SearchSettings,
}

impl Clients {
    /// The indexed backend, if enabled in settings and configured
    pub fn indexed(&self) -> Option<&Arc<dyn IndexedBackend>> {
        if self.settings.indexed_enabled {
            self.indexed.as_ref()
        } else {
            None
        }
    }
}
