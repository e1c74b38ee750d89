//! Deciding which backend serves which repository revisions, and running
//! the indexed half of a search

use crate::backend::{Clients, IndexedBackend, IndexedFileMatch, IndexedRepository, IndexedSearchResult};
use crate::error::{Result, SearchError};
use crate::indexed::query::{result_count_factor, to_indexed_query, IndexedQuery, SearchOptions};
use crate::indexed::repos::{zoekt_indexed_repos, IndexedRepoRevs};
use crate::indexed::IndexedRequestType;
use crate::result::{File, FileMatch, LineMatch, Match, SymbolMatch};
use crate::search::{IndexMode, RepositoryRevisions, SearchContext, TextPatternInfo};
use crate::streaming::{RepoStatus, RepoStatusMap, SearchEvent, Stats, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cap the repository revisions sent to the unindexed backend at `budget`.
///
/// Once the budget is exceeded the remaining repositories are not searched;
/// they are reported on `stream` with a missing status instead.
pub fn limit_unindexed_repos(
    mut unindexed: Vec<RepositoryRevisions>,
    budget: usize,
    stream: &Stream,
) -> Vec<RepositoryRevisions> {
    let mut remaining = budget as i64;
    let mut cut = None;
    for (i, repo_revs) in unindexed.iter().enumerate() {
        remaining -= repo_revs.revs.len() as i64;
        if remaining < 0 {
            cut = Some(i);
            break;
        }
    }

    if let Some(i) = cut {
        let missing = unindexed.split_off(i);
        debug!(
            searched = unindexed.len(),
            missing = missing.len(),
            "unindexed repository budget exceeded"
        );
        let status = RepoStatusMap::with_status(missing.iter().map(|r| r.repo.id), RepoStatus::MISSING);
        stream.send(SearchEvent::stats(Stats::with_status(status)));
    }

    unindexed
}

/// The routing decision for one leaf search, plus the means to run the
/// indexed part of it.
pub struct IndexedSearchRequest {
    typ: IndexedRequestType,
    pattern: TextPatternInfo,
    backend: Option<Arc<dyn IndexedBackend>>,
    repos: IndexedRepoRevs,
    buffer_size: usize,
    max_wall_time: Duration,
    /// Repository revisions to search with the unindexed backend
    pub unindexed: Vec<RepositoryRevisions>,
    /// Repository revisions dropped by the unindexed budget
    pub unindexed_dropped: usize,
    /// The indexed backend could not be consulted
    pub index_unavailable: bool,
}

impl IndexedSearchRequest {
    fn unindexed_only(
        clients: &Clients,
        pattern: &TextPatternInfo,
        typ: IndexedRequestType,
        repos: Vec<RepositoryRevisions>,
        stream: &Stream,
    ) -> Self {
        let requested: usize = repos.iter().map(|r| r.revs.len()).sum();
        let unindexed = limit_unindexed_repos(repos, clients.settings.unindexed_repo_budget, stream);
        let kept: usize = unindexed.iter().map(|r| r.revs.len()).sum();
        Self {
            typ,
            pattern: pattern.clone(),
            backend: None,
            repos: IndexedRepoRevs::new(),
            buffer_size: clients.settings.buffer_size,
            max_wall_time: clients.settings.max_wall_time,
            unindexed,
            unindexed_dropped: requested - kept,
            index_unavailable: false,
        }
    }

    /// Route `repos` between the indexed and unindexed backends
    pub async fn new(
        ctx: &SearchContext,
        clients: &Clients,
        pattern: &TextPatternInfo,
        typ: IndexedRequestType,
        repos: Vec<RepositoryRevisions>,
        stream: &Stream,
    ) -> Result<Self> {
        let index_only = pattern.index == IndexMode::Only;

        let Some(backend) = clients.indexed() else {
            if index_only {
                return Err(SearchError::IndexOnly(
                    "indexed search is not enabled".to_string(),
                ));
            }
            debug!("indexed search disabled, using unindexed search");
            return Ok(Self::unindexed_only(clients, pattern, typ, repos, stream));
        };

        if repos.iter().any(|r| !r.only_explicit()) {
            if index_only {
                return Err(SearchError::IndexOnly(
                    "revisions with glob patterns cannot be resolved for indexed searches"
                        .to_string(),
                ));
            }
            debug!("ref globs requested, using unindexed search");
            return Ok(Self::unindexed_only(clients, pattern, typ, repos, stream));
        }

        if pattern.index == IndexMode::No {
            debug!("index:no, using unindexed search");
            return Ok(Self::unindexed_only(clients, pattern, typ, repos, stream));
        }

        let list_ctx = ctx.with_timeout(clients.settings.list_timeout);
        let indexed_set = match backend.list_all(&list_ctx).await {
            Ok(set) => set,
            Err(e) => {
                if let Some(err) = ctx.err() {
                    return Err(err);
                }
                if index_only {
                    return Err(SearchError::IndexOnly(format!(
                        "indexed search is not available: {}",
                        e
                    )));
                }
                warn!("listing indexed repositories failed, falling back to unindexed search: {}", e);
                stream.send(SearchEvent::stats(Stats {
                    backends_missing: 1,
                    ..Stats::default()
                }));
                let mut request = Self::unindexed_only(clients, pattern, typ, repos, stream);
                request.index_unavailable = true;
                return Ok(request);
            }
        };

        // Symbol searches need an index with symbol information
        let has_symbols = |r: &IndexedRepository| r.has_symbols;
        let filter: Option<&dyn Fn(&IndexedRepository) -> bool> = match typ {
            IndexedRequestType::Symbol => Some(&has_symbols),
            _ => None,
        };
        let (indexed, mut unindexed) = zoekt_indexed_repos(&indexed_set, &repos, filter);
        debug!(
            indexed = indexed.len(),
            unindexed = unindexed.len(),
            "routed repository revisions"
        );

        if index_only {
            if indexed.is_empty() && !repos.is_empty() {
                return Err(SearchError::IndexOnly(
                    "none of the requested repositories are indexed".to_string(),
                ));
            }
            unindexed.clear();
        }

        let requested: usize = unindexed.iter().map(|r| r.revs.len()).sum();
        let unindexed = limit_unindexed_repos(unindexed, clients.settings.unindexed_repo_budget, stream);
        let kept: usize = unindexed.iter().map(|r| r.revs.len()).sum();

        Ok(Self {
            typ,
            pattern: pattern.clone(),
            backend: Some(backend.clone()),
            repos: indexed,
            buffer_size: clients.settings.buffer_size,
            max_wall_time: clients.settings.max_wall_time,
            unindexed,
            unindexed_dropped: requested - kept,
            index_unavailable: false,
        })
    }

    /// Repository revisions served by the indexed backend
    pub fn indexed_repos(&self) -> &IndexedRepoRevs {
        &self.repos
    }

    /// True when a resolved branch is not a primary branch
    pub fn not_head_only_search(&self) -> bool {
        self.repos.not_head_only_search
    }

    /// The full query sent to the indexed backend
    pub fn query(&self) -> Result<IndexedQuery> {
        let q = to_indexed_query(&self.pattern, self.typ)?;
        Ok(IndexedQuery::And(vec![IndexedQuery::RepoBranches(self.repos.branch_set()), q]).simplify())
    }

    /// Run the indexed part of the search, streaming matches to `stream`
    pub async fn search(&self, ctx: &SearchContext, stream: &Stream) -> Result<()> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };
        if self.repos.is_empty() {
            return Ok(());
        }

        let query = self.query()?;
        let k = result_count_factor(self.repos.len(), self.pattern.file_match_limit, false);
        let mut opts = SearchOptions::new(k, &self.pattern, self.max_wall_time);

        // Let the backend use the whole request deadline and finish even if
        // the deadline fires while it is streaming back results
        let search_ctx = match ctx.remaining() {
            Some(remaining) if self.pattern.use_full_deadline => {
                opts.max_wall_time = remaining;
                ctx.without_deadline()
            }
            _ => ctx.clone(),
        };

        debug!(%query, repos = self.repos.len(), "indexed search");
        let started = Instant::now();

        let (tx, mut rx) = mpsc::channel::<IndexedSearchResult>(self.buffer_size.max(1));
        let producer = backend.stream_search(&search_ctx, &query, &opts, tx);
        let consumer = async {
            let mut found = false;
            while let Some(batch) = rx.recv().await {
                found |= batch.file_count != 0 || batch.match_count != 0;
                self.send_matches(batch, stream);
            }
            found
        };
        let (res, found) = tokio::join!(producer, consumer);
        res?;

        let ids = self.repos.repos().map(|r| r.id);
        let status = if !found && started.elapsed() >= opts.max_wall_time {
            debug!("indexed search timed out without results");
            RepoStatusMap::with_status(ids, RepoStatus::TIMED_OUT)
        } else {
            RepoStatusMap::with_status(ids, RepoStatus::SEARCHED | RepoStatus::INDEXED)
        };
        stream.send(SearchEvent::stats(Stats::with_status(status)));

        Ok(())
    }

    fn send_matches(&self, batch: IndexedSearchResult, stream: &Stream) {
        let limit_hit = batch.files_skipped + batch.shards_skipped > 0;

        let mut matches = Vec::with_capacity(batch.files.len());
        for file in &batch.files {
            let Some((repo, input_revs)) = self.repos.input_revs(file) else {
                continue;
            };
            let (line_matches, symbols) = self.convert(file);
            for input_rev in input_revs {
                matches.push(Match::File(FileMatch {
                    file: File {
                        repo: repo.clone(),
                        commit_id: file.version.clone(),
                        input_rev: Some(input_rev),
                        path: file.file_name.clone(),
                    },
                    line_matches: line_matches.clone(),
                    symbols: symbols.clone(),
                    limit_hit: false,
                }));
            }
        }

        if matches.is_empty() && !limit_hit {
            return;
        }
        stream.send(SearchEvent::new(
            matches,
            Stats {
                is_limit_hit: limit_hit,
                ..Stats::default()
            },
        ));
    }

    fn convert(&self, file: &IndexedFileMatch) -> (Vec<LineMatch>, Vec<SymbolMatch>) {
        let mut lines = Vec::new();
        let mut symbols = Vec::new();

        for lm in file.line_matches.iter().filter(|lm| !lm.file_name) {
            if self.typ == IndexedRequestType::Symbol {
                for frag in &lm.fragments {
                    if let Some(sym) = &frag.symbol {
                        symbols.push(SymbolMatch {
                            name: sym.name.clone(),
                            kind: sym.kind.clone(),
                            line_number: lm.line_number,
                        });
                    }
                }
            } else {
                let offsets = lm.fragments.iter().map(|f| (f.offset, f.length)).collect();
                lines.push(LineMatch::new(lm.line_number, lm.line.clone(), offsets));
            }
        }

        (lines, symbols)
    }
}
