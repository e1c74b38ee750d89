//! Fan-out of searches to the unindexed backend, one call per repository
//! revision

use crate::backend::{Clients, RepoProvider, UnindexedBackend, UnindexedKind, UnindexedRequest};
use crate::error::{Result, SearchError};
use crate::result::Match;
use crate::search::{RepositoryRevisions, RevisionSpecifier, SearchContext, TextPatternInfo};
use crate::streaming::{RepoStatus, RepoStatusMap, SearchEvent, Stats, Stream};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Search every revision of `repos` with the unindexed backend, at most
/// `unindexed_concurrency` repositories at a time.
///
/// Per-repository failures such as a missing revision are reported as
/// repository status. Any other failure cancels the remaining repositories
/// and is returned.
pub async fn search_repos(
    ctx: &SearchContext,
    clients: &Clients,
    pattern: &TextPatternInfo,
    kind: UnindexedKind,
    repos: Vec<RepositoryRevisions>,
    stream: &Stream,
) -> Result<()> {
    if repos.is_empty() {
        return Ok(());
    }
    debug!(repos = repos.len(), ?kind, "unindexed search");

    let ctx = ctx.child();
    let semaphore = Arc::new(Semaphore::new(clients.settings.unindexed_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for repo_revs in repos {
        let searcher = RepoSearcher {
            ctx: ctx.clone(),
            backend: clients.unindexed.clone(),
            provider: clients.repos.clone(),
            pattern: pattern.clone(),
            kind,
            stream: stream.clone(),
        };
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|e| SearchError::Task(e.to_string()))?
                }
                err = searcher.ctx.done() => return Err(err),
            };
            searcher.search(repo_revs).await
        });
    }

    let mut first_err = None;
    while let Some(joined) = tasks.join_next().await {
        let res = joined
            .map_err(|e| SearchError::Task(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = res {
            if first_err.is_none() {
                ctx.cancel();
                first_err = Some(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct RepoSearcher {
    ctx: SearchContext,
    backend: Arc<dyn UnindexedBackend>,
    provider: Arc<dyn RepoProvider>,
    pattern: TextPatternInfo,
    kind: UnindexedKind,
    stream: Stream,
}

impl RepoSearcher {
    async fn search(&self, repo_revs: RepositoryRevisions) -> Result<()> {
        let repo = repo_revs.repo;
        let (explicit, globs): (Vec<_>, Vec<_>) =
            repo_revs.revs.into_iter().partition(|r| !r.is_glob());

        let mut revs: Vec<String> = explicit
            .iter()
            .filter_map(RevisionSpecifier::as_rev)
            .map(str::to_string)
            .collect();
        if globs.iter().any(|g| matches!(g, RevisionSpecifier::RefGlob(_))) {
            match self.provider.expand_ref_globs(&self.ctx, &repo, &globs).await {
                Ok(expanded) => revs.extend(expanded),
                Err(e) => return self.downgrade(repo.id, e),
            }
        }

        for rev in revs {
            let request = UnindexedRequest {
                repo: repo.clone(),
                rev: rev.clone(),
                pattern: self.pattern.clone(),
                kind: self.kind,
                limit: self.pattern.effective_file_match_limit(),
            };

            let response = match self.backend.search(&self.ctx, &request).await {
                Ok(response) => response,
                Err(e) => {
                    self.downgrade(repo.id, e)?;
                    continue;
                }
            };

            let mut status = RepoStatus::SEARCHED;
            if response.limit_hit {
                status |= RepoStatus::LIMIT_HIT;
            }
            let matches = response
                .matches
                .into_iter()
                .map(|mut m| {
                    m.file.input_rev = Some(rev.clone());
                    Match::File(m)
                })
                .collect();
            self.stream.send(SearchEvent::new(
                matches,
                Stats {
                    is_limit_hit: response.limit_hit,
                    status: RepoStatusMap::with_status([repo.id], status),
                    backends_missing: 0,
                },
            ));
        }

        Ok(())
    }

    /// Report a per-repository error as status, or hand it back
    fn downgrade(&self, repo_id: u32, err: SearchError) -> Result<()> {
        match err.repo_status() {
            Some(status) if !self.ctx.is_cancelled() => {
                debug!(repo_id, %err, "repository search failed");
                self.stream.send(SearchEvent::stats(Stats::with_status(
                    RepoStatusMap::with_status([repo_id], status),
                )));
                Ok(())
            }
            _ => Err(err),
        }
    }
}
