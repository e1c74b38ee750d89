//! Jobs that talk to the backends

use crate::backend::{Clients, UnindexedKind};
use crate::error::{Errors, Result, SearchError};
use crate::indexed::{IndexedRequestType, IndexedSearchRequest};
use crate::job::Outcome;
use crate::result::{Match, RepoMatch};
use crate::search::{
    Alert, MaxAlerter, RepoOptions, RepositoryRevisions, SearchContext, TextPatternInfo,
};
use crate::streaming::{RepoStatus, RepoStatusMap, SearchEvent, Stats, Stream};
use crate::unindexed;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Priority of the alert for revisions that do not exist
const MISSING_REVISIONS_PRIORITY: i32 = 2;
/// Priority of the alert for repositories skipped by the unindexed budget
const TOO_MANY_REPOS_PRIORITY: i32 = 1;

/// Search file contents and paths
#[derive(Debug, Clone)]
pub struct TextSearchJob {
    pub pattern: TextPatternInfo,
    pub repos: RepoOptions,
}

/// Search symbol definitions
#[derive(Debug, Clone)]
pub struct SymbolSearchJob {
    pub pattern: TextPatternInfo,
    pub repos: RepoOptions,
}

/// Search with a structural pattern. Only primary branches are supported.
#[derive(Debug, Clone)]
pub struct StructuralSearchJob {
    pub pattern: TextPatternInfo,
    pub repos: RepoOptions,
}

/// Match repository names
#[derive(Debug, Clone)]
pub struct RepoSearchJob {
    pub pattern: Regex,
    pub repos: RepoOptions,
}

pub enum LeafJob {
    Text(TextSearchJob),
    Symbol(SymbolSearchJob),
    Structural(StructuralSearchJob),
    Repo(RepoSearchJob),
}

impl LeafJob {
    pub fn name(&self) -> &'static str {
        match self {
            LeafJob::Text(_) => "TextSearchJob",
            LeafJob::Symbol(_) => "SymbolSearchJob",
            LeafJob::Structural(_) => "StructuralSearchJob",
            LeafJob::Repo(_) => "RepoSearchJob",
        }
    }

    pub async fn run(self, ctx: SearchContext, clients: Arc<Clients>, stream: Stream) -> Outcome {
        let mut alerter = MaxAlerter::new();
        let res = match self {
            LeafJob::Text(job) => {
                search_files(&ctx, &clients, &job.pattern, &job.repos, Kind::Text, &stream, &mut alerter)
                    .await
            }
            LeafJob::Symbol(job) => {
                search_files(&ctx, &clients, &job.pattern, &job.repos, Kind::Symbol, &stream, &mut alerter)
                    .await
            }
            LeafJob::Structural(job) => {
                search_structural(&ctx, &clients, &job, &stream, &mut alerter).await
            }
            LeafJob::Repo(job) => search_repo_names(&ctx, &clients, &job, &stream, &mut alerter).await,
        };

        Outcome {
            alert: alerter.into_alert(),
            error: res.err(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    Symbol,
}

impl Kind {
    fn indexed(self) -> IndexedRequestType {
        match self {
            Kind::Text => IndexedRequestType::Text,
            Kind::Symbol => IndexedRequestType::Symbol,
        }
    }

    fn unindexed(self) -> UnindexedKind {
        match self {
            Kind::Text => UnindexedKind::Text,
            Kind::Symbol => UnindexedKind::Symbol,
        }
    }
}

/// Resolve the repositories to search. Revisions that do not exist are
/// reported as missing and raise an alert.
async fn resolve_repos(
    ctx: &SearchContext,
    clients: &Clients,
    opts: &RepoOptions,
    stream: &Stream,
    alerter: &mut MaxAlerter,
) -> Result<Vec<RepositoryRevisions>> {
    let resolved = clients.repos.resolve(ctx, opts).await?;

    if !resolved.missing.is_empty() {
        let status = RepoStatusMap::with_status(
            resolved.missing.iter().map(|m| m.repo.id),
            RepoStatus::MISSING,
        );
        stream.send(SearchEvent::stats(Stats::with_status(status)));

        let listing: Vec<String> = resolved
            .missing
            .iter()
            .map(|m| format!("{}@{}", m.repo.name, m.revs.join(":")))
            .collect();
        alerter.add(Some(Alert::new(
            "Some revisions could not be found",
            format!("Skipped revisions that do not exist: {}", listing.join(", ")),
            MISSING_REVISIONS_PRIORITY,
        )));
    }

    Ok(resolved.repo_revs)
}

fn too_many_repos_alert(request: &IndexedSearchRequest, alerter: &mut MaxAlerter) {
    if request.unindexed_dropped == 0 {
        return;
    }
    alerter.add(Some(
        Alert::new(
            "Too many unindexed repositories",
            format!(
                "{} repository revisions are not indexed and were not searched. Narrow the repositories to search them.",
                request.unindexed_dropped
            ),
            TOO_MANY_REPOS_PRIORITY,
        )
        .with_proposed_query("Search only indexed revisions", "index:only"),
    ));
}

/// Run two halves of a search together. The first real failure cancels
/// the other half.
async fn run_both<A, B>(ctx: &SearchContext, a: A, b: B) -> Result<()>
where
    A: Future<Output = Result<()>>,
    B: Future<Output = Result<()>>,
{
    let cancel_on_err = |res: Result<()>| {
        if let Err(e) = &res {
            if !e.is_cancellation() {
                ctx.cancel();
            }
        }
        res
    };
    let (ra, rb) = tokio::join!(async { cancel_on_err(a.await) }, async {
        cancel_on_err(b.await)
    });

    let mut errors = Errors::new();
    for res in [ra, rb] {
        if let Err(e) = res {
            errors.push(e);
        }
    }
    errors.into_error().map_or(Ok(()), Err)
}

async fn search_files(
    ctx: &SearchContext,
    clients: &Clients,
    pattern: &TextPatternInfo,
    repos: &RepoOptions,
    kind: Kind,
    stream: &Stream,
    alerter: &mut MaxAlerter,
) -> Result<()> {
    let repos = resolve_repos(ctx, clients, repos, stream, alerter).await?;
    let request =
        IndexedSearchRequest::new(ctx, clients, pattern, kind.indexed(), repos, stream).await?;
    too_many_repos_alert(&request, alerter);

    let ctx = ctx.child();
    run_both(
        &ctx,
        request.search(&ctx, stream),
        unindexed::search_repos(
            &ctx,
            clients,
            pattern,
            kind.unindexed(),
            request.unindexed.clone(),
            stream,
        ),
    )
    .await
}

async fn search_structural(
    ctx: &SearchContext,
    clients: &Clients,
    job: &StructuralSearchJob,
    stream: &Stream,
    alerter: &mut MaxAlerter,
) -> Result<()> {
    let repos = resolve_repos(ctx, clients, &job.repos, stream, alerter).await?;
    let request = IndexedSearchRequest::new(
        ctx,
        clients,
        &job.pattern,
        IndexedRequestType::Structural,
        repos,
        stream,
    )
    .await?;
    if request.not_head_only_search() {
        return Err(SearchError::StructuralNonDefaultBranch);
    }
    too_many_repos_alert(&request, alerter);

    // The unindexed backend evaluates structural patterns; the router
    // decides which revisions are eligible.
    let mut all: Vec<RepositoryRevisions> = request.indexed_repos().revisions().cloned().collect();
    all.extend(request.unindexed.iter().cloned());
    debug!(repos = all.len(), "structural search");

    unindexed::search_repos(ctx, clients, &job.pattern, UnindexedKind::Structural, all, stream).await
}

async fn search_repo_names(
    ctx: &SearchContext,
    clients: &Clients,
    job: &RepoSearchJob,
    stream: &Stream,
    alerter: &mut MaxAlerter,
) -> Result<()> {
    let repos = resolve_repos(ctx, clients, &job.repos, stream, alerter).await?;

    let mut matches = Vec::new();
    let mut status = RepoStatusMap::new();
    for repo_revs in repos {
        status.update(repo_revs.repo.id, RepoStatus::SEARCHED);
        if !job.pattern.is_match(&repo_revs.repo.name) {
            continue;
        }
        let rev = repo_revs
            .revs
            .first()
            .map(ToString::to_string)
            .filter(|r| !r.is_empty());
        matches.push(Match::Repo(RepoMatch {
            repo: repo_revs.repo,
            rev,
        }));
    }

    stream.send(SearchEvent::new(matches, Stats::with_status(status)));
    Ok(())
}
