//! In-process backends over a corpus loaded from TOML
//!
//! ```toml
//! [[repos]]
//! id = 1
//! name = "github.com/acme/api"
//! has_symbols = true
//! indexed_branches = ["HEAD", "v2"]
//!
//! [[repos.revisions]]
//! name = "HEAD"
//! commit = "4f0c7d1e..."
//!
//! [[repos.revisions.files]]
//! path = "main.go"
//! content = "package main\n"
//! symbols = [{ name = "main", kind = "function", line = 2 }]
//! ```
//!
//! Every backend can be slowed down with an artificial latency. The wait
//! observes the search context, and [`CallStats`] records how many calls
//! were made and how many of them were canceled mid-wait.

use crate::backend::{
    Clients, IndexedBackend, IndexedFileMatch, IndexedFragment, IndexedLineMatch, IndexedRepoSet,
    IndexedRepository, IndexedSearchResult, IndexedSymbol, MissingRevisions, RepoProvider,
    RepositoryBranch, ResolvedRepos, UnindexedBackend, UnindexedKind, UnindexedRequest,
    UnindexedResponse,
};
use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::indexed::{IndexedQuery, SearchOptions};
use crate::result::{File, FileMatch, LineMatch, SymbolMatch};
use crate::search::{
    compile_regex, PathFilter, RepoName, RepoOptions, RepositoryRevisions, RevisionSpecifier,
    SearchContext, TextPatternInfo,
};
use ahash::{HashMap, HashMapExt};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub repos: Vec<CorpusRepo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRepo {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub has_symbols: bool,
    /// Still being cloned; unindexed searches fail with a cloning status
    #[serde(default)]
    pub cloning: bool,
    /// Revisions present in the index. The first is the primary branch.
    #[serde(default)]
    pub indexed_branches: Vec<String>,
    #[serde(default)]
    pub revisions: Vec<CorpusRevision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusRevision {
    pub name: String,
    pub commit: String,
    #[serde(default)]
    pub files: Vec<CorpusFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub symbols: Vec<CorpusSymbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSymbol {
    pub name: String,
    pub kind: String,
    pub line: u32,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SearchError::Io {
            source: e,
            context: format!("Failed to read corpus: {:?}", path),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn repo(&self, name: &str) -> Option<&CorpusRepo> {
        self.repos.iter().find(|r| r.name == name)
    }
}

impl CorpusRepo {
    pub fn repo_name(&self) -> RepoName {
        RepoName::new(self.id, self.name.clone())
    }

    /// Resolve a revision by name or by commit prefix. The empty string and
    /// `HEAD` mean the first revision.
    pub fn revision(&self, rev: &str) -> Option<&CorpusRevision> {
        if rev.is_empty() || rev == "HEAD" {
            return self
                .revisions
                .iter()
                .find(|r| r.name == "HEAD")
                .or_else(|| self.revisions.first());
        }
        self.revisions
            .iter()
            .find(|r| r.name == rev)
            .or_else(|| {
                (rev.len() >= 4)
                    .then(|| self.revisions.iter().find(|r| r.commit.starts_with(rev)))
                    .flatten()
            })
    }
}

/// Call counters shared by a backend and the tests observing it
#[derive(Debug, Default)]
pub struct CallStats {
    calls: AtomicUsize,
    canceled: AtomicUsize,
}

impl CallStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn canceled(&self) -> usize {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Artificial latency, optionally different per search pattern
#[derive(Debug, Clone, Default)]
struct Latency {
    default: Duration,
    by_pattern: HashMap<String, Duration>,
}

impl Latency {
    fn for_pattern(&self, pattern: &str) -> Duration {
        self.by_pattern.get(pattern).copied().unwrap_or(self.default)
    }

    async fn wait(&self, ctx: &SearchContext, pattern: &str, stats: &CallStats) -> Result<()> {
        stats.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.for_pattern(pattern);
        let res = if delay.is_zero() {
            ctx.err().map_or(Ok(()), Err)
        } else {
            ctx.sleep(delay).await
        };
        if res.is_err() {
            stats.canceled.fetch_add(1, Ordering::SeqCst);
        }
        res
    }
}

macro_rules! latency_builders {
    ($ty:ty) => {
        impl $ty {
            pub fn with_latency(mut self, latency: Duration) -> Self {
                self.latency.default = latency;
                self
            }

            /// Latency for searches whose pattern is exactly `pattern`
            pub fn with_pattern_latency(mut self, pattern: impl Into<String>, latency: Duration) -> Self {
                self.latency.by_pattern.insert(pattern.into(), latency);
                self
            }

            pub fn stats(&self) -> Arc<CallStats> {
                self.stats.clone()
            }
        }
    };
}

/// Indexed backend that evaluates queries over the corpus' indexed branches
pub struct MemoryIndexed {
    corpus: Arc<Corpus>,
    latency: Latency,
    stats: Arc<CallStats>,
    unavailable: bool,
}

latency_builders!(MemoryIndexed);

impl MemoryIndexed {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            latency: Latency::default(),
            stats: Arc::new(CallStats::default()),
            unavailable: false,
        }
    }

    /// Fail every listing, as an unreachable service would
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn search_repo(&self, repo: &CorpusRepo, matcher: &Matcher) -> Vec<IndexedFileMatch> {
        // Identical content on several branches is returned once, listing
        // every branch it was found on
        let mut found: Vec<IndexedFileMatch> = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for branch in &repo.indexed_branches {
            let Some(rev) = repo.revisions.iter().find(|r| r.name == *branch) else {
                continue;
            };
            for file in &rev.files {
                let doc = Doc {
                    repo,
                    branch,
                    rev,
                    file,
                };
                let Some(lines) = matcher.eval(&doc) else {
                    continue;
                };

                let key = (file.path.clone(), file.content.clone());
                if let Some(&idx) = seen.get(&key) {
                    found[idx].branches.push(branch.clone());
                    continue;
                }
                seen.insert(key, found.len());
                found.push(IndexedFileMatch {
                    repository: repo.name.clone(),
                    repository_id: repo.id,
                    file_name: file.path.clone(),
                    branches: vec![branch.clone()],
                    version: rev.commit.clone(),
                    line_matches: merge_lines(lines),
                });
            }
        }

        found
    }
}

#[async_trait]
impl IndexedBackend for MemoryIndexed {
    async fn list_all(&self, ctx: &SearchContext) -> Result<IndexedRepoSet> {
        self.latency.wait(ctx, "", &self.stats).await?;
        if self.unavailable {
            return Err(SearchError::IndexedBackend("indexed search is unreachable".to_string()));
        }

        let mut set = IndexedRepoSet::default();
        for repo in &self.corpus.repos {
            let branches: Vec<RepositoryBranch> = repo
                .indexed_branches
                .iter()
                .filter_map(|name| {
                    repo.revisions
                        .iter()
                        .find(|r| r.name == *name)
                        .map(|r| RepositoryBranch::new(name.clone(), r.commit.clone()))
                })
                .collect();
            if branches.is_empty() {
                continue;
            }
            set.insert(
                repo.name.clone(),
                IndexedRepository {
                    id: repo.id,
                    name: repo.name.clone(),
                    branches,
                    has_symbols: repo.has_symbols,
                },
            );
        }
        Ok(set)
    }

    async fn stream_search(
        &self,
        ctx: &SearchContext,
        query: &IndexedQuery,
        opts: &SearchOptions,
        sender: mpsc::Sender<IndexedSearchResult>,
    ) -> Result<()> {
        let matcher = Matcher::compile(query)?;
        let pattern = matcher.first_pattern().unwrap_or_default();

        // The backend gives up once its wall time is used, returning
        // whatever it has (nothing, here)
        let started = Instant::now();
        let delay = self.latency.for_pattern(&pattern);
        if delay >= opts.max_wall_time {
            self.stats.calls.fetch_add(1, Ordering::SeqCst);
            if let Err(e) = ctx.sleep(opts.max_wall_time).await {
                self.stats.canceled.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
            return Ok(());
        }
        self.latency.wait(ctx, &pattern, &self.stats).await?;

        let mut displayed = 0;
        for repo in &self.corpus.repos {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            if started.elapsed() > opts.max_wall_time {
                break;
            }

            let files = self.search_repo(repo, &matcher);
            if files.is_empty() {
                continue;
            }

            let match_count = files.iter().map(|f| f.line_matches.len().max(1)).sum();
            let file_count = files.len();
            let room = opts.max_doc_display_count.saturating_sub(displayed);
            let files_skipped = file_count.saturating_sub(room);
            let files: Vec<_> = files.into_iter().take(room).collect();
            displayed += files.len();

            let batch = IndexedSearchResult {
                files,
                file_count,
                match_count,
                files_skipped,
                shards_skipped: 0,
            };
            if sender.send(batch).await.is_err() {
                // Receiver is gone; nobody wants the rest
                return Ok(());
            }
        }

        Ok(())
    }
}

/// Unindexed backend that searches any corpus revision directly
pub struct MemoryUnindexed {
    corpus: Arc<Corpus>,
    latency: Latency,
    stats: Arc<CallStats>,
}

latency_builders!(MemoryUnindexed);

impl MemoryUnindexed {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            latency: Latency::default(),
            stats: Arc::new(CallStats::default()),
        }
    }
}

#[async_trait]
impl UnindexedBackend for MemoryUnindexed {
    async fn search(&self, ctx: &SearchContext, request: &UnindexedRequest) -> Result<UnindexedResponse> {
        self.latency
            .wait(ctx, &request.pattern.pattern, &self.stats)
            .await?;

        let repo = self
            .corpus
            .repo(&request.repo.name)
            .ok_or_else(|| SearchError::RepoNotFound {
                repo: request.repo.name.clone(),
            })?;
        if repo.cloning {
            return Err(SearchError::RepoCloning {
                repo: repo.name.clone(),
            });
        }
        let rev = repo
            .revision(&request.rev)
            .ok_or_else(|| SearchError::RevisionNotFound {
                repo: repo.name.clone(),
                rev: request.rev.clone(),
            })?;

        let searcher = FileSearcher::new(&request.pattern, request.kind)?;
        if !searcher.repo_matches(rev) {
            return Ok(UnindexedResponse::default());
        }

        let mut matches = Vec::new();
        let mut limit_hit = false;
        for file in &rev.files {
            let Some(m) = searcher.search(repo, rev, file) else {
                continue;
            };
            if matches.len() >= request.limit {
                limit_hit = true;
                break;
            }
            matches.push(m);
        }

        Ok(UnindexedResponse { matches, limit_hit })
    }
}

/// Repository resolution against the corpus
pub struct MemoryRepoProvider {
    corpus: Arc<Corpus>,
    latency: Latency,
    stats: Arc<CallStats>,
}

latency_builders!(MemoryRepoProvider);

impl MemoryRepoProvider {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            latency: Latency::default(),
            stats: Arc::new(CallStats::default()),
        }
    }
}

#[async_trait]
impl RepoProvider for MemoryRepoProvider {
    async fn resolve(&self, ctx: &SearchContext, opts: &RepoOptions) -> Result<ResolvedRepos> {
        self.latency.wait(ctx, "", &self.stats).await?;

        let mut repos: Vec<&CorpusRepo> = self.corpus.repos.iter().collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));

        let mut resolved = ResolvedRepos::default();
        for repo in repos {
            let mut revs: Vec<RevisionSpecifier> = Vec::new();
            if opts.filters.is_empty() {
                revs.push(RevisionSpecifier::default_branch());
            }
            for filter in opts.filters.iter().filter(|f| f.matches(&repo.name)) {
                for rev in &filter.revs {
                    if !revs.contains(rev) {
                        revs.push(rev.clone());
                    }
                }
            }
            if revs.is_empty() {
                continue;
            }

            // Cloning repositories cannot be checked yet
            let (found, missing): (Vec<_>, Vec<_>) = if repo.cloning {
                (revs, Vec::new())
            } else {
                revs.into_iter().partition(|r| match r.as_rev() {
                    Some(rev) => repo.revision(rev).is_some(),
                    None => true,
                })
            };

            if !missing.is_empty() {
                resolved.missing.push(MissingRevisions {
                    repo: repo.repo_name(),
                    revs: missing.iter().map(ToString::to_string).collect(),
                });
            }
            if !found.is_empty() {
                resolved
                    .repo_revs
                    .push(RepositoryRevisions::new(repo.repo_name(), found));
            }
        }

        Ok(resolved)
    }

    async fn expand_ref_globs(
        &self,
        ctx: &SearchContext,
        repo: &RepoName,
        globs: &[RevisionSpecifier],
    ) -> Result<Vec<String>> {
        self.latency.wait(ctx, "", &self.stats).await?;

        let corpus_repo = self
            .corpus
            .repo(&repo.name)
            .ok_or_else(|| SearchError::RepoNotFound {
                repo: repo.name.clone(),
            })?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for glob in globs {
            match glob {
                RevisionSpecifier::RefGlob(g) => include.push(glob_regex(g)?),
                RevisionSpecifier::ExcludeRefGlob(g) => exclude.push(glob_regex(g)?),
                RevisionSpecifier::Rev(_) => {}
            }
        }

        let matches = |res: &[Regex], name: &str| {
            let full = format!("refs/heads/{}", name);
            res.iter().any(|re| re.is_match(name) || re.is_match(&full))
        };

        Ok(corpus_repo
            .revisions
            .iter()
            .filter(|r| matches(&include, &r.name) && !matches(&exclude, &r.name))
            .map(|r| r.name.clone())
            .collect())
    }
}

/// The three in-memory backends over one corpus
pub struct MemoryBackends {
    pub indexed: Arc<MemoryIndexed>,
    pub unindexed: Arc<MemoryUnindexed>,
    pub repos: Arc<MemoryRepoProvider>,
}

impl MemoryBackends {
    pub fn new(corpus: Corpus) -> Self {
        let corpus = Arc::new(corpus);
        Self {
            indexed: Arc::new(MemoryIndexed::new(corpus.clone())),
            unindexed: Arc::new(MemoryUnindexed::new(corpus.clone())),
            repos: Arc::new(MemoryRepoProvider::new(corpus)),
        }
    }

    pub fn clients(&self, settings: SearchSettings) -> Clients {
        Clients {
            indexed: Some(self.indexed.clone()),
            unindexed: self.unindexed.clone(),
            repos: self.repos.clone(),
            settings,
        }
    }
}

fn glob_regex(glob: &str) -> Result<Regex> {
    let pattern = regex::escape(glob).replace(r"\*", ".*").replace(r"\?", ".");
    compile_regex(&format!("^{}$", pattern), true)
}

/// Merge line matches on the same line, ordered by line number
fn merge_lines(lines: Vec<IndexedLineMatch>) -> Vec<IndexedLineMatch> {
    let mut by_line: BTreeMap<(bool, u32), IndexedLineMatch> = BTreeMap::new();
    for lm in lines {
        match by_line.get_mut(&(lm.file_name, lm.line_number)) {
            Some(existing) => {
                for frag in lm.fragments {
                    if !existing.fragments.contains(&frag) {
                        existing.fragments.push(frag);
                    }
                }
                existing.fragments.sort_by_key(|f| f.offset);
            }
            None => {
                by_line.insert((lm.file_name, lm.line_number), lm);
            }
        }
    }
    by_line.into_values().collect()
}

struct Doc<'a> {
    repo: &'a CorpusRepo,
    branch: &'a str,
    rev: &'a CorpusRevision,
    file: &'a CorpusFile,
}

/// An [`IndexedQuery`] with its regular expressions compiled
enum Matcher {
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
    Atom {
        source: String,
        re: Regex,
        file_name: bool,
        content: bool,
    },
    Symbol(Box<Matcher>),
    RepoHasFile(Box<Matcher>),
    Branches(BTreeMap<String, Vec<String>>),
    Const(bool),
}

impl Matcher {
    fn compile(q: &IndexedQuery) -> Result<Self> {
        let compile_all = |qs: &[IndexedQuery]| qs.iter().map(Matcher::compile).collect::<Result<Vec<_>>>();
        Ok(match q {
            IndexedQuery::And(qs) => Matcher::And(compile_all(qs)?),
            IndexedQuery::Or(qs) => Matcher::Or(compile_all(qs)?),
            IndexedQuery::Not(q) => Matcher::Not(Box::new(Matcher::compile(q)?)),
            IndexedQuery::Substring {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => Matcher::Atom {
                source: pattern.clone(),
                re: compile_regex(&regex::escape(pattern), *case_sensitive)?,
                file_name: *file_name,
                content: *content,
            },
            IndexedQuery::Regexp {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => Matcher::Atom {
                source: pattern.clone(),
                re: compile_regex(pattern, *case_sensitive)?,
                file_name: *file_name,
                content: *content,
            },
            IndexedQuery::Symbol(q) => Matcher::Symbol(Box::new(Matcher::compile(q)?)),
            IndexedQuery::RepoHasFile(q) => Matcher::RepoHasFile(Box::new(Matcher::compile(q)?)),
            IndexedQuery::RepoBranches(set) => Matcher::Branches(set.clone()),
            IndexedQuery::Const(b) => Matcher::Const(*b),
        })
    }

    /// The first content pattern in the query, used to pick a latency
    fn first_pattern(&self) -> Option<String> {
        match self {
            Matcher::Atom { source, .. } => Some(source.clone()),
            Matcher::And(ms) | Matcher::Or(ms) => ms.iter().find_map(Matcher::first_pattern),
            Matcher::Not(m) | Matcher::Symbol(m) => m.first_pattern(),
            _ => None,
        }
    }

    fn matches_text(&self, text: &str) -> bool {
        match self {
            Matcher::Atom { re, .. } => re.is_match(text),
            Matcher::Not(m) => !m.matches_text(text),
            Matcher::And(ms) => ms.iter().all(|m| m.matches_text(text)),
            Matcher::Or(ms) => ms.iter().any(|m| m.matches_text(text)),
            Matcher::Const(b) => *b,
            _ => false,
        }
    }

    /// Line matches if the document matches, `None` otherwise
    fn eval(&self, doc: &Doc<'_>) -> Option<Vec<IndexedLineMatch>> {
        match self {
            Matcher::Const(b) => b.then(Vec::new),
            Matcher::Branches(set) => set
                .get(&doc.repo.name)
                .is_some_and(|branches| branches.iter().any(|b| b == doc.branch))
                .then(Vec::new),
            Matcher::Atom {
                re,
                file_name,
                content,
                ..
            } => {
                let mut out = Vec::new();
                if *content {
                    for (n, line) in doc.file.content.lines().enumerate() {
                        let fragments = fragments(re, line);
                        if !fragments.is_empty() {
                            out.push(IndexedLineMatch {
                                line: line.to_string(),
                                line_number: n as u32,
                                fragments,
                                file_name: false,
                            });
                        }
                    }
                }
                if *file_name && re.is_match(&doc.file.path) {
                    out.push(IndexedLineMatch {
                        line: doc.file.path.clone(),
                        line_number: 0,
                        fragments: fragments(re, &doc.file.path),
                        file_name: true,
                    });
                }
                (!out.is_empty()).then_some(out)
            }
            Matcher::And(ms) => {
                let mut out = Vec::new();
                for m in ms {
                    out.extend(m.eval(doc)?);
                }
                Some(out)
            }
            Matcher::Or(ms) => {
                let mut matched = false;
                let mut out = Vec::new();
                for m in ms {
                    if let Some(lines) = m.eval(doc) {
                        matched = true;
                        out.extend(lines);
                    }
                }
                matched.then_some(out)
            }
            Matcher::Not(m) => match m.eval(doc) {
                Some(_) => None,
                None => Some(Vec::new()),
            },
            Matcher::Symbol(m) => {
                let lines: Vec<&str> = doc.file.content.lines().collect();
                let out: Vec<IndexedLineMatch> = doc
                    .file
                    .symbols
                    .iter()
                    .filter(|sym| m.matches_text(&sym.name))
                    .map(|sym| {
                        let line = lines.get(sym.line as usize).copied().unwrap_or_default();
                        IndexedLineMatch {
                            line: line.to_string(),
                            line_number: sym.line,
                            fragments: vec![IndexedFragment {
                                offset: line.find(&sym.name).unwrap_or(0) as u32,
                                length: sym.name.len() as u32,
                                symbol: Some(IndexedSymbol {
                                    name: sym.name.clone(),
                                    kind: sym.kind.clone(),
                                }),
                            }],
                            file_name: false,
                        }
                    })
                    .collect();
                (!out.is_empty()).then_some(out)
            }
            Matcher::RepoHasFile(m) => doc
                .rev
                .files
                .iter()
                .any(|file| m.eval(&Doc { file, ..*doc }).is_some())
                .then(Vec::new),
        }
    }
}

fn fragments(re: &Regex, text: &str) -> Vec<IndexedFragment> {
    re.find_iter(text)
        .filter(|m| !m.is_empty())
        .map(|m| IndexedFragment {
            offset: m.start() as u32,
            length: m.len() as u32,
            symbol: None,
        })
        .collect()
}

/// Pattern matching for the unindexed backend
struct FileSearcher<'a> {
    info: &'a TextPatternInfo,
    kind: UnindexedKind,
    re: Regex,
    paths: PathFilter,
    repo_include: Vec<Regex>,
    repo_exclude: Vec<Regex>,
}

impl<'a> FileSearcher<'a> {
    fn new(info: &'a TextPatternInfo, kind: UnindexedKind) -> Result<Self> {
        let re = match kind {
            UnindexedKind::Structural => structural_regex(&info.pattern, info.is_case_sensitive)?,
            _ => info.pattern_regex()?,
        };
        let case = info.path_patterns_are_case_sensitive;
        Ok(Self {
            info,
            kind,
            re,
            paths: PathFilter::new(info)?,
            repo_include: info
                .file_patterns_repos_must_include
                .iter()
                .map(|p| compile_regex(p, case))
                .collect::<Result<_>>()?,
            repo_exclude: info
                .file_patterns_repos_must_exclude
                .iter()
                .map(|p| compile_regex(p, case))
                .collect::<Result<_>>()?,
        })
    }

    fn repo_matches(&self, rev: &CorpusRevision) -> bool {
        let has = |re: &Regex| rev.files.iter().any(|f| re.is_match(&f.path));
        self.repo_include.iter().all(has) && !self.repo_exclude.iter().any(has)
    }

    fn search(&self, repo: &CorpusRepo, rev: &CorpusRevision, file: &CorpusFile) -> Option<FileMatch> {
        if !self.paths.matches(&file.path) {
            return None;
        }

        let mut m = FileMatch::new(File {
            repo: repo.repo_name(),
            commit_id: rev.commit.clone(),
            input_rev: None,
            path: file.path.clone(),
        });

        match self.kind {
            UnindexedKind::Symbol => {
                m.symbols = file
                    .symbols
                    .iter()
                    .filter(|s| self.re.is_match(&s.name))
                    .map(|s| SymbolMatch {
                        name: s.name.clone(),
                        kind: s.kind.clone(),
                        line_number: s.line,
                    })
                    .collect();
                (!m.symbols.is_empty()).then_some(m)
            }
            UnindexedKind::Text | UnindexedKind::Structural => {
                let (content, path) = match self.kind {
                    UnindexedKind::Structural => (true, false),
                    _ => self.info.targets(),
                };
                if content {
                    m.line_matches = file
                        .content
                        .lines()
                        .enumerate()
                        .filter_map(|(n, line)| {
                            let offsets: Vec<(u32, u32)> = fragments(&self.re, line)
                                .into_iter()
                                .map(|f| (f.offset, f.length))
                                .collect();
                            (!offsets.is_empty()).then(|| LineMatch::new(n as u32, line, offsets))
                        })
                        .collect();
                }
                let path_match = path && self.re.is_match(&file.path);
                let matched = !m.line_matches.is_empty() || path_match;

                if self.info.is_negated && self.kind == UnindexedKind::Text {
                    m.line_matches.clear();
                    return (!matched).then_some(m);
                }
                matched.then_some(m)
            }
        }
    }
}

/// Translate a structural pattern into a line regex. Holes (`:[name]`)
/// match any text lazily; everything else is literal.
fn structural_regex(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    let mut out = String::new();
    let mut rest = pattern;
    while let Some(start) = rest.find(":[") {
        out.push_str(&regex::escape(&rest[..start]));
        match rest[start..].find(']') {
            Some(end) => {
                out.push_str(".*?");
                rest = &rest[start + end + 1..];
            }
            None => {
                out.push_str(&regex::escape(&rest[start..]));
                rest = "";
            }
        }
    }
    out.push_str(&regex::escape(rest));
    compile_regex(&out, case_sensitive)
}
