use searchcore::backend::memory::{Corpus, MemoryBackends, MemoryIndexed, MemoryRepoProvider, MemoryUnindexed};
use searchcore::backend::Clients;
use searchcore::config::SearchSettings;
use searchcore::error::SearchError;
use searchcore::job::{execute, Job, Outcome, Plan};
use searchcore::result::{sort_matches, Match};
use searchcore::search::SearchContext;
use searchcore::streaming::{Aggregator, RepoStatus, Stats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const CORPUS: &str = r#"
[[repos]]
id = 1
name = "acme/indexed"
has_symbols = true
indexed_branches = ["HEAD", "v2"]

[[repos.revisions]]
name = "HEAD"
commit = "aaaa000011112222"
files = [
    { path = "f1.go", content = "alpha\n" },
    { path = "f2.go", content = "alpha beta\n" },
    { path = "f3.go", content = "beta\n" },
    { path = "f4.go", content = "gamma\n" },
]

[[repos.revisions]]
name = "v2"
commit = "bbbb000011112222"
files = [
    { path = "f1.go", content = "alpha v2\n" },
]

[[repos]]
id = 2
name = "acme/plain"

[[repos.revisions]]
name = "HEAD"
commit = "cccc000011112222"
files = [
    { path = "f1.go", content = "alpha delta\n" },
    { path = "f2.go", content = "alpha beta\n" },
    { path = "f3.go", content = "beta\n" },
    { path = "f4.go", content = "gamma\n" },
]
"#;

fn corpus() -> Arc<Corpus> {
    Arc::new(Corpus::from_toml(CORPUS).unwrap())
}

fn clients(settings: SearchSettings) -> Arc<Clients> {
    let backends = MemoryBackends::new(Corpus::from_toml(CORPUS).unwrap());
    Arc::new(backends.clients(settings))
}

fn job(plan: &str) -> Job {
    Plan::from_json(plan)
        .unwrap()
        .into_job(&SearchSettings::default())
        .unwrap()
}

async fn run(job: Job, clients: Arc<Clients>, limit: usize) -> (Vec<Match>, Stats, Outcome) {
    let agg = Aggregator::new();
    let outcome = execute(
        job,
        &SearchContext::background(),
        clients,
        agg.clone(),
        limit,
        Duration::from_secs(10),
    )
    .await;
    let (mut matches, stats) = agg.take();
    sort_matches(&mut matches);
    (matches, stats, outcome)
}

/// `repo/path` for file matches, the repository name otherwise
fn found(matches: &[Match]) -> Vec<String> {
    matches
        .iter()
        .map(|m| match m {
            Match::File(fm) => format!("{}/{}", fm.file.repo.name, fm.file.path),
            other => other.repo_name().name.clone(),
        })
        .collect()
}

const AND_PLAN: &str = r#"{"and": [
    {"text": {"pattern": "alpha", "repos": ["^acme/"]}},
    {"text": {"pattern": "beta", "repos": ["^acme/"]}}
]}"#;

#[tokio::test]
async fn test_and_intersects_across_backends() {
    let (matches, stats, outcome) = run(job(AND_PLAN), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(
        found(&matches),
        vec!["acme/indexed/f2.go", "acme/plain/f2.go"]
    );
    assert!(!stats.is_limit_hit);
    assert_eq!(stats.status.get(1), RepoStatus::SEARCHED | RepoStatus::INDEXED);
    assert_eq!(stats.status.get(2), RepoStatus::SEARCHED);
}

#[tokio::test]
async fn test_and_result_independent_of_child_latency() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: Some(Arc::new(
            MemoryIndexed::new(corpus.clone()).with_pattern_latency("alpha", Duration::from_millis(60)),
        )),
        unindexed: Arc::new(
            MemoryUnindexed::new(corpus.clone()).with_pattern_latency("beta", Duration::from_millis(30)),
        ),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });

    let (matches, _, outcome) = run(job(AND_PLAN), clients, 100).await;

    assert!(outcome.is_ok());
    assert_eq!(
        found(&matches),
        vec!["acme/indexed/f2.go", "acme/plain/f2.go"]
    );
}

#[tokio::test]
async fn test_or_limit_keeps_one_distinct_match() {
    let plan = r#"{"or": {"limit": 1, "children": [
        {"text": {"pattern": "delta", "repos": ["^acme/plain$"]}},
        {"text": {"pattern": "gamma", "repos": ["^acme/plain$"]}}
    ]}}"#;

    let (matches, _, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(matches.len(), 1);
    let path = &found(&matches)[0];
    assert!(
        path == "acme/plain/f1.go" || path == "acme/plain/f4.go",
        "unexpected match {}",
        path
    );
}

#[tokio::test]
async fn test_or_limit_cancels_slow_children() {
    let corpus = corpus();
    let unindexed =
        MemoryUnindexed::new(corpus.clone()).with_pattern_latency("delta", Duration::from_secs(30));
    let calls = unindexed.stats();
    let clients = Arc::new(Clients {
        indexed: None,
        unindexed: Arc::new(unindexed),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let plan = r#"{"or": {"limit": 1, "children": [
        {"text": {"pattern": "delta", "repos": ["^acme/plain$"]}},
        {"text": {"pattern": "gamma", "repos": ["^acme/plain$"]}}
    ]}}"#;

    let started = Instant::now();
    let (matches, _, outcome) = run(job(plan), clients, 100).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.is_ok());
    assert_eq!(found(&matches), vec!["acme/plain/f4.go"]);
    assert_eq!(calls.calls(), 2);
    assert_eq!(calls.canceled(), 1);
}

#[tokio::test]
async fn test_or_deduplicates_children() {
    let plan = r#"{"or": {"children": [
        {"text": {"pattern": "alpha", "repos": ["^acme/plain$"]}},
        {"text": {"pattern": "beta", "repos": ["^acme/plain$"]}}
    ]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(
        found(&matches),
        vec![
            "acme/plain/f1.go",
            "acme/plain/f2.go",
            "acme/plain/f3.go",
        ]
    );
    assert_eq!(stats.status.get(2), RepoStatus::SEARCHED);
}

#[tokio::test]
async fn test_index_no_skips_the_index() {
    let plan = r#"{"text": {"pattern": "gamma", "index": "no", "repos": ["^acme/indexed$"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(found(&matches), vec!["acme/indexed/f4.go"]);
    assert_eq!(stats.status.get(1), RepoStatus::SEARCHED);
}

#[tokio::test]
async fn test_index_only() {
    let plan = r#"{"text": {"pattern": "gamma", "index": "only", "repos": ["^acme/"]}}"#;
    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(found(&matches), vec!["acme/indexed/f4.go"]);
    assert!(stats.status.get(2).is_empty());

    let plan = r#"{"text": {"pattern": "gamma", "index": "only", "repos": ["^acme/plain$"]}}"#;
    let (matches, _, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(matches.is_empty());
    assert!(matches!(outcome.error, Some(SearchError::IndexOnly(_))));
}

#[tokio::test]
async fn test_unavailable_index_falls_back() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: Some(Arc::new(MemoryIndexed::new(corpus.clone()).unavailable())),
        unindexed: Arc::new(MemoryUnindexed::new(corpus.clone())),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let plan = r#"{"text": {"pattern": "gamma", "repos": ["^acme/"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients, 100).await;

    assert!(outcome.is_ok());
    assert_eq!(
        found(&matches),
        vec!["acme/indexed/f4.go", "acme/plain/f4.go"]
    );
    assert_eq!(stats.backends_missing, 1);
    assert!(stats.status.filter(RepoStatus::INDEXED).is_empty());
}

#[tokio::test]
async fn test_unindexed_budget_reports_missing() {
    let settings = SearchSettings {
        unindexed_repo_budget: 0,
        ..SearchSettings::default()
    };
    let plan = r#"{"text": {"pattern": "gamma", "repos": ["^acme/"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(settings), 100).await;

    assert_eq!(found(&matches), vec!["acme/indexed/f4.go"]);
    assert_eq!(stats.status.get(2), RepoStatus::MISSING);
    let alert = outcome.into_result().unwrap().unwrap();
    assert_eq!(alert.title, "Too many unindexed repositories");
    assert_eq!(alert.proposed_queries[0].query, "index:only");
}

#[tokio::test]
async fn test_missing_revisions_alert() {
    let plan = r#"{"text": {"pattern": "gamma", "repos": ["^acme/plain$@nope"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(matches.is_empty());
    assert_eq!(stats.status.get(2), RepoStatus::MISSING);
    let alert = outcome.into_result().unwrap().unwrap();
    assert_eq!(alert.title, "Some revisions could not be found");
    assert!(alert.description.contains("acme/plain@nope"));
}

#[tokio::test]
async fn test_non_default_branch_revision_search() {
    let plan = r#"{"text": {"pattern": "v2", "repos": ["^acme/indexed$@v2"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(found(&matches), vec!["acme/indexed/f1.go"]);
    assert_eq!(matches[0].url(), "/acme/indexed@v2/-/blob/f1.go");
    assert!(stats.status.get(1).contains(RepoStatus::INDEXED));
}

#[tokio::test]
async fn test_structural_search() {
    let plan = r#"{"structural": {"pattern": "alpha :[rest]", "repos": ["^acme/"]}}"#;
    let (matches, _, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(
        found(&matches),
        vec![
            "acme/indexed/f2.go",
            "acme/plain/f1.go",
            "acme/plain/f2.go",
        ]
    );

    let plan = r#"{"structural": {"pattern": "alpha :[rest]", "repos": ["^acme/indexed$@v2"]}}"#;
    let (matches, _, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(matches.is_empty());
    assert!(matches!(outcome.error, Some(SearchError::StructuralNonDefaultBranch)));
}

#[tokio::test]
async fn test_repo_search() {
    let plan = r#"{"repo": {"pattern": "plain"}}"#;
    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 100).await;

    assert!(outcome.is_ok());
    assert_eq!(found(&matches), vec!["acme/plain"]);
    assert_eq!(stats.status.filter(RepoStatus::SEARCHED), vec![1, 2]);
}

#[tokio::test]
async fn test_execute_limit_is_not_an_error() {
    let plan = r#"{"text": {"pattern": "alpha", "repos": ["^acme/"]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients(SearchSettings::default()), 1).await;

    assert!(outcome.error.is_none());
    assert!(stats.is_limit_hit);
    assert!(!matches.is_empty());
}

#[tokio::test]
async fn test_slow_repository_times_out() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: None,
        unindexed: Arc::new(
            MemoryUnindexed::new(corpus.clone()).with_pattern_latency("gamma", Duration::from_secs(30)),
        ),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let agg = Aggregator::new();

    let outcome = execute(
        job(r#"{"text": {"pattern": "gamma", "repos": ["^acme/plain$"]}}"#),
        &SearchContext::background(),
        clients,
        agg.clone(),
        100,
        Duration::from_millis(100),
    )
    .await;

    assert!(outcome.error.is_none());
    assert!(agg.results().is_empty());
    assert_eq!(agg.stats().status.get(2), RepoStatus::TIMED_OUT);
}

#[tokio::test]
async fn test_or_reports_timeout_alert() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: Some(Arc::new(
            MemoryIndexed::new(corpus.clone()).with_pattern_latency("gamma", Duration::from_secs(30)),
        )),
        unindexed: Arc::new(MemoryUnindexed::new(corpus.clone())),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let plan = r#"{"or": {"children": [
        {"text": {"pattern": "gamma", "repos": ["^acme/indexed$"]}},
        {"text": {"pattern": "delta", "repos": ["^acme/plain$"]}}
    ]}}"#;
    let agg = Aggregator::new();

    let started = Instant::now();
    let outcome = execute(
        job(plan),
        &SearchContext::background(),
        clients,
        agg.clone(),
        100,
        Duration::from_millis(100),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.error.is_none());
    let alert = outcome.alert.unwrap();
    assert_eq!(alert.title, "Timed out while searching");
    assert_eq!(found(&agg.results()), vec!["acme/plain/f1.go"]);
}

/// Clients whose index listing is slow, so index-only searches fail late
fn slow_listing_clients() -> Arc<Clients> {
    let corpus = corpus();
    Arc::new(Clients {
        indexed: Some(Arc::new(
            MemoryIndexed::new(corpus.clone()).with_pattern_latency("", Duration::from_millis(50)),
        )),
        unindexed: Arc::new(MemoryUnindexed::new(corpus.clone())),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    })
}

#[tokio::test]
async fn test_and_child_error_keeps_alert() {
    let plan = r#"{"and": [
        {"text": {"pattern": "gamma", "index": "no", "repos": ["^acme/plain$@nope"]}},
        {"text": {"pattern": "gamma", "index": "only", "repos": ["^acme/plain$"]}}
    ]}"#;

    let (matches, _, outcome) = run(job(plan), slow_listing_clients(), 100).await;

    assert!(matches.is_empty());
    assert!(matches!(outcome.error, Some(SearchError::IndexOnly(_))));
    let alert = outcome.alert.unwrap();
    assert_eq!(alert.title, "Some revisions could not be found");
}

#[tokio::test]
async fn test_or_passes_child_error_through() {
    let plan = r#"{"or": {"children": [
        {"text": {"pattern": "gamma", "index": "only", "repos": ["^acme/plain$"]}},
        {"text": {"pattern": "delta", "index": "no", "repos": ["^acme/plain$"]}}
    ]}}"#;

    let (matches, _, outcome) = run(job(plan), slow_listing_clients(), 100).await;

    assert!(matches!(outcome.error, Some(SearchError::IndexOnly(_))));
    assert_eq!(found(&matches), vec!["acme/plain/f1.go"]);
}

#[tokio::test]
async fn test_or_keeps_alert_of_canceled_child() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: None,
        unindexed: Arc::new(
            MemoryUnindexed::new(corpus.clone())
                .with_pattern_latency("delta", Duration::from_secs(30))
                .with_pattern_latency("gamma", Duration::from_millis(50)),
        ),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let plan = r#"{"or": {"limit": 1, "children": [
        {"text": {"pattern": "delta", "repos": ["^acme/plain$", "^acme/indexed$@nope"]}},
        {"text": {"pattern": "gamma", "repos": ["^acme/plain$"]}}
    ]}}"#;

    let started = Instant::now();
    let (matches, _, outcome) = run(job(plan), clients, 100).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.error.is_none());
    assert_eq!(found(&matches), vec!["acme/plain/f4.go"]);
    let alert = outcome.alert.unwrap();
    assert_eq!(alert.title, "Some revisions could not be found");
}

#[tokio::test]
async fn test_or_counts_stats_of_truncated_child() {
    let corpus = corpus();
    let clients = Arc::new(Clients {
        indexed: None,
        unindexed: Arc::new(
            MemoryUnindexed::new(corpus.clone()).with_pattern_latency("gamma", Duration::from_secs(30)),
        ),
        repos: Arc::new(MemoryRepoProvider::new(corpus)),
        settings: SearchSettings::default(),
    });
    let plan = r#"{"or": {"limit": 1, "children": [
        {"text": {"pattern": "alpha", "repos": ["^acme/plain$"]}},
        {"text": {"pattern": "gamma", "repos": ["^acme/indexed$"]}}
    ]}}"#;

    let (matches, stats, outcome) = run(job(plan), clients, 100).await;

    assert!(outcome.is_ok());
    // Two files match alpha, only one fits under the cap
    assert_eq!(matches.len(), 1);
    let path = &found(&matches)[0];
    assert!(
        path == "acme/plain/f1.go" || path == "acme/plain/f2.go",
        "unexpected match {}",
        path
    );
    assert_eq!(stats.status.get(2), RepoStatus::SEARCHED);
}
