use searchcore::backend::memory::{Corpus, MemoryBackends};
use searchcore::backend::{IndexedBackend, RepoProvider};
use searchcore::cli::{Cli, Commands, ConfigAction};
use searchcore::config::{parse_duration, Config};
use searchcore::error::{Result, SearchError};
use searchcore::indexed::zoekt_indexed_repos;
use searchcore::job::{execute, Plan};
use searchcore::result::{result_count, sort_matches, Match};
use searchcore::search::{RepoOptions, SearchContext};
use searchcore::streaming::{Aggregator, RepoStatus};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let config = load_config(cli.config.clone())?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Search {
            corpus,
            plan,
            limit,
            timeout,
            json,
        } => {
            cmd_search(&config, corpus, plan, limit, timeout, json).await?;
        }
        Commands::Route { corpus, specs } => {
            cmd_route(&config, corpus, &specs).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, &config, action)?;
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "searchcore=debug"
    } else {
        config.logging.filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_search(
    config: &Config,
    corpus: PathBuf,
    plan: PathBuf,
    limit: Option<usize>,
    timeout: Option<String>,
    json: bool,
) -> Result<()> {
    let settings = config.settings()?;
    let backends = MemoryBackends::new(Corpus::load(&corpus)?);
    let job = Plan::load(&plan)?.into_job(&settings)?;

    let limit = limit.unwrap_or(settings.max_results);
    let timeout = match timeout {
        Some(t) => parse_duration("--timeout", &t)?,
        None => settings.timeout,
    };

    let clients = Arc::new(backends.clients(settings));
    let agg = Aggregator::new();
    let outcome = execute(
        job,
        &SearchContext::background(),
        clients,
        agg.clone(),
        limit,
        timeout,
    )
    .await;

    let (mut matches, stats) = agg.take();
    sort_matches(&mut matches);
    let alert = outcome.into_result()?;

    if json {
        let output = serde_json::json!({
            "results": matches,
            "stats": stats,
            "alert": alert,
        });
        let text = serde_json::to_string_pretty(&output).map_err(|e| SearchError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", text);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No results found");
    }
    for m in &matches {
        print_match(m);
    }

    println!();
    println!(
        "{} results in {} matches",
        result_count(&matches),
        matches.len()
    );
    println!(
        "Repositories: {} searched, {} indexed, {} missing, {} timed out",
        stats.status.filter(RepoStatus::SEARCHED).len(),
        stats.status.filter(RepoStatus::INDEXED).len(),
        stats.status.filter(RepoStatus::MISSING).len(),
        stats.status.filter(RepoStatus::TIMED_OUT).len(),
    );
    if stats.is_limit_hit {
        println!("Result limit hit, there may be more results");
    }
    if let Some(alert) = alert {
        println!();
        println!("⚠ {}", alert.title);
        println!("  {}", alert.description);
        for q in &alert.proposed_queries {
            println!("  try: {} ({})", q.query, q.description);
        }
    }

    Ok(())
}

fn print_match(m: &Match) {
    match m {
        Match::File(fm) => {
            println!("{}", m.url());
            for line in &fm.line_matches {
                println!("  {:>5}: {}", line.line_number + 1, line.preview);
            }
            for symbol in &fm.symbols {
                println!("  {:>5}: {} ({})", symbol.line_number + 1, symbol.name, symbol.kind);
            }
        }
        _ => println!("{}", m.url()),
    }
}

async fn cmd_route(config: &Config, corpus: PathBuf, specs: &[String]) -> Result<()> {
    let settings = config.settings()?;
    let backends = MemoryBackends::new(Corpus::load(&corpus)?);
    let ctx = SearchContext::background();

    let opts = RepoOptions::parse(specs)?;
    let resolved = backends.repos.resolve(&ctx, &opts).await?;
    let indexed_set = if settings.indexed_enabled {
        backends.indexed.list_all(&ctx).await?
    } else {
        Default::default()
    };

    let (indexed, unindexed) = zoekt_indexed_repos(&indexed_set, &resolved.repo_revs, None);

    let mut indexed_lines: Vec<String> = indexed.revisions().map(ToString::to_string).collect();
    indexed_lines.sort();

    println!("Indexed ({}):", indexed_lines.len());
    for line in &indexed_lines {
        println!("  {}", line);
    }
    println!("Unindexed ({}):", unindexed.len());
    for repo_revs in &unindexed {
        println!("  {}", repo_revs);
    }
    if !resolved.missing.is_empty() {
        println!("Missing ({}):", resolved.missing.len());
        for missing in &resolved.missing {
            println!("  {}@{}", missing.repo.name, missing.revs.join(":"));
        }
    }
    if indexed.not_head_only_search {
        println!("Note: indexed search covers non-default branches");
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config)?;
            println!("{}", text);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            config.settings()?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
