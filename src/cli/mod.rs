use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// searchcore - Run search job trees over indexed and unindexed repositories
#[derive(Parser, Debug)]
#[command(name = "searchcore")]
#[command(version, about)]
#[command(
    long_about = "Executes search plans made of AND/OR combinators over a repository corpus.\n\
    Each leaf is routed between an indexed backend and an unindexed backend; \
    results are deduplicated, intersected, and capped as they stream back."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a search plan against a corpus
    Search {
        /// Corpus of repositories (TOML)
        #[arg(long)]
        corpus: PathBuf,

        /// Search plan (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Search timeout (e.g. "500ms", "10s")
        #[arg(short, long)]
        timeout: Option<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how repository revisions split between the backends
    Route {
        /// Corpus of repositories (TOML)
        #[arg(long)]
        corpus: PathBuf,

        /// Repository filters (e.g. "^acme/@main:v2")
        #[arg(required = true)]
        specs: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "searchcore",
            "search",
            "--corpus",
            "corpus.toml",
            "--plan",
            "plan.json",
            "-l",
            "5",
            "--json",
        ]);
        match cli.command {
            Commands::Search {
                limit, json, timeout, ..
            } => {
                assert_eq!(limit, Some(5));
                assert!(json);
                assert!(timeout.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
