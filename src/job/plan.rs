//! Serializable description of a job tree
//!
//! ```json
//! {"and": [
//!   {"text": {"pattern": "serve", "repos": ["^acme/"]}},
//!   {"or": {"limit": 10, "children": [
//!     {"text": {"pattern": "port", "include_patterns": ["\\.go$"]}},
//!     {"symbol": {"pattern": "^main$"}}
//!   ]}}
//! ]}
//! ```

use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::job::{
    Job, LeafJob, RepoSearchJob, StructuralSearchJob, SymbolSearchJob, TextSearchJob,
};
use crate::search::{compile_regex, RepoOptions, TextPatternInfo};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    And(Vec<Plan>),
    Or {
        /// Defaults to the configured result budget
        #[serde(default)]
        limit: Option<usize>,
        children: Vec<Plan>,
    },
    Text(LeafPlan),
    Symbol(LeafPlan),
    Structural(LeafPlan),
    Repo {
        pattern: String,
        #[serde(default)]
        repos: Vec<String>,
    },
}

/// A pattern and the repositories to search it in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafPlan {
    #[serde(flatten)]
    pub pattern: TextPatternInfo,
    /// `pattern@rev:rev` repository filters; empty means every repository
    #[serde(default)]
    pub repos: Vec<String>,
}

impl LeafPlan {
    fn build(self, settings: &SearchSettings) -> Result<(TextPatternInfo, RepoOptions)> {
        let mut pattern = self.pattern;
        if pattern.file_match_limit == 0 {
            pattern.file_match_limit = settings.default_limit;
        }
        pattern.validate()?;
        Ok((pattern, RepoOptions::parse(&self.repos)?))
    }
}

impl Plan {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| SearchError::Json {
            source: e,
            context: "Failed to parse plan".to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SearchError::Io {
            source: e,
            context: format!("Failed to read plan: {:?}", path),
        })?;
        Self::from_json(&content)
    }

    /// Validate the plan and build the job tree it describes
    pub fn into_job(self, settings: &SearchSettings) -> Result<Job> {
        Ok(match self {
            Plan::And(children) => Job::and(
                Self::children(children, settings)?,
                settings.max_concurrency,
            ),
            Plan::Or { limit, children } => Job::or(
                Self::children(children, settings)?,
                limit.unwrap_or(settings.max_results),
                settings.max_concurrency,
            ),
            Plan::Text(leaf) => {
                let (pattern, repos) = leaf.build(settings)?;
                Job::Leaf(LeafJob::Text(TextSearchJob { pattern, repos }))
            }
            Plan::Symbol(leaf) => {
                let (pattern, repos) = leaf.build(settings)?;
                Job::Leaf(LeafJob::Symbol(SymbolSearchJob { pattern, repos }))
            }
            Plan::Structural(leaf) => {
                let (pattern, repos) = leaf.build(settings)?;
                Job::Leaf(LeafJob::Structural(StructuralSearchJob { pattern, repos }))
            }
            Plan::Repo { pattern, repos } => Job::Leaf(LeafJob::Repo(RepoSearchJob {
                pattern: compile_regex(&pattern, false)?,
                repos: RepoOptions::parse(&repos)?,
            })),
        })
    }

    fn children(children: Vec<Plan>, settings: &SearchSettings) -> Result<Vec<Job>> {
        children.into_iter().map(|c| c.into_job(settings)).collect()
    }
}
