//! Routing of repository revisions between the indexed and unindexed
//! backends, and execution of indexed searches.

mod query;
mod repos;
mod request;

pub use query::{result_count_factor, to_indexed_query, IndexedQuery, SearchOptions};
pub use repos::{zoekt_indexed_repos, IndexedRepoRevs};
pub use request::{limit_unindexed_repos, IndexedSearchRequest};

use serde::{Deserialize, Serialize};

/// What an indexed search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexedRequestType {
    Text,
    Symbol,
    /// Candidate files for a structural search
    Structural,
}
