//! Types shared by every part of a search: repositories, patterns,
//! cancellation, and alerts.

mod alert;
mod context;
mod pattern;
mod repos;

pub use alert::{Alert, MaxAlerter, ProposedQuery};
pub use context::SearchContext;
pub use pattern::{IndexMode, PathFilter, TextPatternInfo, DEFAULT_MAX_SEARCH_RESULTS};
pub use repos::{
    parse_repository_revisions, RepoFilter, RepoName, RepoOptions, RepositoryRevisions,
    RevisionSpecifier,
};

pub(crate) use pattern::compile as compile_regex;
