//! searchcore - Search job execution core
//!
//! Runs trees of search jobs over a set of repositories. Leaf jobs route
//! each repository revision to an indexed backend when it has the revision
//! indexed and to an unindexed backend otherwise. AND jobs intersect their
//! children's matches, OR jobs union and deduplicate them under a result
//! cap, and every search streams matches plus mergeable statistics.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod indexed;
pub mod job;
pub mod result;
pub mod search;
pub mod streaming;
pub mod unindexed;

pub use error::{Result, SearchError};
