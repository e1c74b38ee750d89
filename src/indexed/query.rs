//! Translation of a pattern description into an indexed backend query,
//! and the match budgets sent along with it.

use crate::error::Result;
use crate::indexed::IndexedRequestType;
use crate::search::{compile_regex, TextPatternInfo, DEFAULT_MAX_SEARCH_RESULTS};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Query understood by the indexed backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexedQuery {
    And(Vec<IndexedQuery>),
    Or(Vec<IndexedQuery>),
    Not(Box<IndexedQuery>),
    Substring {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    Regexp {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    /// Match against symbol definitions only
    Symbol(Box<IndexedQuery>),
    /// True for every file of a repository that has a file matching the child
    RepoHasFile(Box<IndexedQuery>),
    /// Restrict to these branches of these repositories
    RepoBranches(BTreeMap<String, Vec<String>>),
    Const(bool),
}

impl IndexedQuery {
    fn file_regexp(pattern: &str, case_sensitive: bool) -> Self {
        IndexedQuery::Regexp {
            pattern: pattern.to_string(),
            case_sensitive,
            file_name: true,
            content: false,
        }
    }

    /// Flatten nested and/or nodes and collapse single-child ones
    pub fn simplify(self) -> Self {
        match self {
            IndexedQuery::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(IndexedQuery::simplify) {
                    match child {
                        IndexedQuery::And(grand) => flat.extend(grand),
                        IndexedQuery::Const(true) => {}
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => IndexedQuery::Const(true),
                    1 => flat.remove(0),
                    _ => IndexedQuery::And(flat),
                }
            }
            IndexedQuery::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.into_iter().map(IndexedQuery::simplify) {
                    match child {
                        IndexedQuery::Or(grand) => flat.extend(grand),
                        IndexedQuery::Const(false) => {}
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => IndexedQuery::Const(false),
                    1 => flat.remove(0),
                    _ => IndexedQuery::Or(flat),
                }
            }
            IndexedQuery::Not(child) => match child.simplify() {
                IndexedQuery::Not(inner) => *inner,
                IndexedQuery::Const(b) => IndexedQuery::Const(!b),
                other => IndexedQuery::Not(Box::new(other)),
            },
            IndexedQuery::Symbol(child) => IndexedQuery::Symbol(Box::new(child.simplify())),
            IndexedQuery::RepoHasFile(child) => {
                IndexedQuery::RepoHasFile(Box::new(child.simplify()))
            }
            other => other,
        }
    }
}

impl fmt::Display for IndexedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, op: &str, children: &[IndexedQuery]) -> fmt::Result {
            write!(f, "({}", op)?;
            for child in children {
                write!(f, " {}", child)?;
            }
            write!(f, ")")
        }
        fn atom(
            f: &mut fmt::Formatter<'_>,
            kind: &str,
            pattern: &str,
            case_sensitive: bool,
            file_name: bool,
            content: bool,
        ) -> fmt::Result {
            let prefix = match (file_name, content) {
                (true, false) => "file_",
                (false, true) => "content_",
                _ => "",
            };
            let case = if case_sensitive { "case_" } else { "" };
            write!(f, "{}{}{}:{:?}", case, prefix, kind, pattern)
        }

        match self {
            IndexedQuery::And(children) => list(f, "and", children),
            IndexedQuery::Or(children) => list(f, "or", children),
            IndexedQuery::Not(child) => write!(f, "(not {})", child),
            IndexedQuery::Substring {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => atom(f, "substr", pattern, *case_sensitive, *file_name, *content),
            IndexedQuery::Regexp {
                pattern,
                case_sensitive,
                file_name,
                content,
            } => atom(f, "regex", pattern, *case_sensitive, *file_name, *content),
            IndexedQuery::Symbol(child) => write!(f, "sym:{}", child),
            IndexedQuery::RepoHasFile(child) => write!(f, "(type:repo {})", child),
            IndexedQuery::RepoBranches(set) => {
                let repos: Vec<String> = set
                    .iter()
                    .map(|(repo, branches)| format!("{}@{}", repo, branches.join(",")))
                    .collect();
                write!(f, "(repobranches {})", repos.join(" "))
            }
            IndexedQuery::Const(b) => write!(f, "{}", b),
        }
    }
}

/// Build the pattern part of an indexed query (everything except the
/// repository restriction)
pub fn to_indexed_query(info: &TextPatternInfo, typ: IndexedRequestType) -> Result<IndexedQuery> {
    let (content, file_name) = info.targets();

    let mut q = if info.is_regexp {
        compile_regex(&info.pattern, info.is_case_sensitive)?;
        IndexedQuery::Regexp {
            pattern: info.pattern.clone(),
            case_sensitive: info.is_case_sensitive,
            file_name,
            content,
        }
    } else {
        IndexedQuery::Substring {
            pattern: info.pattern.clone(),
            case_sensitive: info.is_case_sensitive,
            file_name,
            content,
        }
    };

    if info.is_negated {
        q = IndexedQuery::Not(Box::new(q));
    }
    if typ == IndexedRequestType::Symbol {
        q = IndexedQuery::Symbol(Box::new(q));
    }

    let path_case = info.path_patterns_are_case_sensitive;
    let mut and = vec![q];
    for p in &info.include_patterns {
        compile_regex(p, path_case)?;
        and.push(IndexedQuery::file_regexp(p, path_case));
    }
    if let Some(p) = info.exclude_pattern.as_deref().filter(|p| !p.is_empty()) {
        compile_regex(p, path_case)?;
        and.push(IndexedQuery::Not(Box::new(IndexedQuery::file_regexp(p, path_case))));
    }

    // Conditions on the repository as a whole
    for p in &info.file_patterns_repos_must_include {
        compile_regex(p, path_case)?;
        and.push(IndexedQuery::RepoHasFile(Box::new(IndexedQuery::file_regexp(
            p, path_case,
        ))));
    }
    for p in &info.file_patterns_repos_must_exclude {
        compile_regex(p, path_case)?;
        and.push(IndexedQuery::Not(Box::new(IndexedQuery::RepoHasFile(Box::new(
            IndexedQuery::file_regexp(p, path_case),
        )))));
    }

    Ok(IndexedQuery::And(and).simplify())
}

/// Scale the indexed backend's match budgets with the number of
/// repositories searched: few repositories get more thorough results.
pub fn result_count_factor(num_repos: usize, file_match_limit: usize, global_search: bool) -> usize {
    let mut k = if global_search {
        1
    } else {
        match num_repos {
            0..=5 => 100,
            6..=10 => 10,
            11..=25 => 8,
            26..=50 => 5,
            51..=100 => 3,
            101..=500 => 2,
            _ => 1,
        }
    };
    if file_match_limit > DEFAULT_MAX_SEARCH_RESULTS {
        k = (k as f64 * 3.0 * file_match_limit as f64 / DEFAULT_MAX_SEARCH_RESULTS as f64) as usize;
    }
    k
}

/// Budgets for a single indexed backend search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub max_wall_time: Duration,
    pub shard_max_match_count: usize,
    pub total_max_match_count: usize,
    pub shard_max_important_match: usize,
    pub total_max_important_match: usize,
    pub max_doc_display_count: usize,
}

impl SearchOptions {
    pub fn new(k: usize, info: &TextPatternInfo, default_wall_time: Duration) -> Self {
        let mut opts = Self {
            max_wall_time: default_wall_time,
            shard_max_match_count: 100 * k,
            total_max_match_count: 100 * k,
            shard_max_important_match: 15 * k,
            total_max_important_match: 25 * k,
            max_doc_display_count: 2 * DEFAULT_MAX_SEARCH_RESULTS,
        };

        // Extra file matches are used to populate per-repository limit-hit
        // status, so ask for at least 2000.
        let limit = info.file_match_limit;
        if limit > DEFAULT_MAX_SEARCH_RESULTS {
            opts.max_doc_display_count = 2 * limit;
            let scale = 3.0 * limit as f64 / DEFAULT_MAX_SEARCH_RESULTS as f64;
            opts.max_wall_time = opts.max_wall_time.mul_f64(scale);
        }
        opts.max_doc_display_count = opts.max_doc_display_count.max(2000);

        opts
    }
}
