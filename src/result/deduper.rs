// Identity-based deduplication of search results
use ahash::{HashMap, HashMapExt};

use crate::result::{CommitMatch, FileMatch, Key, Match, RepoMatch};

/// Merges duplicate results by canonical identity.
///
/// File matches with an identity already seen are merged into the stored
/// entry. Repository and commit duplicates are ignored (first write wins).
#[derive(Debug, Default)]
pub struct Deduper {
    files: HashMap<Key, FileMatch>,
    repos: HashMap<Key, RepoMatch>,
    commits: HashMap<Key, CommitMatch>,
    diffs: HashMap<Key, CommitMatch>,
}

impl Deduper {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            repos: HashMap::new(),
            commits: HashMap::new(),
            diffs: HashMap::new(),
        }
    }

    /// Add a match. Returns true if its identity had not been seen before.
    pub fn add(&mut self, m: Match) -> bool {
        let key = m.key();
        match m {
            Match::File(fm) => {
                if let Some(prev) = self.files.get_mut(&key) {
                    prev.append_matches(&fm);
                    return false;
                }
                self.files.insert(key, fm);
            }
            Match::Repo(rm) => {
                if self.repos.contains_key(&key) {
                    return false;
                }
                self.repos.insert(key, rm);
            }
            Match::Commit(cm) => {
                let seen = if cm.diff {
                    &mut self.diffs
                } else {
                    &mut self.commits
                };
                if seen.contains_key(&key) {
                    return false;
                }
                seen.insert(key, cm);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.repos.len() + self.commits.len() + self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current union of all seen matches, in no particular order
    pub fn results(&self) -> Vec<Match> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.files.values().cloned().map(Match::File));
        out.extend(self.repos.values().cloned().map(Match::Repo));
        out.extend(self.commits.values().cloned().map(Match::Commit));
        out.extend(self.diffs.values().cloned().map(Match::Commit));
        out
    }

    pub fn into_results(self) -> Vec<Match> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.files.into_values().map(Match::File));
        out.extend(self.repos.into_values().map(Match::Repo));
        out.extend(self.commits.into_values().map(Match::Commit));
        out.extend(self.diffs.into_values().map(Match::Commit));
        out
    }
}
