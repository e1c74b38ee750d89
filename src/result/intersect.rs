// Streaming set intersection over matches reported by several sources
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

use crate::result::{Key, Match};

struct Pending {
    /// One flag per source; set once that source has reported the match
    reported: Vec<bool>,
    count: usize,
    merged: Match,
}

/// Online intersection of the matches reported by `num_sources` sources.
///
/// A match is released exactly once, as soon as every source has reported
/// it. Later reports of a released match are ignored.
pub struct IntersectionMerger {
    num_sources: usize,
    pending: HashMap<Key, Pending>,
    released: HashSet<Key>,
}

impl IntersectionMerger {
    pub fn new(num_sources: usize) -> Self {
        Self {
            num_sources,
            pending: HashMap::new(),
            released: HashSet::new(),
        }
    }

    /// Record matches from `source` and return the ones that are now
    /// present in every source, merged across all their reports.
    pub fn add_matches(&mut self, matches: Vec<Match>, source: usize) -> Vec<Match> {
        debug_assert!(source < self.num_sources);

        let mut complete = Vec::new();
        for m in matches {
            let key = m.key();
            if self.released.contains(&key) {
                continue;
            }

            let done = match self.pending.get_mut(&key) {
                Some(entry) => {
                    entry.merged.merge(&m);
                    if !entry.reported[source] {
                        entry.reported[source] = true;
                        entry.count += 1;
                    }
                    entry.count == self.num_sources
                }
                None => {
                    let mut reported = vec![false; self.num_sources];
                    reported[source] = true;
                    self.pending.insert(
                        key.clone(),
                        Pending {
                            reported,
                            count: 1,
                            merged: m,
                        },
                    );
                    self.num_sources == 1
                }
            };

            if done {
                if let Some(entry) = self.pending.remove(&key) {
                    self.released.insert(key);
                    complete.push(entry.merged);
                }
            }
        }
        complete
    }

    /// Number of identities seen by at least one, but not all, sources
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::testutil::*;

    #[test]
    fn test_releases_only_when_all_sources_report() {
        let mut merger = IntersectionMerger::new(3);

        assert!(merger
            .add_matches(vec![file_match("r", "a", &[1]), file_match("r", "b", &[1])], 0)
            .is_empty());
        assert!(merger.add_matches(vec![file_match("r", "a", &[2])], 1).is_empty());
        // Reporting twice from the same source does not count twice
        assert!(merger.add_matches(vec![file_match("r", "a", &[3])], 1).is_empty());

        let out = merger.add_matches(vec![file_match("r", "a", &[4])], 2);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Match::File(fm) => {
                let lines: Vec<u32> = fm.line_matches.iter().map(|l| l.line_number).collect();
                assert_eq!(lines, vec![1, 2, 3, 4]);
            }
            other => panic!("expected file match, got {:?}", other),
        }
        assert_eq!(merger.pending_len(), 1);
    }

    #[test]
    fn test_emits_once() {
        let mut merger = IntersectionMerger::new(2);
        merger.add_matches(vec![repo_match("r")], 0);
        assert_eq!(merger.add_matches(vec![repo_match("r")], 1).len(), 1);
        assert!(merger.add_matches(vec![repo_match("r")], 0).is_empty());
        assert!(merger.add_matches(vec![repo_match("r")], 1).is_empty());
        assert_eq!(merger.pending_len(), 0);
    }
}
