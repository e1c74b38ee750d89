//! Resolution of requested revisions against the branches the indexed
//! backend knows about

use crate::backend::{IndexedFileMatch, IndexedRepoSet, IndexedRepository};
use crate::search::{RepoName, RepositoryRevisions, RevisionSpecifier};
use ahash::{HashMap, HashMapExt};
use std::collections::BTreeMap;

/// Repository revisions that will be served by the indexed backend.
///
/// For every repository, `repo_branches[name][i]` is the indexed branch
/// that `repo_revs[name].revs[i]` resolved to.
#[derive(Debug, Default)]
pub struct IndexedRepoRevs {
    repo_revs: HashMap<String, RepositoryRevisions>,
    repo_branches: HashMap<String, Vec<String>>,
    /// Set when any resolved branch is not a repository's primary branch
    pub not_head_only_search: bool,
}

impl IndexedRepoRevs {
    pub fn new() -> Self {
        Self {
            repo_revs: HashMap::new(),
            repo_branches: HashMap::new(),
            not_head_only_search: false,
        }
    }

    /// Track the revisions of `reporev` that `repo` has indexed. Returns the
    /// revisions that are not indexed.
    pub fn add(
        &mut self,
        reporev: &RepositoryRevisions,
        repo: &IndexedRepository,
    ) -> Vec<RevisionSpecifier> {
        // A repository is tracked at most once. Should it show up again its
        // revisions are treated as unindexed.
        if self.repo_branches.contains_key(&reporev.repo.name) {
            return reporev.revs.clone();
        }

        // Globs cannot be resolved against a fixed set of branches
        if !reporev.only_explicit() {
            return reporev.revs.clone();
        }

        let Some(primary) = repo.branches.first() else {
            return reporev.revs.clone();
        };

        let mut branches = Vec::with_capacity(reporev.revs.len());
        let mut indexed = Vec::with_capacity(reporev.revs.len());
        let mut unindexed = Vec::new();

        for rev in &reporev.revs {
            let spec = rev.as_rev().unwrap_or_default();
            let branch = if spec.is_empty() || spec == "HEAD" {
                Some(primary)
            } else {
                repo.branches
                    .iter()
                    .find(|b| b.name == spec)
                    .or_else(|| {
                        // Abbreviated commit SHA
                        (spec.len() >= 4)
                            .then(|| repo.branches.iter().find(|b| b.version.starts_with(spec)))
                            .flatten()
                    })
            };

            match branch {
                Some(branch) => {
                    branches.push(branch.name.clone());
                    indexed.push(rev.clone());
                }
                None => unindexed.push(rev.clone()),
            }
        }

        if !indexed.is_empty() {
            if branches.iter().any(|b| *b != primary.name) {
                self.not_head_only_search = true;
            }
            self.repo_revs.insert(
                reporev.repo.name.clone(),
                RepositoryRevisions::new(reporev.repo.clone(), indexed),
            );
            self.repo_branches.insert(reporev.repo.name.clone(), branches);
        }

        unindexed
    }

    pub fn len(&self) -> usize {
        self.repo_revs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repo_revs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryRevisions> {
        self.repo_revs.get(name)
    }

    pub fn branches(&self, name: &str) -> Option<&[String]> {
        self.repo_branches.get(name).map(Vec::as_slice)
    }

    pub fn repos(&self) -> impl Iterator<Item = &RepoName> {
        self.repo_revs.values().map(|rr| &rr.repo)
    }

    /// The indexed revisions of every tracked repository
    pub fn revisions(&self) -> impl Iterator<Item = &RepositoryRevisions> {
        self.repo_revs.values()
    }

    /// Branches to search per repository, for the backend query
    pub fn branch_set(&self) -> BTreeMap<String, Vec<String>> {
        self.repo_branches
            .iter()
            .map(|(name, branches)| {
                let mut branches = branches.clone();
                branches.sort();
                branches.dedup();
                (name.clone(), branches)
            })
            .collect()
    }

    /// The repository of `file` and the input revisions that led to it.
    ///
    /// A file found on several branches yields one input revision per
    /// requested revision on those branches. When no branch matches, the
    /// file's version is used so links still resolve.
    pub fn input_revs(&self, file: &IndexedFileMatch) -> Option<(&RepoName, Vec<String>)> {
        let repo_rev = self.repo_revs.get(&file.repository)?;
        let branches = self
            .repo_branches
            .get(&file.repository)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut input_revs = Vec::with_capacity(file.branches.len());
        for branch in &file.branches {
            for (i, b) in branches.iter().enumerate() {
                if b == branch {
                    if let Some(rev) = repo_rev.revs.get(i) {
                        input_revs.push(rev.to_string());
                    }
                }
            }
        }
        if input_revs.is_empty() {
            input_revs.push(file.version.clone());
        }

        Some((&repo_rev.repo, input_revs))
    }
}

/// Split `revs` into what the indexed backend can serve and what must go to
/// the unindexed backend. Repositories missing from `indexed_set`, or
/// rejected by `filter`, are unindexed as a whole.
pub fn zoekt_indexed_repos(
    indexed_set: &IndexedRepoSet,
    revs: &[RepositoryRevisions],
    filter: Option<&dyn Fn(&IndexedRepository) -> bool>,
) -> (IndexedRepoRevs, Vec<RepositoryRevisions>) {
    let mut indexed = IndexedRepoRevs::new();
    let mut unindexed = Vec::new();

    for reporev in revs {
        let repo = match indexed_set.get(&reporev.repo.name) {
            Some(repo) if filter.map_or(true, |f| f(repo)) => repo,
            _ => {
                unindexed.push(reporev.clone());
                continue;
            }
        };

        let unindexed_revs = indexed.add(reporev, repo);
        if !unindexed_revs.is_empty() {
            unindexed.push(RepositoryRevisions::new(reporev.repo.clone(), unindexed_revs));
        }
    }

    (indexed, unindexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RepositoryBranch;

    const SHA_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const SHA_B: &str = "b1b2b3b4b5b6b7b8b9b0b1b2b3b4b5b6b7b8b9b0";

    fn indexed_repo(name: &str, branches: &[(&str, &str)]) -> IndexedRepository {
        IndexedRepository {
            id: 1,
            name: name.to_string(),
            branches: branches
                .iter()
                .map(|(n, v)| RepositoryBranch::new(*n, *v))
                .collect(),
            has_symbols: false,
        }
    }

    fn reporev(name: &str, revs: &[&str]) -> RepositoryRevisions {
        RepositoryRevisions::new(
            RepoName::new(1, name),
            revs.iter().map(|r| RevisionSpecifier::parse(r)).collect(),
        )
    }

    #[test]
    fn test_resolves_default_branch_names_and_shas() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A), ("v2", SHA_B)]);
        let mut revs = IndexedRepoRevs::new();

        let unindexed = revs.add(&reporev("foo", &["", "v2", &SHA_B[..8]]), &repo);

        assert!(unindexed.is_empty());
        assert_eq!(
            revs.branches("foo").unwrap(),
            &["HEAD".to_string(), "v2".to_string(), "v2".to_string()]
        );
        assert_eq!(revs.get("foo").unwrap().revs.len(), 3);
        assert!(revs.not_head_only_search);
    }

    #[test]
    fn test_default_branch_only_keeps_head_only_search() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A), ("v2", SHA_B)]);
        let mut revs = IndexedRepoRevs::new();
        assert!(revs.add(&reporev("foo", &["HEAD"]), &repo).is_empty());
        assert!(!revs.not_head_only_search);
    }

    #[test]
    fn test_unknown_rev_is_unindexed() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A), ("v2", SHA_B)]);
        let mut revs = IndexedRepoRevs::new();

        let unindexed = revs.add(&reporev("foo", &["", "v3", "b1b"]), &repo);

        // "b1b" is too short to be treated as a commit prefix
        assert_eq!(
            unindexed,
            vec![RevisionSpecifier::rev("v3"), RevisionSpecifier::rev("b1b")]
        );
        assert_eq!(revs.get("foo").unwrap().revs, vec![RevisionSpecifier::rev("")]);
        assert!(!revs.not_head_only_search);
    }

    #[test]
    fn test_second_occurrence_is_unindexed() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A)]);
        let mut revs = IndexedRepoRevs::new();
        assert!(revs.add(&reporev("foo", &[""]), &repo).is_empty());

        let again = reporev("foo", &["HEAD"]);
        assert_eq!(revs.add(&again, &repo), again.revs);
        assert_eq!(revs.branches("foo").unwrap(), &["HEAD".to_string()]);
    }

    #[test]
    fn test_globs_and_empty_branch_lists() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A)]);
        let mut revs = IndexedRepoRevs::new();
        let globbed = reporev("foo", &["", "*refs/heads/*"]);
        assert_eq!(revs.add(&globbed, &repo), globbed.revs);

        let empty = indexed_repo("bar", &[]);
        let plain = reporev("bar", &[""]);
        assert_eq!(revs.add(&plain, &empty), plain.revs);
        assert!(revs.is_empty());
    }

    #[test]
    fn test_input_revs() {
        let repo = indexed_repo("foo", &[("HEAD", SHA_A), ("v2", SHA_B)]);
        let mut revs = IndexedRepoRevs::new();
        revs.add(&reporev("foo", &["", "v2", &SHA_B[..8]]), &repo);

        let file = IndexedFileMatch {
            repository: "foo".to_string(),
            repository_id: 1,
            file_name: "a.go".to_string(),
            branches: vec!["v2".to_string()],
            version: SHA_B.to_string(),
            line_matches: Vec::new(),
        };
        let (repo_name, input) = revs.input_revs(&file).unwrap();
        assert_eq!(repo_name.name, "foo");
        assert_eq!(input, vec!["v2".to_string(), SHA_B[..8].to_string()]);

        let orphan = IndexedFileMatch {
            branches: vec!["gone".to_string()],
            ..file.clone()
        };
        assert_eq!(revs.input_revs(&orphan).unwrap().1, vec![SHA_B.to_string()]);

        let unknown = IndexedFileMatch {
            repository: "nope".to_string(),
            ..file
        };
        assert!(revs.input_revs(&unknown).is_none());
    }

    #[test]
    fn test_zoekt_indexed_repos_split() {
        let mut set = IndexedRepoSet::default();
        let mut with_symbols = indexed_repo("a", &[("HEAD", SHA_A)]);
        with_symbols.has_symbols = true;
        set.insert("a".to_string(), with_symbols);
        set.insert("b".to_string(), indexed_repo("b", &[("HEAD", SHA_A)]));

        let requested = vec![
            reporev("a", &["", "v9"]),
            reporev("b", &[""]),
            reporev("c", &[""]),
        ];

        let (indexed, unindexed) = zoekt_indexed_repos(&set, &requested, None);
        assert_eq!(indexed.len(), 2);
        assert_eq!(unindexed, vec![reporev("a", &["v9"]), reporev("c", &[""])]);

        let has_symbols: &dyn Fn(&IndexedRepository) -> bool = &|r| r.has_symbols;
        let (indexed, unindexed) = zoekt_indexed_repos(&set, &requested, Some(has_symbols));
        assert_eq!(indexed.len(), 1);
        assert_eq!(
            unindexed,
            vec![reporev("a", &["v9"]), reporev("b", &[""]), reporev("c", &[""])]
        );
    }
}
