//! Mergeable search statistics

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

bitflags! {
    /// What happened to a repository during a search
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RepoStatus: u8 {
        const SEARCHED = 1 << 0;
        const INDEXED = 1 << 1;
        const CLONING = 1 << 2;
        const MISSING = 1 << 3;
        const LIMIT_HIT = 1 << 4;
        const TIMED_OUT = 1 << 5;
    }
}

/// Per-repository status, keyed by repository id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatusMap(BTreeMap<u32, RepoStatus>);

impl RepoStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// OR `status` into the entry for `id`
    pub fn update(&mut self, id: u32, status: RepoStatus) {
        *self.0.entry(id).or_default() |= status;
    }

    pub fn get(&self, id: u32) -> RepoStatus {
        self.0.get(&id).copied().unwrap_or_default()
    }

    /// Ids of repositories with every flag in `mask` set
    pub fn filter(&self, mask: RepoStatus) -> Vec<u32> {
        self.0
            .iter()
            .filter(|(_, status)| status.contains(mask))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn union(&mut self, other: &RepoStatusMap) {
        for (id, status) in &other.0 {
            self.update(*id, *status);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, RepoStatus)> + '_ {
        self.0.iter().map(|(id, status)| (*id, *status))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a map with the same status for every id
    pub fn with_status(ids: impl IntoIterator<Item = u32>, status: RepoStatus) -> Self {
        let mut map = Self::new();
        for id in ids {
            map.update(id, status);
        }
        map
    }
}

/// Aggregated counters and repository status for a search.
///
/// [`Stats::update`] is associative and commutative, so partial stats from
/// concurrent producers can be folded in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Some producer stopped early because a result budget was exhausted
    pub is_limit_hit: bool,
    pub status: RepoStatusMap,
    /// Number of backends that could not be reached
    pub backends_missing: usize,
}

impl Stats {
    pub fn limit_hit() -> Self {
        Self {
            is_limit_hit: true,
            ..Self::default()
        }
    }

    pub fn with_status(status: RepoStatusMap) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Fold `other` into `self`
    pub fn update(&mut self, other: &Stats) {
        self.is_limit_hit |= other.is_limit_hit;
        self.status.union(&other.status);
        self.backends_missing += other.backends_missing;
    }

    pub fn is_zero(&self) -> bool {
        *self == Stats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_ors_flags() {
        let mut map = RepoStatusMap::new();
        map.update(1, RepoStatus::SEARCHED);
        map.update(1, RepoStatus::INDEXED);
        map.update(2, RepoStatus::MISSING);

        assert_eq!(map.get(1), RepoStatus::SEARCHED | RepoStatus::INDEXED);
        assert_eq!(map.filter(RepoStatus::MISSING), vec![2]);
        assert_eq!(map.get(3), RepoStatus::empty());
    }

    #[test]
    fn test_update_is_commutative() {
        let a = Stats {
            is_limit_hit: true,
            status: RepoStatusMap::with_status([1, 2], RepoStatus::SEARCHED),
            backends_missing: 1,
        };
        let b = Stats {
            is_limit_hit: false,
            status: RepoStatusMap::with_status([2, 3], RepoStatus::TIMED_OUT),
            backends_missing: 2,
        };

        let mut ab = a.clone();
        ab.update(&b);
        let mut ba = b.clone();
        ba.update(&a);

        assert_eq!(ab, ba);
        assert!(ab.is_limit_hit);
        assert_eq!(ab.backends_missing, 3);
        assert_eq!(ab.status.get(2), RepoStatus::SEARCHED | RepoStatus::TIMED_OUT);
        assert!(Stats::default().is_zero());
    }
}
