//! Repository trait definitions

use async_trait::async_trait;
use std::collections::HashMap;

use crate::errors::RepositoryResult;
use crate::models::CacheEntry;

/// Outcome counts of a batch insert
///
/// Conflicts are reported here instead of being raised; callers log the counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertResult {
    /// New keys written
    pub inserted: u64,
    /// Existing keys overwritten by a strictly higher confidence
    pub updated: u64,
    /// Existing keys left untouched (incoming confidence not higher)
    pub kept_existing: u64,
    /// Duplicate-key races lost to a concurrent writer
    pub conflicts: u64,
}

impl InsertResult {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: InsertResult) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.kept_existing += other.kept_existing;
        self.conflicts += other.conflicts;
    }
}

/// Persistent normalized-name -> company id index
///
/// Keys are always normalized names. Implementations must apply the
/// "insert if absent, else keep the higher confidence" rule and must never
/// fail a batch because a key already exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    /// Find the entry for one normalized name
    async fn lookup(&self, normalized_name: &str) -> RepositoryResult<Option<CacheEntry>>;

    /// Find entries for many normalized names at once, keyed by name
    async fn lookup_many(
        &self,
        normalized_names: &[String],
    ) -> RepositoryResult<HashMap<String, CacheEntry>>;

    /// Insert or upgrade a batch of entries
    async fn insert_batch(&self, entries: Vec<CacheEntry>) -> RepositoryResult<InsertResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_result_merge() {
        let mut total = InsertResult {
            inserted: 1,
            ..Default::default()
        };
        total.merge(InsertResult {
            inserted: 2,
            updated: 1,
            kept_existing: 3,
            conflicts: 1,
        });
        assert_eq!(total.inserted, 3);
        assert_eq!(total.written(), 4);
        assert_eq!(total.kept_existing, 3);
        assert_eq!(total.conflicts, 1);
    }
}
