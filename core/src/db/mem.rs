// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-memory implementation of the store contract.
//!
//! Used by the test suite and by single-node deployments that do not need
//! durability.  Commits are two-phase: every operation in the batch is
//! validated against the current state while holding the lock, and only if
//! all of them pass is any of them applied.

use crate::db::store::{Batch, BatchOp, Bucket, Store, StoreError, Version};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

struct Inner {
    buckets: BTreeMap<String, BTreeMap<String, (Value, Version)>>,
    next_version: u64,
}

pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore {
            inner: Mutex::new(Inner {
                buckets: BTreeMap::new(),
                next_version: 1,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        MemStore::new()
    }
}

impl Inner {
    fn check(&self, op: &BatchOp) -> Result<(), StoreError> {
        let bucket = op.bucket();
        let current = self
            .buckets
            .get(&bucket.name())
            .and_then(|objects| objects.get(op.key()));
        match op {
            BatchOp::Put { expect: None, .. } => match current {
                None => Ok(()),
                Some(_) => Err(StoreError::UniqueConflict {
                    bucket: bucket.clone(),
                    key: op.key().to_string(),
                }),
            },
            BatchOp::Put { expect: Some(expected), .. } => match current {
                Some((_, version)) if version == expected => Ok(()),
                _ => Err(StoreError::VersionConflict {
                    bucket: bucket.clone(),
                    key: op.key().to_string(),
                }),
            },
            BatchOp::Delete { expect: None, .. } => Ok(()),
            BatchOp::Delete { expect: Some(expected), .. } => match current {
                Some((_, version)) if version == expected => Ok(()),
                _ => Err(StoreError::VersionConflict {
                    bucket: bucket.clone(),
                    key: op.key().to_string(),
                }),
            },
        }
    }

    fn apply(&mut self, op: BatchOp) {
        let version = Version::new(self.next_version);
        self.next_version += 1;
        match op {
            BatchOp::Put { bucket, key, value, .. } => {
                self.buckets
                    .entry(bucket.name())
                    .or_insert_with(BTreeMap::new)
                    .insert(key, (value, version));
            }
            BatchOp::Delete { bucket, key, .. } => {
                if let Some(objects) = self.buckets.get_mut(&bucket.name()) {
                    objects.remove(&key);
                }
            }
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(
        &self,
        bucket: &Bucket,
        key: &str,
    ) -> Result<Option<(Value, Version)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .buckets
            .get(&bucket.name())
            .and_then(|objects| objects.get(key))
            .cloned())
    }

    async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for op in &batch {
            inner.check(op)?;
        }
        for op in batch {
            inner.apply(op);
        }
        Ok(())
    }

    async fn list(
        &self,
        bucket: &Bucket,
    ) -> Result<Vec<(Value, Version)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .buckets
            .get(&bucket.name())
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::MemStore;
    use crate::db::store::{BatchOp, Bucket, Store, StoreError};
    use serde_json::json;

    fn put_new(key: &str) -> BatchOp {
        BatchOp::Put {
            bucket: Bucket::Nics,
            key: key.to_string(),
            value: json!({"key": key}),
            expect: None,
        }
    }

    #[tokio::test]
    async fn test_unique_conflict() {
        let store = MemStore::new();
        store.commit(vec![put_new("1")]).await.unwrap();
        let err = store.commit(vec![put_new("1")]).await.unwrap_err();
        match err {
            StoreError::UniqueConflict { bucket, key } => {
                assert_eq!(bucket, Bucket::Nics);
                assert_eq!(key, "1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_conflict_and_replace() {
        let store = MemStore::new();
        store.commit(vec![put_new("1")]).await.unwrap();
        let (_, version) = store.get(&Bucket::Nics, "1").await.unwrap().unwrap();

        // Replacement at the right version succeeds and bumps the tag.
        store
            .commit(vec![BatchOp::Put {
                bucket: Bucket::Nics,
                key: "1".to_string(),
                value: json!({"key": "1", "gen": 2}),
                expect: Some(version.clone()),
            }])
            .await
            .unwrap();

        // The stale version no longer matches.
        let err = store
            .commit(vec![BatchOp::Put {
                bucket: Bucket::Nics,
                key: "1".to_string(),
                value: json!({"key": "1", "gen": 3}),
                expect: Some(version),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let store = MemStore::new();
        store.commit(vec![put_new("1")]).await.unwrap();

        // Second op conflicts, so the first must not be applied.
        let err = store
            .commit(vec![put_new("2"), put_new("1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueConflict { .. }));
        assert!(store.get(&Bucket::Nics, "2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemStore::new();
        store.commit(vec![put_new("1")]).await.unwrap();
        let (_, version) = store.get(&Bucket::Nics, "1").await.unwrap().unwrap();

        // Deleting at a stale version fails.
        store
            .commit(vec![BatchOp::Put {
                bucket: Bucket::Nics,
                key: "1".to_string(),
                value: json!({"key": "1", "gen": 2}),
                expect: Some(version.clone()),
            }])
            .await
            .unwrap();
        let err = store
            .commit(vec![BatchOp::Delete {
                bucket: Bucket::Nics,
                key: "1".to_string(),
                expect: Some(version),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        // An unconditional delete always applies.
        store
            .commit(vec![BatchOp::Delete {
                bucket: Bucket::Nics,
                key: "1".to_string(),
                expect: None,
            }])
            .await
            .unwrap();
        assert!(store.get(&Bucket::Nics, "1").await.unwrap().is_none());
    }
}
