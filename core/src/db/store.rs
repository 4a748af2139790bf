// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The versioned-object store contract.
//!
//! The engine persists records in named buckets of JSON objects.  Every
//! object carries an opaque version tag minted by the store; writes name
//! the version they expect, and a whole batch of writes either applies
//! atomically or fails.  The two conflict outcomes -- a version that no
//! longer matches, and an insert that found the key already present -- are
//! the signals that drive the allocation retry loop.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;
use warden_common::api::external::Error;

/// Opaque per-object version tag supplied by the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Version(u64);

impl Version {
    /// Mint a version tag.  Only store implementations should do this.
    pub fn new(raw: u64) -> Version {
        Version(raw)
    }
}

/// The buckets the engine reads and writes.
///
/// Each logical network gets its own bucket of address records, named by a
/// deterministic function of the network UUID; NICs and networks each live
/// in a single global bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    Nics,
    Networks,
    NetworkIps(Uuid),
}

impl Bucket {
    pub fn name(&self) -> String {
        match self {
            Bucket::Nics => String::from("nics"),
            Bucket::Networks => String::from("networks"),
            Bucket::NetworkIps(uuid) => {
                format!("network_ips_{}", uuid.simple())
            }
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single conditional operation within a batch.
///
/// A `Put` with `expect: None` asserts that the key does not exist yet; a
/// `Delete` with `expect: None` is unconditional.
#[derive(Clone, Debug)]
pub enum BatchOp {
    Put { bucket: Bucket, key: String, value: Value, expect: Option<Version> },
    Delete { bucket: Bucket, key: String, expect: Option<Version> },
}

impl BatchOp {
    pub fn bucket(&self) -> &Bucket {
        match self {
            BatchOp::Put { bucket, .. } | BatchOp::Delete { bucket, .. } => bucket,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key, .. } => key,
        }
    }
}

/// An ordered list of conditional operations committed atomically.
pub type Batch = Vec<BatchOp>;

/// How a store operation can fail.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Some object's expected version did not match.
    #[error("version conflict on {bucket}/{key}")]
    VersionConflict { bucket: Bucket, key: String },
    /// A put expecting key absence found the key present.
    #[error("unique conflict on {bucket}/{key}")]
    UniqueConflict { bucket: Bucket, key: String },
    /// A transient failure; the operation may be retried.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
    /// A non-retryable failure.
    #[error("fatal store error: {0}")]
    Fatal(Error),
}

impl StoreError {
    /// The (bucket, key) a conflict landed on, if this is a conflict.
    pub fn conflict(&self) -> Option<(&Bucket, &str)> {
        match self {
            StoreError::VersionConflict { bucket, key }
            | StoreError::UniqueConflict { bucket, key } => Some((bucket, key)),
            _ => None,
        }
    }

    /// Convert into the engine's external error type.  Conflicts are never
    /// user-facing; a conflict that escapes the retry loop is a bug.
    pub fn into_external(self) -> Error {
        match self {
            StoreError::VersionConflict { .. } | StoreError::UniqueConflict { .. } => {
                Error::internal_error(&format!(
                    "store conflict escaped the retry loop: {}",
                    self
                ))
            }
            StoreError::Unavailable { message } => Error::unavail(&message),
            StoreError::Fatal(e) => e,
        }
    }
}

/// The narrow contract the engine requires of its store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one object and its current version.
    async fn get(
        &self,
        bucket: &Bucket,
        key: &str,
    ) -> Result<Option<(Value, Version)>, StoreError>;

    /// Apply a batch of conditional operations atomically.
    async fn commit(&self, batch: Batch) -> Result<(), StoreError>;

    /// Enumerate a bucket.  Used to derive owner and fabric membership
    /// sets; not on the per-iteration hot path.
    async fn list(&self, bucket: &Bucket)
        -> Result<Vec<(Value, Version)>, StoreError>;
}
