// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed access to the versioned-object store.
//!
//! The `DataStore` owns the store handle and exposes per-resource methods;
//! the implementation is split into a submodule per resource.

mod ip;
mod network;
mod nic;

use crate::db::store::{Batch, Bucket, Store, StoreError, Version};
use serde::de::DeserializeOwned;
use serde_json::Value;
use slog::Logger;
use std::sync::Arc;
use warden_common::api::external::Error;

pub struct DataStore {
    pub(crate) log: Logger,
    store: Arc<dyn Store>,
}

impl DataStore {
    pub fn new(log: Logger, store: Arc<dyn Store>) -> Self {
        DataStore { log, store }
    }

    /// Submit a batch for atomic application.  Conflicts are returned
    /// as-is so the allocation loop can react to them.
    pub async fn commit(&self, batch: Batch) -> Result<(), StoreError> {
        self.store.commit(batch).await
    }

    pub(crate) async fn get_raw(
        &self,
        bucket: &Bucket,
        key: &str,
    ) -> Result<Option<(Value, Version)>, Error> {
        self.store
            .get(bucket, key)
            .await
            .map_err(StoreError::into_external)
    }

    pub(crate) async fn list_raw(
        &self,
        bucket: &Bucket,
    ) -> Result<Vec<(Value, Version)>, Error> {
        self.store
            .list(bucket)
            .await
            .map_err(StoreError::into_external)
    }

    pub(crate) fn decode<T: DeserializeOwned>(
        bucket: &Bucket,
        key: &str,
        value: Value,
    ) -> Result<T, Error> {
        serde_json::from_value(value).map_err(|e| {
            Error::internal_error(&format!(
                "deserializing record {}/{}: {}",
                bucket, key, e
            ))
        })
    }
}
