// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on logical networks and network pools.

use super::DataStore;
use crate::db::model::{LogicalNetwork, NetworkObject, NetworkPool};
use crate::db::store::{BatchOp, Bucket, StoreError};
use uuid::Uuid;
use warden_common::api::external::{
    Error, ListResultVec, LookupResult, ResourceType,
};

impl DataStore {
    /// Fetch whatever the networks bucket holds under `uuid`.
    pub async fn network_object_fetch(
        &self,
        uuid: &Uuid,
    ) -> LookupResult<NetworkObject> {
        let bucket = Bucket::Networks;
        let key = uuid.to_string();
        let (value, version) = self
            .get_raw(&bucket, &key)
            .await?
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Network, uuid))?;
        let mut object: NetworkObject = Self::decode(&bucket, &key, value)?;
        match &mut object {
            NetworkObject::Network(net) => net.version = Some(version),
            NetworkObject::Pool(pool) => pool.version = Some(version),
        }
        Ok(object)
    }

    /// Fetch a logical network, rejecting pool objects.
    pub async fn network_fetch(
        &self,
        uuid: &Uuid,
    ) -> LookupResult<LogicalNetwork> {
        match self.network_object_fetch(uuid).await? {
            NetworkObject::Network(net) => Ok(net),
            NetworkObject::Pool(_) => Err(Error::invalid_request(&format!(
                "network {} is a network pool",
                uuid
            ))),
        }
    }

    /// Resolve a pool's members, preserving the pool's order.
    pub async fn pool_networks(
        &self,
        pool: &NetworkPool,
    ) -> ListResultVec<LogicalNetwork> {
        let mut networks = Vec::with_capacity(pool.networks.len());
        for uuid in &pool.networks {
            networks.push(self.network_fetch(uuid).await?);
        }
        Ok(networks)
    }

    /// All fabric networks sharing an overlay id.
    pub async fn networks_on_vnet(
        &self,
        vnet_id: u32,
    ) -> ListResultVec<LogicalNetwork> {
        let bucket = Bucket::Networks;
        let mut members = Vec::new();
        for (value, version) in self.list_raw(&bucket).await? {
            let key = value
                .get("uuid")
                .and_then(|v| v.as_str())
                .unwrap_or("?")
                .to_string();
            if let NetworkObject::Network(mut net) =
                Self::decode(&bucket, &key, value)?
            {
                if net.fabric && net.vnet_id == Some(vnet_id) {
                    net.version = Some(version);
                    members.push(net);
                }
            }
        }
        Ok(members)
    }

    /// Write a network definition, creating or replacing it.
    pub async fn network_upsert(&self, network: &LogicalNetwork) -> Result<(), Error> {
        let value = serde_json::to_value(network).map_err(|e| {
            Error::internal_error(&format!("serializing network: {}", e))
        })?;
        debug!(self.log, "upserting network"; "network_uuid" => %network.uuid);
        self.commit(vec![BatchOp::Put {
            bucket: Bucket::Networks,
            key: network.key(),
            value,
            expect: network.version.clone(),
        }])
        .await
        .map_err(StoreError::into_external)
    }

    /// Write a pool definition, creating or replacing it.
    pub async fn pool_upsert(&self, pool: &NetworkPool) -> Result<(), Error> {
        let value = serde_json::to_value(pool).map_err(|e| {
            Error::internal_error(&format!("serializing network pool: {}", e))
        })?;
        debug!(self.log, "upserting network pool"; "pool_uuid" => %pool.uuid);
        self.commit(vec![BatchOp::Put {
            bucket: Bucket::Networks,
            key: pool.key(),
            value,
            expect: pool.version.clone(),
        }])
        .await
        .map_err(StoreError::into_external)
    }
}
