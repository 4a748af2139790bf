// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on NIC records.

use super::DataStore;
use crate::db::model::NicRecord;
use crate::db::store::Bucket;
use std::collections::BTreeSet;
use std::collections::HashSet;
use uuid::Uuid;
use warden_common::api::external::{
    Error, ListResultVec, LookupResult, MacAddr, ResourceType,
};

impl DataStore {
    /// Fetch a NIC by MAC, if present.
    pub async fn nic_fetch_opt(
        &self,
        mac: &MacAddr,
    ) -> Result<Option<NicRecord>, Error> {
        let bucket = Bucket::Nics;
        let key = mac.to_u64().to_string();
        match self.get_raw(&bucket, &key).await? {
            None => Ok(None),
            Some((value, version)) => {
                let mut nic: NicRecord = Self::decode(&bucket, &key, value)?;
                nic.version = Some(version);
                Ok(Some(nic))
            }
        }
    }

    /// Fetch a NIC by MAC, failing if it does not exist.
    pub async fn nic_fetch(&self, mac: &MacAddr) -> LookupResult<NicRecord> {
        self.nic_fetch_opt(mac)
            .await?
            .ok_or_else(|| Error::not_found_by_mac(ResourceType::Nic, mac))
    }

    /// All NICs belonging to an owner.  Used to derive the primary-unset
    /// writes when another NIC becomes primary.
    pub async fn nics_for_owner(
        &self,
        owner_uuid: &Uuid,
    ) -> ListResultVec<NicRecord> {
        let bucket = Bucket::Nics;
        let mut nics = Vec::new();
        for (value, version) in self.list_raw(&bucket).await? {
            let key =
                value.get("mac").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            let mut nic: NicRecord = Self::decode(&bucket, &key, value)?;
            if nic.owner_uuid == *owner_uuid {
                nic.version = Some(version);
                nics.push(nic);
            }
        }
        Ok(nics)
    }

    /// The set of compute nodes hosting NICs on fabric networks with the
    /// given overlay id.  One pass over the NIC bucket, joined against the
    /// networks sharing the id.
    pub async fn vnet_cns(&self, vnet_id: u32) -> Result<BTreeSet<Uuid>, Error> {
        let member_networks: HashSet<Uuid> = self
            .networks_on_vnet(vnet_id)
            .await?
            .into_iter()
            .map(|net| net.uuid)
            .collect();

        let bucket = Bucket::Nics;
        let mut cns = BTreeSet::new();
        for (value, _) in self.list_raw(&bucket).await? {
            let key =
                value.get("mac").and_then(|v| v.as_str()).unwrap_or("?").to_string();
            let nic: NicRecord = Self::decode(&bucket, &key, value)?;
            if let (Some(cn_uuid), Some(network_uuid)) =
                (nic.cn_uuid, nic.network_uuid)
            {
                if member_networks.contains(&network_uuid) {
                    cns.insert(cn_uuid);
                }
            }
        }
        debug!(self.log, "resolved fabric members";
            "vnet_id" => vnet_id, "cn_count" => cns.len());
        Ok(cns)
    }
}
