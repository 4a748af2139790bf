// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model type for NIC records.

use crate::db::model::{IpRecord, LogicalNetwork};
use crate::db::store::{BatchOp, Bucket, Version};
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::net::IpAddr;
use uuid::Uuid;
use warden_common::address;
use warden_common::api::external;
use warden_common::api::external::{BelongsToType, Error, MacAddr, NicState};

fn default_check_owner() -> bool {
    true
}

/// One NIC, keyed in the global NIC bucket by the integer form of its MAC.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NicRecord {
    pub mac: MacAddr,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub state: NicState,
    pub belongs_to_uuid: Uuid,
    pub belongs_to_type: BelongsToType,
    pub owner_uuid: Uuid,
    #[serde(default = "default_check_owner")]
    pub check_owner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub vlan_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tags_provided: Option<Vec<String>>,
    #[serde(default)]
    pub allow_dhcp_spoofing: bool,
    #[serde(default)]
    pub allow_ip_spoofing: bool,
    #[serde(default)]
    pub allow_mac_spoofing: bool,
    #[serde(default)]
    pub allow_restricted_traffic: bool,
    #[serde(default)]
    pub allow_unfiltered_promisc: bool,
    /// The compute node hosting the NIC, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn_uuid: Option<Uuid>,
    #[serde(default)]
    pub underlay: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "address::serialize_opt_addr",
        deserialize_with = "address::deserialize_opt_addr"
    )]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_uuid: Option<Uuid>,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
    #[serde(skip)]
    pub version: Option<Version>,
    /// Compute nodes sharing this NIC's overlay, resolved at commit time.
    /// Derived, never persisted.
    #[serde(skip)]
    pub vnet_cns: Option<Vec<Uuid>>,
}

impl NicRecord {
    pub fn key(&self) -> String {
        self.mac.to_u64().to_string()
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::Nics
    }

    /// Link the NIC to an address chosen during provisioning.
    pub fn set_ip(&mut self, ip: &IpRecord) {
        self.ip_address = Some(ip.address);
        self.network_uuid = Some(ip.network_uuid);
    }

    /// Conditional put of the record at its current version (or asserting
    /// absence for a NIC being created).
    pub fn batch(&self) -> Result<BatchOp, Error> {
        Ok(BatchOp::Put {
            bucket: self.bucket(),
            key: self.key(),
            value: to_value(self)?,
            expect: self.version.clone(),
        })
    }

    /// Conditional delete of the record.
    pub fn delete_batch(&self) -> BatchOp {
        BatchOp::Delete {
            bucket: self.bucket(),
            key: self.key(),
            expect: self.version.clone(),
        }
    }

    /// Conditional put demoting this NIC from primary, used when another
    /// NIC of the same owner becomes primary in the same commit.
    pub fn primary_unset_batch(&self) -> Result<BatchOp, Error> {
        let mut demoted = self.clone();
        demoted.primary = false;
        demoted.time_modified = Utc::now();
        Ok(BatchOp::Put {
            bucket: self.bucket(),
            key: self.key(),
            value: to_value(&demoted)?,
            expect: self.version.clone(),
        })
    }

    /// The flattened representation returned to callers.  `network` must
    /// be the NIC's network when it has one.
    pub fn to_external(&self, network: Option<&LogicalNetwork>) -> external::Nic {
        let netmask = network.and_then(|net| {
            if net.is_ipv4() {
                Some(address::v4_netmask(net.subnet.prefix()))
            } else {
                None
            }
        });
        let prefix = network.and_then(|net| {
            if net.is_ipv4() {
                None
            } else {
                Some(net.subnet.prefix())
            }
        });
        external::Nic {
            mac: self.mac,
            primary: self.primary,
            owner_uuid: self.owner_uuid,
            belongs_to_uuid: self.belongs_to_uuid,
            belongs_to_type: self.belongs_to_type,
            ip: self.ip_address,
            netmask,
            prefix,
            vlan_id: self.vlan_id,
            nic_tag: self.nic_tag.clone(),
            gateway: network.and_then(|net| net.gateway),
            resolvers: network.map(|net| net.resolvers.clone()).unwrap_or_default(),
            state: self.state,
            allow_dhcp_spoofing: self.allow_dhcp_spoofing,
            allow_ip_spoofing: self.allow_ip_spoofing,
            allow_mac_spoofing: self.allow_mac_spoofing,
            allow_restricted_traffic: self.allow_restricted_traffic,
            allow_unfiltered_promisc: self.allow_unfiltered_promisc,
        }
    }
}

fn to_value(record: &NicRecord) -> Result<serde_json::Value, Error> {
    serde_json::to_value(record).map_err(|e| {
        Error::internal_error(&format!("serializing NIC record: {}", e))
    })
}
