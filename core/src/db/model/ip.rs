// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model type for per-address records.

use crate::db::model::LogicalNetwork;
use crate::db::store::{BatchOp, Bucket, Version};
use serde::Deserialize;
use serde::Serialize;
use std::net::IpAddr;
use uuid::Uuid;
use warden_common::address;
use warden_common::api::external::{BelongsToType, Error};

/// One bound (or reserved, or soft-freed) address on a logical network.
///
/// The record lives in its network's bucket under the canonical string
/// form of the address.  `free` is the soft-free marker: a free record
/// keeps its slot in the bucket and its version history, and the next-free
/// search may hand it out again.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IpRecord {
    #[serde(
        serialize_with = "address::serialize_addr",
        deserialize_with = "address::deserialize_addr"
    )]
    pub address: IpAddr,
    pub network_uuid: Uuid,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belongs_to_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belongs_to_type: Option<BelongsToType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uuid: Option<Uuid>,
    #[serde(default)]
    pub free: bool,
    #[serde(skip)]
    pub version: Option<Version>,
}

impl IpRecord {
    /// A fresh, unbound record for `address` on `network`.
    pub fn new(network: &LogicalNetwork, address: IpAddr) -> IpRecord {
        IpRecord {
            address,
            network_uuid: network.uuid,
            reserved: false,
            belongs_to_uuid: None,
            belongs_to_type: None,
            owner_uuid: None,
            free: true,
            version: None,
        }
    }

    pub fn key(&self) -> String {
        self.address.to_string()
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::NetworkIps(self.network_uuid)
    }

    /// The canonical equality key for this record's address.
    pub fn addr_key(&self) -> address::AddrKey {
        address::AddrKey::new(&self.address)
    }

    /// Bind this address to a principal.
    pub fn assign(
        &mut self,
        belongs_to_uuid: Uuid,
        belongs_to_type: BelongsToType,
        owner_uuid: Uuid,
        reserved: bool,
    ) {
        self.belongs_to_uuid = Some(belongs_to_uuid);
        self.belongs_to_type = Some(belongs_to_type);
        self.owner_uuid = Some(owner_uuid);
        self.reserved = reserved;
        self.free = false;
    }

    /// Whether this address may be handed to the principal identified by
    /// `belongs_to_uuid`: it must not be reserved-and-unbound, and any
    /// existing binding must be to the same principal.
    pub fn provisionable_by(&self, belongs_to_uuid: &Uuid) -> bool {
        match self.belongs_to_uuid {
            Some(bound) => bound == *belongs_to_uuid,
            None => !self.reserved,
        }
    }

    /// The error to return when a caller names this address but it is not
    /// provisionable.
    pub fn in_use_error(&self) -> Error {
        match (self.belongs_to_type, self.belongs_to_uuid) {
            (Some(belongs_to_type), Some(belongs_to_uuid)) => {
                Error::IpInUse { belongs_to_type, belongs_to_uuid }
            }
            // Reserved but unbound: there is no holder to report.
            _ => Error::invalid_params(
                vec![String::from("ip")],
                format!("IP address {} is reserved", self.address),
            ),
        }
    }

    /// Conditional put of the record at its current version (or asserting
    /// absence for a record that has never been written).
    pub fn batch(&self) -> Result<BatchOp, Error> {
        Ok(BatchOp::Put {
            bucket: self.bucket(),
            key: self.key(),
            value: to_value(self)?,
            expect: self.version.clone(),
        })
    }

    /// Conditional put clearing the binding while retaining the record;
    /// the address becomes eligible for explicit re-binding but keeps its
    /// reservation.
    pub fn unassign_batch(&self) -> Result<BatchOp, Error> {
        let mut unbound = self.clone();
        unbound.belongs_to_uuid = None;
        unbound.belongs_to_type = None;
        unbound.owner_uuid = None;
        Ok(BatchOp::Put {
            bucket: self.bucket(),
            key: self.key(),
            value: to_value(&unbound)?,
            expect: self.version.clone(),
        })
    }

    /// Conditional put marking the record free.  Freeing an already-free
    /// record emits nothing, so the surrounding commit is a no-op for it.
    pub fn free_batch(&self) -> Result<Option<BatchOp>, Error> {
        if self.free {
            return Ok(None);
        }
        let mut freed = self.clone();
        freed.belongs_to_uuid = None;
        freed.belongs_to_type = None;
        freed.owner_uuid = None;
        freed.reserved = false;
        freed.free = true;
        Ok(Some(BatchOp::Put {
            bucket: self.bucket(),
            key: self.key(),
            value: to_value(&freed)?,
            expect: self.version.clone(),
        }))
    }
}

fn to_value(record: &IpRecord) -> Result<serde_json::Value, Error> {
    serde_json::to_value(record).map_err(|e| {
        Error::internal_error(&format!("serializing IP record: {}", e))
    })
}
