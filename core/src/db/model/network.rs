// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model types for logical networks and network pools.

use crate::db::store::{Bucket, Version};
use ipnetwork::IpNetwork;
use serde::Deserialize;
use serde::Serialize;
use std::net::IpAddr;
use uuid::Uuid;
use warden_common::address;
use warden_common::api::external::Error;

/// A configured address range with the attributes a NIC inherits from it.
///
/// Networks are immutable while an allocation is running; the engine only
/// ever reads them.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LogicalNetwork {
    pub uuid: Uuid,
    pub subnet: IpNetwork,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "address::serialize_opt_addr",
        deserialize_with = "address::deserialize_opt_addr"
    )]
    pub gateway: Option<IpAddr>,
    pub vlan_id: u16,
    pub nic_tag: String,
    #[serde(default)]
    pub resolvers: Vec<IpAddr>,
    #[serde(default)]
    pub fabric: bool,
    /// Overlay virtual network id; present iff `fabric` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnet_id: Option<u32>,
    /// First address handed out by the next-free search.
    #[serde(
        serialize_with = "address::serialize_addr",
        deserialize_with = "address::deserialize_addr"
    )]
    pub provision_start: IpAddr,
    /// Last address handed out by the next-free search.
    #[serde(
        serialize_with = "address::serialize_addr",
        deserialize_with = "address::deserialize_addr"
    )]
    pub provision_end: IpAddr,
    #[serde(skip)]
    pub version: Option<Version>,
}

impl LogicalNetwork {
    /// Validate a new network definition.
    pub fn new(
        uuid: Uuid,
        subnet: IpNetwork,
        vlan_id: u16,
        nic_tag: &str,
        provision_start: IpAddr,
        provision_end: IpAddr,
    ) -> Result<LogicalNetwork, Error> {
        if !subnet.contains(provision_start) || !subnet.contains(provision_end) {
            return Err(Error::invalid_params(
                vec![
                    String::from("provision_start_ip"),
                    String::from("provision_end_ip"),
                ],
                "provision range must fall within the subnet",
            ));
        }
        if address::span(provision_start, provision_end).is_none() {
            return Err(Error::invalid_params(
                vec![
                    String::from("provision_start_ip"),
                    String::from("provision_end_ip"),
                ],
                "provision range endpoints are reversed",
            ));
        }
        Ok(LogicalNetwork {
            uuid,
            subnet,
            gateway: None,
            vlan_id,
            nic_tag: nic_tag.to_string(),
            resolvers: Vec::new(),
            fabric: false,
            vnet_id: None,
            provision_start,
            provision_end,
            version: None,
        })
    }

    pub fn key(&self) -> String {
        self.uuid.to_string()
    }

    /// The bucket holding this network's address records.
    pub fn ip_bucket(&self) -> Bucket {
        Bucket::NetworkIps(self.uuid)
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.subnet, IpNetwork::V4(_))
    }

    /// Addresses in the provision range, inclusive.
    pub fn provision_span(&self) -> u128 {
        // Valid by construction; a zero span would mean a corrupt record.
        address::span(self.provision_start, self.provision_end).unwrap_or(0)
    }
}

/// An ordered collection of networks used as a fallback chain during
/// allocation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NetworkPool {
    pub uuid: Uuid,
    /// Member networks, in the order provisioning tries them.
    pub networks: Vec<Uuid>,
    #[serde(skip)]
    pub version: Option<Version>,
}

impl NetworkPool {
    pub fn key(&self) -> String {
        self.uuid.to_string()
    }
}

/// What a key in the networks bucket can hold.  Pools are distinguished by
/// their member list.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NetworkObject {
    Pool(NetworkPool),
    Network(LogicalNetwork),
}

#[cfg(test)]
mod test {
    use super::LogicalNetwork;
    use super::NetworkObject;
    use uuid::Uuid;

    fn network() -> LogicalNetwork {
        LogicalNetwork::new(
            Uuid::new_v4(),
            "10.0.0.0/24".parse().unwrap(),
            2,
            "external",
            "10.0.0.10".parse().unwrap(),
            "10.0.0.12".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_network_validation() {
        assert_eq!(network().provision_span(), 3);

        // Range outside the subnet
        assert!(LogicalNetwork::new(
            Uuid::new_v4(),
            "10.0.0.0/24".parse().unwrap(),
            2,
            "external",
            "10.0.0.10".parse().unwrap(),
            "10.0.1.12".parse().unwrap(),
        )
        .is_err());

        // Reversed endpoints
        assert!(LogicalNetwork::new(
            Uuid::new_v4(),
            "10.0.0.0/24".parse().unwrap(),
            2,
            "external",
            "10.0.0.12".parse().unwrap(),
            "10.0.0.10".parse().unwrap(),
        )
        .is_err());
    }

    #[test]
    fn test_network_object_shapes() {
        let net = network();
        let value = serde_json::to_value(&net).unwrap();
        match serde_json::from_value::<NetworkObject>(value).unwrap() {
            NetworkObject::Network(parsed) => assert_eq!(parsed.uuid, net.uuid),
            NetworkObject::Pool(_) => panic!("network parsed as pool"),
        }

        let pool = super::NetworkPool {
            uuid: Uuid::new_v4(),
            networks: vec![net.uuid],
            version: None,
        };
        let value = serde_json::to_value(&pool).unwrap();
        match serde_json::from_value::<NetworkObject>(value).unwrap() {
            NetworkObject::Pool(parsed) => {
                assert_eq!(parsed.networks, vec![net.uuid])
            }
            NetworkObject::Network(_) => panic!("pool parsed as network"),
        }
    }
}
