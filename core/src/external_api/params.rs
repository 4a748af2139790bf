// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Params define the request bodies of API endpoints for creating or
//! updating resources.  They are shape-validated by the transport layer;
//! the engine re-validates everything that depends on system state.

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;
use warden_common::api::external::{BelongsToType, Error, MacAddr, NicState};

/// Create-time parameters for a NIC.
///
/// `ip` accepts any of the textual address forms (dotted v4, canonical v6,
/// decimal integer) and therefore arrives as a string.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
pub struct NicCreateParams {
    pub owner_uuid: Uuid,
    pub belongs_to_uuid: Uuid,
    pub belongs_to_type: BelongsToType,
    #[serde(default)]
    pub mac: Option<MacAddr>,
    #[serde(default)]
    pub ip: Option<String>,
    /// An alternative spelling of `network_uuid`, kept for callers of the
    /// older parameter name; when both are present they must agree.
    #[serde(default)]
    pub network: Option<Uuid>,
    /// A logical network or network pool to allocate the IP from.
    #[serde(default)]
    pub network_uuid: Option<Uuid>,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default)]
    pub state: Option<NicState>,
    #[serde(default)]
    pub check_owner: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub nic_tag: Option<String>,
    #[serde(default)]
    pub nic_tags_provided: Option<Vec<String>>,
    #[serde(default)]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub cn_uuid: Option<Uuid>,
    #[serde(default)]
    pub underlay: Option<bool>,
    /// Keep the allocated address reserved when it is later released.
    #[serde(default)]
    pub reserved: Option<bool>,
    #[serde(default)]
    pub allow_dhcp_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_ip_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_mac_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_restricted_traffic: Option<bool>,
    #[serde(default)]
    pub allow_unfiltered_promisc: Option<bool>,
}

impl NicCreateParams {
    /// The network (or pool) this request names, folding `network` and
    /// `network_uuid` together.
    pub fn network_ref(&self) -> Result<Option<Uuid>, Error> {
        resolve_network_ref(self.network, self.network_uuid)
    }
}

/// Updateable properties of a NIC.  Absent fields keep their current
/// values; `network_uuid`/`ip` default from the existing NIC.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, Serialize)]
pub struct NicUpdateParams {
    #[serde(default)]
    pub owner_uuid: Option<Uuid>,
    #[serde(default)]
    pub belongs_to_uuid: Option<Uuid>,
    #[serde(default)]
    pub belongs_to_type: Option<BelongsToType>,
    #[serde(default)]
    pub ip: Option<String>,
    /// An alternative spelling of `network_uuid`, kept for callers of the
    /// older parameter name; when both are present they must agree.
    #[serde(default)]
    pub network: Option<Uuid>,
    #[serde(default)]
    pub network_uuid: Option<Uuid>,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default)]
    pub state: Option<NicState>,
    #[serde(default)]
    pub check_owner: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub nic_tag: Option<String>,
    #[serde(default)]
    pub nic_tags_provided: Option<Vec<String>>,
    #[serde(default)]
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub cn_uuid: Option<Uuid>,
    #[serde(default)]
    pub underlay: Option<bool>,
    #[serde(default)]
    pub reserved: Option<bool>,
    #[serde(default)]
    pub allow_dhcp_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_ip_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_mac_spoofing: Option<bool>,
    #[serde(default)]
    pub allow_restricted_traffic: Option<bool>,
    #[serde(default)]
    pub allow_unfiltered_promisc: Option<bool>,
}

impl NicUpdateParams {
    /// The network (or pool) this update names, folding `network` and
    /// `network_uuid` together.
    pub fn network_ref(&self) -> Result<Option<Uuid>, Error> {
        resolve_network_ref(self.network, self.network_uuid)
    }
}

fn resolve_network_ref(
    network: Option<Uuid>,
    network_uuid: Option<Uuid>,
) -> Result<Option<Uuid>, Error> {
    match (network, network_uuid) {
        (Some(by_alias), Some(by_uuid)) if by_alias != by_uuid => {
            Err(Error::invalid_params(
                vec![String::from("network"), String::from("network_uuid")],
                "network and network_uuid name different networks",
            ))
        }
        (network, network_uuid) => Ok(network_uuid.or(network)),
    }
}
