// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
 * Data structures and related facilities for representing resources in the
 * API
 *
 * These are the representations shared between the allocation engine and
 * its callers.  The contents here are all HTTP-agnostic.
 */

mod error;
pub use error::*;

use crate::address;
use parse_display::Display;
use parse_display::FromStr;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr as _;
use uuid::Uuid;

/*
 * The type aliases below exist primarily to ensure consistency among return
 * types for the engine's public operations.
 */

/** Result of a create operation for the specified type */
pub type CreateResult<T> = Result<T, Error>;
/** Result of a list operation that returns a vector */
pub type ListResultVec<T> = Result<Vec<T>, Error>;
/** Result of a lookup operation for the specified type */
pub type LookupResult<T> = Result<T, Error>;
/** Result of an update operation for the specified type */
pub type UpdateResult<T> = Result<T, Error>;

/// The `MacAddr` represents a Media Access Control (MAC) address, used to
/// uniquely identify hardware devices on a network.
// NOTE: We're using the `macaddr` crate for the internal representation,
// which does not implement `JsonSchema`.
#[derive(
    Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub struct MacAddr(pub macaddr::MacAddr6);

impl MacAddr {
    /// The MAC's 48-bit value as an integer, the form used to key the NIC
    /// bucket.
    pub fn to_u64(self) -> u64 {
        let mut raw = [0u8; 8];
        raw[2..].copy_from_slice(self.0.as_bytes());
        u64::from_be_bytes(raw)
    }

    /// Build a MAC from its integer form; values above `2^48 - 1` are
    /// rejected.
    pub fn from_u64(value: u64) -> Option<Self> {
        if value > 0xffff_ffff_ffff {
            return None;
        }
        let raw = value.to_be_bytes();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&raw[2..]);
        Some(MacAddr(macaddr::MacAddr6::from(octets)))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = macaddr::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse().map(MacAddr)
    }
}

impl std::str::FromStr for MacAddr {
    type Err = macaddr::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MacAddr)
    }
}

impl std::ops::Deref for MacAddr {
    type Target = macaddr::MacAddr6;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl JsonSchema for MacAddr {
    fn schema_name() -> String {
        "MacAddr".to_string()
    }

    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                title: Some("A MAC address".to_string()),
                description: Some(
                    "A Media Access Control address, in EUI-48 format"
                        .to_string(),
                ),
                examples: vec!["ff:ff:ff:ff:ff:ff".into()],
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::SingleOrVec::Single(
                Box::new(schemars::schema::InstanceType::String),
            )),
            string: Some(Box::new(schemars::schema::StringValidation {
                max_length: Some(17), // 12 hex characters and 5 ":"-separators
                min_length: Some(17),
                pattern: Some(
                    r#"^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$"#.to_string(),
                ),
            })),
            ..Default::default()
        })
    }
}

/// A 24-bit organizationally-unique identifier: the prefix within which the
/// service generates MAC addresses.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct Oui([u8; 3]);

impl Oui {
    /// The largest 24-bit device suffix available under an OUI.
    pub const MAX_SUFFIX: u32 = 0x00ff_ffff;

    /// Construct the MAC at `suffix` within this OUI.  Suffix bits above
    /// the 24-bit device space are masked off.
    pub fn mac_at(&self, suffix: u32) -> MacAddr {
        let suffix = suffix & Self::MAX_SUFFIX;
        let raw = suffix.to_be_bytes();
        MacAddr(macaddr::MacAddr6::from([
            self.0[0], self.0[1], self.0[2], raw[1], raw[2], raw[3],
        ]))
    }

    /// Whether `mac` falls within this OUI.
    pub fn contains(&self, mac: &MacAddr) -> bool {
        mac.0.as_bytes()[..3] == self.0
    }
}

impl TryFrom<String> for Oui {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        // An OUI is spelled like the first half of a MAC address.
        let mac = MacAddr::from_str(&format!("{}:00:00:00", s)).map_err(|_| {
            Error::invalid_params(
                vec![String::from("mac_oui")],
                format!("invalid OUI: \"{}\"", s),
            )
        })?;
        let bytes = mac.0.as_bytes();
        Ok(Oui([bytes[0], bytes[1], bytes[2]]))
    }
}

impl std::fmt::Display for Oui {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}:{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl Serialize for Oui {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Running state of a NIC.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    FromStr,
    JsonSchema,
    PartialEq,
    Eq,
    Serialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NicState {
    Provisioning,
    Running,
    Stopped,
}

impl Default for NicState {
    fn default() -> Self {
        NicState::Provisioning
    }
}

/// The kind of principal a NIC or IP is bound to.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    FromStr,
    JsonSchema,
    PartialEq,
    Eq,
    Serialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BelongsToType {
    Zone,
    Server,
    Other,
}

/// A provisioned NIC as serialized back to callers.
///
/// This is the flattened view: network attributes the caller needs to
/// configure the interface (netmask/prefix, gateway, resolvers) are folded
/// in next to the NIC's own fields.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Nic {
    /** The MAC address assigned to this NIC, in colon-separated form. */
    pub mac: MacAddr,
    pub primary: bool,
    pub owner_uuid: Uuid,
    pub belongs_to_uuid: Uuid,
    pub belongs_to_type: BelongsToType,
    /** The IP address bound to this NIC, if any. */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /** Dotted-quad netmask; present for NICs on IPv4 networks. */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<Ipv4Addr>,
    /** Prefix length; present for NICs on IPv6 networks. */
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<u8>,
    pub vlan_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    #[serde(default)]
    pub resolvers: Vec<IpAddr>,
    pub state: NicState,
    pub allow_dhcp_spoofing: bool,
    pub allow_ip_spoofing: bool,
    pub allow_mac_spoofing: bool,
    pub allow_restricted_traffic: bool,
    pub allow_unfiltered_promisc: bool,
}

impl Nic {
    /// The canonical equality key of the bound address, if any.
    pub fn addr_key(&self) -> Option<address::AddrKey> {
        self.ip.map(|ip| address::AddrKey::new(&ip))
    }
}

#[cfg(test)]
mod test {
    use super::BelongsToType;
    use super::MacAddr;
    use super::NicState;
    use super::Oui;

    #[test]
    fn test_mac_integer_form() {
        let mac: MacAddr = "90:b8:d0:00:00:01".parse().unwrap();
        assert_eq!(mac.to_u64(), 0x90b8_d000_0001);
        assert_eq!(MacAddr::from_u64(0x90b8_d000_0001).unwrap(), mac);
        assert_eq!(MacAddr::from_u64(1 << 48), None);
    }

    #[test]
    fn test_oui() {
        let oui = Oui::try_from(String::from("90:b8:d0")).unwrap();
        assert_eq!(oui.to_string(), "90:b8:d0");

        let mac = oui.mac_at(0x01);
        assert_eq!(mac.to_u64(), 0x90b8_d000_0001);
        assert!(oui.contains(&mac));
        assert!(!oui.contains(&"a8:40:25:00:00:01".parse().unwrap()));

        // Suffix bits above the device space are masked off.
        assert_eq!(oui.mac_at(Oui::MAX_SUFFIX), oui.mac_at(u32::MAX));

        assert!(Oui::try_from(String::from("not-an-oui")).is_err());
    }

    #[test]
    fn test_enum_forms() {
        assert_eq!(NicState::Running.to_string(), "running");
        assert_eq!("stopped".parse::<NicState>().unwrap(), NicState::Stopped);
        assert_eq!(BelongsToType::Zone.to_string(), "zone");
        assert_eq!("server".parse::<BelongsToType>().unwrap(), BelongsToType::Server);
        assert_eq!(
            serde_json::to_string(&BelongsToType::Other).unwrap(),
            "\"other\""
        );
    }
}
