// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonical IP address handling for the allocation engine.
//!
//! Addresses arrive in three textual forms (dotted IPv4, canonical IPv6,
//! and a decimal integer) and, for records written by older deployments,
//! as a `{"octets": [a, b, c, d]}` object. Everything is normalized to
//! [`std::net::IpAddr`] on the way in, and all equality and ordering is
//! defined over the 16-byte [`AddrKey`] form so that the two spellings of
//! a v4-mapped address cannot produce distinct records.

use crate::api::external::Error;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serializer;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// The canonical 16-byte form of an address.
///
/// IPv4 addresses are mapped into the IPv6 space (`::ffff:a.b.c.d`), which
/// makes the key total-ordered across both families and usable as the
/// uniqueness key for a network's address records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrKey([u8; 16]);

impl AddrKey {
    pub fn new(addr: &IpAddr) -> Self {
        let v6 = match addr {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => *v6,
        };
        AddrKey(v6.octets())
    }

    /// Recover the address, preferring the IPv4 form for mapped keys.
    pub fn to_addr(&self) -> IpAddr {
        let octets = self.0;
        let mapped_prefix =
            octets[..10].iter().all(|&b| b == 0) && octets[10] == 0xff && octets[11] == 0xff;
        if mapped_prefix {
            IpAddr::V4(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
        } else {
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

impl From<IpAddr> for AddrKey {
    fn from(addr: IpAddr) -> Self {
        AddrKey::new(&addr)
    }
}

impl std::fmt::Display for AddrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_addr())
    }
}

/// Parse an address in any of the accepted textual forms, reporting
/// `field` as the offending parameter on failure.
///
/// Decimal integers up to `2^32 - 1` are IPv4; larger values are IPv6.
pub fn parse_addr(field: &str, text: &str) -> Result<IpAddr, Error> {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let value: u128 = text.parse().map_err(|_| invalid_addr(field, text))?;
        return match u32::try_from(value) {
            Ok(v4) => Ok(IpAddr::V4(Ipv4Addr::from(v4))),
            Err(_) => Ok(IpAddr::V6(Ipv6Addr::from(value))),
        };
    }
    text.parse::<IpAddr>().map_err(|_| invalid_addr(field, text))
}

fn invalid_addr(field: &str, text: &str) -> Error {
    Error::invalid_params(
        vec![field.to_string()],
        format!("invalid IP address: \"{}\"", text),
    )
}

/// Offset an address forward, failing on wrap of its address family.
pub fn checked_add(addr: IpAddr, offset: u128) -> Option<IpAddr> {
    match addr {
        IpAddr::V4(v4) => {
            let offset = u32::try_from(offset).ok()?;
            u32::from(v4).checked_add(offset).map(|raw| IpAddr::V4(Ipv4Addr::from(raw)))
        }
        IpAddr::V6(v6) => {
            u128::from(v6).checked_add(offset).map(|raw| IpAddr::V6(Ipv6Addr::from(raw)))
        }
    }
}

/// Offset an address backward, failing on wrap of its address family.
pub fn checked_sub(addr: IpAddr, offset: u128) -> Option<IpAddr> {
    match addr {
        IpAddr::V4(v4) => {
            let offset = u32::try_from(offset).ok()?;
            u32::from(v4).checked_sub(offset).map(|raw| IpAddr::V4(Ipv4Addr::from(raw)))
        }
        IpAddr::V6(v6) => {
            u128::from(v6).checked_sub(offset).map(|raw| IpAddr::V6(Ipv6Addr::from(raw)))
        }
    }
}

/// Number of addresses in the inclusive range `[start, end]`, or `None`
/// when the endpoints are reversed or in different families.
pub fn span(start: IpAddr, end: IpAddr) -> Option<u128> {
    let (lo, hi) = match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => (u128::from(u32::from(s)), u128::from(u32::from(e))),
        (IpAddr::V6(s), IpAddr::V6(e)) => (u128::from(s), u128::from(e)),
        _ => return None,
    };
    if hi < lo {
        return None;
    }
    hi.checked_sub(lo)?.checked_add(1)
}

/// The dotted-quad netmask for an IPv4 prefix length.
pub fn v4_netmask(prefix: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix.min(32));
    let bits = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    Ipv4Addr::from(bits)
}

// The on-disk shapes an address may take. Older deployments serialized v4
// addresses as an object of octets; those records are re-coerced on read.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireAddr {
    Text(String),
    Number(u64),
    Octets { octets: [u8; 4] },
}

impl WireAddr {
    fn into_addr<E: serde::de::Error>(self) -> Result<IpAddr, E> {
        match self {
            WireAddr::Text(text) => parse_addr("address", &text)
                .map_err(|_| E::custom(format!("invalid IP address: \"{}\"", text))),
            WireAddr::Number(raw) => match u32::try_from(raw) {
                Ok(v4) => Ok(IpAddr::V4(Ipv4Addr::from(v4))),
                Err(_) => Err(E::custom(format!("invalid IP address: {}", raw))),
            },
            WireAddr::Octets { octets } => {
                Ok(IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])))
            }
        }
    }
}

/// Deserialize an address field, accepting the legacy forms.
pub fn deserialize_addr<'de, D>(deserializer: D) -> Result<IpAddr, D::Error>
where
    D: Deserializer<'de>,
{
    WireAddr::deserialize(deserializer)?.into_addr()
}

/// Deserialize an optional address field, accepting the legacy forms.
pub fn deserialize_opt_addr<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireAddr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(wire) => wire.into_addr().map(Some),
    }
}

/// Serialize an address in its canonical textual form.
pub fn serialize_addr<S>(addr: &IpAddr, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(addr)
}

/// Serialize an optional address in its canonical textual form.
pub fn serialize_opt_addr<S>(addr: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match addr {
        Some(addr) => serializer.collect_str(addr),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            parse_addr("ip", "10.0.0.10").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10))
        );
        assert_eq!(
            parse_addr("ip", "167772170").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10))
        );
        assert_eq!(
            parse_addr("ip", "fd00::1").unwrap(),
            "fd00::1".parse::<IpAddr>().unwrap()
        );
        // An integer too large for v4 is interpreted as v6.
        let big = u128::from(u32::MAX) + 1;
        assert_eq!(
            parse_addr("ip", &big.to_string()).unwrap(),
            IpAddr::V6(Ipv6Addr::from(big))
        );

        for bad in ["", "10.0.0.", "10.0.0.256", "bogus", "fd00:::1"] {
            let err = parse_addr("ip", bad).unwrap_err();
            match err {
                Error::InvalidParams { fields, .. } => {
                    assert_eq!(fields, vec!["ip".to_string()])
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_key_ordering_and_roundtrip() {
        let a = parse_addr("ip", "10.0.0.10").unwrap();
        let b = parse_addr("ip", "10.0.0.11").unwrap();
        assert!(AddrKey::new(&a) < AddrKey::new(&b));
        assert_eq!(AddrKey::new(&a).to_addr(), a);

        // The v4-mapped v6 spelling collapses onto the v4 key.
        let mapped = "::ffff:10.0.0.10".parse::<IpAddr>().unwrap();
        assert_eq!(AddrKey::new(&mapped), AddrKey::new(&a));
        assert_eq!(AddrKey::new(&mapped).to_addr(), a);

        let v6 = parse_addr("ip", "fd00::1").unwrap();
        assert_eq!(AddrKey::new(&v6).to_addr(), v6);
    }

    #[test]
    fn test_offset_math() {
        let base = parse_addr("ip", "10.0.0.10").unwrap();
        assert_eq!(checked_add(base, 2).unwrap(), parse_addr("ip", "10.0.0.12").unwrap());
        assert_eq!(checked_sub(base, 10).unwrap(), parse_addr("ip", "10.0.0.0").unwrap());

        let top = IpAddr::V4(Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(checked_add(top, 1), None);
        assert_eq!(checked_sub(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 1), None);

        let v6_top = IpAddr::V6(Ipv6Addr::from(u128::MAX));
        assert_eq!(checked_add(v6_top, 1), None);
    }

    #[test]
    fn test_span() {
        let start = parse_addr("ip", "10.0.0.10").unwrap();
        let end = parse_addr("ip", "10.0.0.12").unwrap();
        assert_eq!(span(start, end), Some(3));
        assert_eq!(span(start, start), Some(1));
        assert_eq!(span(end, start), None);
        assert_eq!(span(start, parse_addr("ip", "fd00::1").unwrap()), None);
    }

    #[test]
    fn test_v4_netmask() {
        assert_eq!(v4_netmask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(v4_netmask(28), Ipv4Addr::new(255, 255, 255, 240));
        assert_eq!(v4_netmask(0), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(v4_netmask(32), Ipv4Addr::new(255, 255, 255, 255));
    }

    #[test]
    fn test_legacy_octets_coercion() {
        #[derive(Deserialize)]
        struct Rec {
            #[serde(deserialize_with = "deserialize_addr")]
            address: IpAddr,
        }

        let rec: Rec = serde_json::from_str(r#"{"address": "10.0.0.10"}"#).unwrap();
        assert_eq!(rec.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10)));

        let rec: Rec =
            serde_json::from_str(r#"{"address": {"octets": [10, 0, 0, 10]}}"#).unwrap();
        assert_eq!(rec.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10)));

        let rec: Rec = serde_json::from_str(r#"{"address": 167772170}"#).unwrap();
        assert_eq!(rec.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10)));

        assert!(serde_json::from_str::<Rec>(r#"{"address": "10.0.0"}"#).is_err());
    }
}
