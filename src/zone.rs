//! Zones and the record documents stored for each of their locations.
//!
//! A zone lives in the key-value store as one hash: the field names are the zone's locations
//! (`@` for the apex, otherwise a zone-relative label path such as `www` or `*.www`) and each
//! field value is a JSON [`Record`] document, e.g.:
//!
//! ```json
//! {
//!   "a": [{ "ip": "192.0.2.10", "ttl": 300 }],
//!   "mx": [{ "host": "mail.example.com.", "preference": 10 }],
//!   "txt": [{ "text": "v=spf1 mx -all" }]
//! }
//! ```
//!
//! A `ttl` of `0` (or no `ttl` at all) means the entry inherits the configured default TTL.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Location label of the zone apex.
pub const APEX: &str = "@";

/// SOA refresh interval used for zones that carry no SOA of their own.
pub const DEFAULT_REFRESH: u32 = 86_400;
/// SOA retry interval used for zones that carry no SOA of their own.
pub const DEFAULT_RETRY: u32 = 7_200;
/// SOA expire interval used for zones that carry no SOA of their own.
pub const DEFAULT_EXPIRE: u32 = 3_600;

/// A zone name together with the set of locations that currently exist in it.
///
/// Zones are loaded from the store for every query that needs one and are never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Uniform (lower-cased, fully qualified) zone name, used for matching query names.
    pub name: String,
    /// Zone name exactly as it appears in the store key.
    pub key: String,
    pub locations: BTreeSet<String>,
}

impl Zone {
    pub fn new<I, S>(name: &str, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Zone {
            name: uniform_zone(name),
            key: name.to_string(),
            locations: locations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, location: &str) -> bool {
        self.locations.contains(location)
    }

    /// Fully qualified owner name of a location in this zone.
    pub fn fqdn(&self, location: &str) -> String {
        if location == APEX {
            self.name.clone()
        } else {
            format!("{location}.{}", self.name)
        }
    }

    /// Whether `name` is this zone or lies below it, on a label boundary.
    pub fn is_in_zone(&self, name: &str) -> bool {
        is_subdomain(name, &self.name)
    }
}

/// Normalize a zone name: trimmed, lower-cased and with exactly one trailing dot.
pub fn uniform_zone(zone: &str) -> String {
    let zone = zone.trim().to_lowercase();
    format!("{}.", zone.trim_end_matches('.'))
}

/// Label-boundary aware test for `name` being equal to, or a subdomain of, `zone`. Both names
/// are expected in lower-cased, fully qualified form.
pub fn is_subdomain(name: &str, zone: &str) -> bool {
    zone == "." || name == zone || name.ends_with(&format!(".{zone}"))
}

/// Every typed entry stored at one location of a zone.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Record {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub a: Vec<Address<Ipv4Addr>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aaaa: Vec<Address<Ipv6Addr>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cname: Vec<Host>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ns: Vec<Host>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mx: Vec<Mx>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub srv: Vec<Srv>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub txt: Vec<Txt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub caa: Vec<Caa>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soa: Option<Soa>,
}

impl Record {
    /// A record holding nothing but a single address entry for `ip`. IPv4-mapped IPv6
    /// addresses are stored as plain IPv4.
    pub fn address(ip: IpAddr, ttl: u32) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
            v4 @ IpAddr::V4(_) => v4,
        };
        match ip {
            IpAddr::V4(ip) => Record {
                a: vec![Address { ip: Some(ip), ttl }],
                ..Record::default()
            },
            IpAddr::V6(ip) => Record {
                aaaa: vec![Address { ip: Some(ip), ttl }],
                ..Record::default()
            },
        }
    }

    /// A record holding only the default start-of-authority for `zone`.
    pub fn default_apex(zone: &str, ttl: u32) -> Self {
        Record {
            soa: Some(Soa::default_for(zone, ttl)),
            ..Record::default()
        }
    }
}

/// An `A` or `AAAA` entry. Addresses that don't parse are kept as `None` and skipped when
/// answering, rather than rejecting the whole document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(bound(deserialize = "T: FromStr", serialize = "T: Serialize"))]
pub struct Address<T: FromStr> {
    #[serde(default, deserialize_with = "lenient_ip")]
    pub ip: Option<T>,
    #[serde(default)]
    pub ttl: u32,
}

/// Target host entry used by both `CNAME` and `NS`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Host {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ttl: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Mx {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub preference: u16,
    #[serde(default)]
    pub ttl: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Srv {
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub weight: u16,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub ttl: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Txt {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ttl: u32,
}

/// Certification authority authorization entry. Bit 128 of `flag` marks it issuer critical.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Caa {
    #[serde(default)]
    pub flag: u8,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub ttl: u32,
}

/// Stored start-of-authority values. There is no serial: it is generated when answering.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Soa {
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub ns: String,
    #[serde(default, alias = "MBox")]
    pub mbox: String,
    #[serde(default)]
    pub refresh: u32,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub expire: u32,
    #[serde(default)]
    pub minttl: u32,
}

impl Soa {
    pub fn default_for(zone: &str, ttl: u32) -> Self {
        Soa {
            ttl: 0,
            ns: format!("ns1.{zone}"),
            mbox: format!("hostmaster.{zone}"),
            refresh: DEFAULT_REFRESH,
            retry: DEFAULT_RETRY,
            expire: DEFAULT_EXPIRE,
            minttl: ttl,
        }
    }
}

fn lenient_ip<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|ip| ip.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_zone_normalizes() {
        assert_eq!(uniform_zone(" Example.COM "), "example.com.");
        assert_eq!(uniform_zone("example.com."), "example.com.");
        assert_eq!(uniform_zone("example.com.."), "example.com.");
    }

    #[test]
    fn subdomain_respects_label_boundaries() {
        assert!(is_subdomain("www.example.com.", "example.com."));
        assert!(is_subdomain("example.com.", "example.com."));
        assert!(!is_subdomain("badexample.com.", "example.com."));
        assert!(is_subdomain("anything.", "."));
    }

    #[test]
    fn record_parses_full_document() {
        let doc = r#"{
            "a": [{"ip": "192.0.2.1", "ttl": 60}, {"ip": "not-an-ip"}],
            "aaaa": [{"ip": "2001:db8::1"}],
            "mx": [{"host": "mail.example.com.", "preference": 10}],
            "srv": [{"priority": 1, "weight": 2, "port": 5060, "target": "sip.example.com."}],
            "caa": [{"flag": 0, "tag": "issue", "value": "letsencrypt.org"}],
            "soa": {"ns": "ns1.example.com.", "MBox": "hostmaster.example.com.", "refresh": 44}
        }"#;
        let record: Record = serde_json::from_str(doc).unwrap();
        assert_eq!(record.a.len(), 2);
        assert_eq!(record.a[0].ip, Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(record.a[0].ttl, 60);
        assert_eq!(record.a[1].ip, None);
        assert_eq!(record.aaaa[0].ip, Some("2001:db8::1".parse().unwrap()));
        assert_eq!(record.mx[0].preference, 10);
        assert_eq!(record.srv[0].port, 5060);
        assert_eq!(record.caa[0].tag, "issue");
        let soa = record.soa.unwrap();
        assert_eq!(soa.mbox, "hostmaster.example.com.");
        assert_eq!(soa.refresh, 44);
        assert_eq!(soa.minttl, 0);
    }

    #[test]
    fn address_record_uses_family_of_ip() {
        let v4 = Record::address("10.1.2.3".parse().unwrap(), 300);
        assert_eq!(v4.a[0].ip, Some(Ipv4Addr::new(10, 1, 2, 3)));
        assert!(v4.aaaa.is_empty());

        let mapped = Record::address("::ffff:10.1.2.3".parse().unwrap(), 300);
        assert_eq!(mapped.a[0].ip, Some(Ipv4Addr::new(10, 1, 2, 3)));

        let v6 = Record::address("2001:db8::5".parse().unwrap(), 300);
        assert!(v6.a.is_empty());
        assert_eq!(v6.aaaa[0].ttl, 300);
        assert_eq!(
            serde_json::to_string(&v4).unwrap(),
            r#"{"a":[{"ip":"10.1.2.3","ttl":300}]}"#
        );
    }

    #[test]
    fn zone_fqdn() {
        let zone = Zone::new("Example.com", ["@", "www"]);
        assert_eq!(zone.fqdn(APEX), "example.com.");
        assert_eq!(zone.fqdn("www"), "www.example.com.");
        assert!(zone.is_in_zone("mail.example.com."));
        assert!(!zone.is_in_zone("mail.example.org."));
        assert_eq!(zone.key, "Example.com");
    }

    #[test]
    fn address_documents_round_trip_through_serde() {
        let doc = r#"{"a":[{"ip":"192.0.2.1","ttl":0}],"aaaa":[{"ip":"2001:db8::1","ttl":30}]}"#;
        let record: Record = serde_json::from_str(doc).unwrap();
        assert_eq!(record.a[0].ip, Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(record.aaaa[0].ttl, 30);
        assert_eq!(serde_json::to_string(&record).unwrap(), doc);
    }
}
