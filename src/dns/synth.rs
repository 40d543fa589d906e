//! Synthesis of DNS resource records from stored [`zone::Record`] documents.
//!
//! Entries with an empty payload are skipped silently. `NS`, `MX` and `SRV` answers come with
//! glue: the `A`, `AAAA` and `CNAME` records of their in-zone targets, for the additional
//! section.

use crate::dns::resolver::find_location;
use crate::error::Error;
use crate::kv_store::ZoneStore;
use crate::zone::{self, Zone, APEX};
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::{debug, warn};
use trust_dns_proto::rr::rdata::caa::KeyValue;
use trust_dns_proto::rr::rdata::{CAA, MX, SOA, SRV, TXT};
use trust_dns_proto::rr::{Name, RData, Record, RecordType};
use url::Url;

/// TTL used when neither the configuration nor the stored entry sets one.
pub const FALLBACK_TTL: u32 = 360;

/// Longest character-string a TXT record can carry.
const TXT_STRING_LEN: usize = 255;

/// Record types answered from stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    A,
    AAAA,
    CNAME,
    NS,
    MX,
    SRV,
    TXT,
    CAA,
    SOA,
}

impl RecordKind {
    /// Kinds included for every non-apex location of a zone transfer.
    pub const TRANSFERRED: [RecordKind; 8] = [
        RecordKind::A,
        RecordKind::AAAA,
        RecordKind::CNAME,
        RecordKind::NS,
        RecordKind::MX,
        RecordKind::SRV,
        RecordKind::TXT,
        RecordKind::CAA,
    ];

    pub fn from_record_type(record_type: RecordType) -> Option<Self> {
        match record_type {
            RecordType::A => Some(RecordKind::A),
            RecordType::AAAA => Some(RecordKind::AAAA),
            RecordType::CNAME => Some(RecordKind::CNAME),
            RecordType::NS => Some(RecordKind::NS),
            RecordType::MX => Some(RecordKind::MX),
            RecordType::SRV => Some(RecordKind::SRV),
            RecordType::TXT => Some(RecordKind::TXT),
            RecordType::CAA => Some(RecordKind::CAA),
            RecordType::SOA => Some(RecordKind::SOA),
            _ => None,
        }
    }
}

/// Answer and additional section records produced for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesized {
    pub answers: Vec<Record>,
    pub extras: Vec<Record>,
}

impl Synthesized {
    fn answers(answers: Vec<Record>) -> Self {
        Synthesized {
            answers,
            extras: Vec::new(),
        }
    }
}

/// The TTL actually served for an entry whose stored TTL is `ttl`, given the configured
/// default TTL. Zero means unset on either side. The configured default is a ceiling.
pub fn effective_ttl(default_ttl: u32, ttl: u32) -> u32 {
    match (default_ttl, ttl) {
        (0, 0) => FALLBACK_TTL,
        (0, ttl) => ttl,
        (default_ttl, 0) => default_ttl,
        (default_ttl, ttl) => default_ttl.min(ttl),
    }
}

/// Split `text` into character-strings of at most 255 octets, never inside a UTF-8 sequence.
pub fn split_txt(text: &str) -> Vec<String> {
    let mut strings = Vec::with_capacity(text.len() / TXT_STRING_LEN + 1);
    let mut rest = text;
    while rest.len() > TXT_STRING_LEN {
        let mut cut = TXT_STRING_LEN;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        strings.push(head.to_string());
        rest = tail;
    }
    strings.push(rest.to_string());
    strings
}

/// Zone serial: the current Unix time, so it moves forward with every second.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn serial() -> u32 {
    OffsetDateTime::now_utc().unix_timestamp() as u32
}

/// Parse a stored host name, treating it as fully qualified whether or not it ends in a dot.
fn host_name(host: &str) -> Option<Name> {
    let host = host.trim();
    let fqdn = if host.ends_with('.') {
        Name::from_str(host)
    } else {
        Name::from_str(&format!("{host}."))
    };
    match fqdn {
        Ok(name) => Some(name),
        Err(err) => {
            debug!("skipping invalid host name {host:?}: {err}");
            None
        }
    }
}

fn saturating_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Builds records for one zone, looking up glue in the same zone when needed.
pub struct Synthesizer<'a> {
    store: &'a ZoneStore,
    zone: &'a Zone,
    default_ttl: u32,
}

impl<'a> Synthesizer<'a> {
    pub fn new(store: &'a ZoneStore, zone: &'a Zone, default_ttl: u32) -> Self {
        Synthesizer {
            store,
            zone,
            default_ttl,
        }
    }

    pub fn zone(&self) -> &Zone {
        self.zone
    }

    pub fn store(&self) -> &ZoneStore {
        self.store
    }

    pub fn ttl(&self, ttl: u32) -> u32 {
        effective_ttl(self.default_ttl, ttl)
    }

    /// Records of `kind` for `owner`, from the `record` stored at the location `owner` resolved
    /// to. A location without a stored document answers nothing except a default SOA.
    pub async fn synthesize(
        &self,
        kind: RecordKind,
        owner: &Name,
        record: Option<&zone::Record>,
    ) -> Result<Synthesized, Error> {
        let empty = zone::Record::default();
        let stored = record.unwrap_or(&empty);
        Ok(match kind {
            RecordKind::A => Synthesized::answers(self.a(owner, stored)),
            RecordKind::AAAA => Synthesized::answers(self.aaaa(owner, stored)),
            RecordKind::CNAME => Synthesized::answers(self.cname(owner, stored)),
            RecordKind::TXT => Synthesized::answers(self.txt(owner, stored)),
            RecordKind::CAA => Synthesized::answers(self.caa(owner, stored)),
            RecordKind::NS => self.ns(owner, stored).await?,
            RecordKind::MX => self.mx(owner, stored).await?,
            RecordKind::SRV => self.srv(owner, stored).await?,
            RecordKind::SOA => Synthesized::answers(vec![self.soa(owner, record)?]),
        })
    }

    pub fn a(&self, owner: &Name, record: &zone::Record) -> Vec<Record> {
        record
            .a
            .iter()
            .filter_map(|a| {
                let ip = a.ip?;
                Some(Record::from_rdata(owner.clone(), self.ttl(a.ttl), RData::A(ip)))
            })
            .collect()
    }

    pub fn aaaa(&self, owner: &Name, record: &zone::Record) -> Vec<Record> {
        record
            .aaaa
            .iter()
            .filter_map(|aaaa| {
                let ip = aaaa.ip?;
                Some(Record::from_rdata(owner.clone(), self.ttl(aaaa.ttl), RData::AAAA(ip)))
            })
            .collect()
    }

    pub fn cname(&self, owner: &Name, record: &zone::Record) -> Vec<Record> {
        record
            .cname
            .iter()
            .filter(|cname| !cname.host.is_empty())
            .filter_map(|cname| {
                let target = host_name(&cname.host)?;
                Some(Record::from_rdata(owner.clone(), self.ttl(cname.ttl), RData::CNAME(target)))
            })
            .collect()
    }

    pub fn txt(&self, owner: &Name, record: &zone::Record) -> Vec<Record> {
        record
            .txt
            .iter()
            .filter(|txt| !txt.text.is_empty())
            .map(|txt| {
                let rdata = RData::TXT(TXT::new(split_txt(&txt.text)));
                Record::from_rdata(owner.clone(), self.ttl(txt.ttl), rdata)
            })
            .collect()
    }

    pub fn caa(&self, owner: &Name, record: &zone::Record) -> Vec<Record> {
        record
            .caa
            .iter()
            .filter(|caa| !caa.tag.is_empty() && !caa.value.is_empty())
            .filter_map(|caa| {
                let rdata = caa_rdata(caa)?;
                Some(Record::from_rdata(owner.clone(), self.ttl(caa.ttl), RData::CAA(rdata)))
            })
            .collect()
    }

    pub async fn ns(&self, owner: &Name, record: &zone::Record) -> Result<Synthesized, Error> {
        let mut synthesized = Synthesized::default();
        for ns in record.ns.iter().filter(|ns| !ns.host.is_empty()) {
            let Some(target) = host_name(&ns.host) else {
                continue;
            };
            synthesized.extras.extend(self.glue(&target).await?);
            synthesized
                .answers
                .push(Record::from_rdata(owner.clone(), self.ttl(ns.ttl), RData::NS(target)));
        }
        Ok(synthesized)
    }

    pub async fn mx(&self, owner: &Name, record: &zone::Record) -> Result<Synthesized, Error> {
        let mut synthesized = Synthesized::default();
        for mx in record.mx.iter().filter(|mx| !mx.host.is_empty()) {
            let Some(target) = host_name(&mx.host) else {
                continue;
            };
            synthesized.extras.extend(self.glue(&target).await?);
            let rdata = RData::MX(MX::new(mx.preference, target));
            synthesized
                .answers
                .push(Record::from_rdata(owner.clone(), self.ttl(mx.ttl), rdata));
        }
        Ok(synthesized)
    }

    pub async fn srv(&self, owner: &Name, record: &zone::Record) -> Result<Synthesized, Error> {
        let mut synthesized = Synthesized::default();
        for srv in record.srv.iter().filter(|srv| !srv.target.is_empty()) {
            let Some(target) = host_name(&srv.target) else {
                continue;
            };
            synthesized.extras.extend(self.glue(&target).await?);
            let rdata = RData::SRV(SRV::new(srv.priority, srv.weight, srv.port, target));
            synthesized
                .answers
                .push(Record::from_rdata(owner.clone(), self.ttl(srv.ttl), rdata));
        }
        Ok(synthesized)
    }

    /// The zone's SOA. Without a usable stored SOA a default one is made up: `ns1.<zone>` as
    /// primary name server and `hostmaster.<zone>` as mailbox. The serial is always the current
    /// time.
    pub fn soa(&self, owner: &Name, record: Option<&zone::Record>) -> Result<Record, Error> {
        let stored = record
            .and_then(|record| record.soa.as_ref())
            .filter(|soa| !soa.ns.is_empty());

        if let Some(soa) = stored {
            match (host_name(&soa.ns), host_name(&soa.mbox)) {
                (Some(mname), Some(rname)) => {
                    let owner = Name::from_str(&self.zone.name)?;
                    let rdata = soa_rdata(mname, rname, soa);
                    return Ok(Record::from_rdata(owner, self.ttl(soa.ttl), rdata));
                }
                _ => warn!(zone = %self.zone.name, "ignoring malformed SOA {soa:?}"),
            }
        }

        let soa = zone::Soa::default_for(&self.zone.name, self.default_ttl);
        let rdata = soa_rdata(Name::from_str(&soa.ns)?, Name::from_str(&soa.mbox)?, &soa);
        Ok(Record::from_rdata(owner.clone(), self.ttl(0), rdata))
    }

    /// Address and alias records for an in-zone `host`, for the additional section.
    async fn glue(&self, host: &Name) -> Result<Vec<Record>, Error> {
        let host_str = host.to_lowercase().to_string();
        if !self.zone.is_in_zone(&host_str) {
            return Ok(Vec::new());
        }
        let Some(location) = find_location(&host_str, self.zone) else {
            return Ok(Vec::new());
        };
        let Some(record) = self.store.record(self.zone, &location).await? else {
            return Ok(Vec::new());
        };
        let mut glue = self.a(host, &record);
        glue.extend(self.aaaa(host, &record));
        glue.extend(self.cname(host, &record));
        Ok(glue)
    }

    /// The stored record at the apex, if any.
    pub async fn apex(&self) -> Result<Option<zone::Record>, Error> {
        self.store.record(self.zone, APEX).await
    }
}

fn soa_rdata(mname: Name, rname: Name, soa: &zone::Soa) -> RData {
    RData::SOA(SOA::new(
        mname,
        rname,
        serial(),
        saturating_i32(soa.refresh),
        saturating_i32(soa.retry),
        saturating_i32(soa.expire),
        soa.minttl,
    ))
}

fn caa_rdata(caa: &zone::Caa) -> Option<CAA> {
    let issuer_critical = caa.flag & 0b1000_0000 != 0;
    match caa.tag.to_ascii_lowercase().as_str() {
        tag @ ("issue" | "issuewild") => {
            let mut parts = caa.value.split(';');
            let issuer = parts.next().map(str::trim).unwrap_or_default();
            let name = if issuer.is_empty() {
                None
            } else {
                Some(Name::from_str(issuer).ok()?)
            };
            let options = parts
                .filter_map(|option| option.split_once('='))
                .map(|(key, value)| KeyValue::new(key.trim(), value.trim()))
                .collect();
            Some(if tag == "issue" {
                CAA::new_issue(issuer_critical, name, options)
            } else {
                CAA::new_issuewild(issuer_critical, name, options)
            })
        }
        "iodef" => match Url::parse(&caa.value) {
            Ok(url) => Some(CAA::new_iodef(issuer_critical, url)),
            Err(err) => {
                debug!("skipping CAA iodef with invalid URL {:?}: {err}", caa.value);
                None
            }
        },
        tag => {
            debug!("skipping CAA entry with unsupported tag {tag:?}");
            None
        }
    }
}
