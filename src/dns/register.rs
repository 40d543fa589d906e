//! Self-registration of address records.
//!
//! A host inside one of the configured registration networks can claim a name by asking for
//! the `TXT` record of `_reg.<name>.<zone>`. When `<name>` doesn't already resolve in the zone,
//! the client's source address is written to the store for `<name>` and the reply confirms the
//! registered host name:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short _reg.laptop.example.com TXT
//! "laptop.example.com"
//! ❯ dig @127.0.0.1 -p 5353 +short laptop.example.com A
//! 10.0.0.7
//! ```

use crate::config::SharedConfig;
use crate::dns::synth::effective_ttl;
use crate::error::Error;
use crate::kv_store::ZoneStore;
use crate::zone::{self, Zone};
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{error, info, warn};
use trust_dns_proto::rr::rdata::TXT;
use trust_dns_proto::rr::{Name, RData, Record};

/// Leading label that turns a `TXT` query into a registration request.
pub const REGISTRATION_PREFIX: &str = "_reg.";

/// TTL of the confirmation record, before reconciliation with the configured TTL.
const CONFIRMATION_TTL: u32 = 60;

/// Whether a query of type `TXT` for `qname` asks for a registration.
pub fn is_registration(qname: &str) -> bool {
    qname.starts_with(REGISTRATION_PREFIX)
}

pub struct Registrar {
    config: SharedConfig,
    store: ZoneStore,
}

impl Registrar {
    pub fn new(config: SharedConfig, store: ZoneStore) -> Self {
        Registrar { config, store }
    }

    /// Register `client` under the name requested by `qname` in `zone`.
    ///
    /// Returns the confirmation record, or `None` when the request is denied and must be
    /// answered with a name error. Failing to persist the record is logged but still confirmed.
    ///
    /// # Errors
    ///
    /// Only a confirmation that can't be encoded as a DNS name is an error.
    pub async fn register(
        &self,
        qname: &str,
        zone: &Zone,
        client: IpAddr,
    ) -> Result<Option<Record>, Error> {
        if !self.config.registration_permitted(client) {
            warn!(%client, qname, "registration denied: client outside registration networks");
            return Ok(None);
        }

        let Some(target) = qname.strip_prefix(REGISTRATION_PREFIX) else {
            return Ok(None);
        };
        let subdomain = match target.strip_suffix(&format!(".{}", zone.name)) {
            Some(subdomain) if !subdomain.is_empty() => subdomain,
            _ => {
                warn!(%client, qname, "registration denied: no name below zone {}", zone.name);
                return Ok(None);
            }
        };
        if self.config.registration_denied(subdomain) {
            warn!(%client, qname, "registration denied: {subdomain} is reserved");
            return Ok(None);
        }

        let record = zone::Record::address(client, self.config.ttl);
        match self.store.put_record(zone, subdomain, &record).await {
            Ok(()) => info!(%client, "registered {target}"),
            Err(err) => error!(%client, "error registering {target}: {err}"),
        }

        let host = target.trim_end_matches('.').to_string();
        let ttl = effective_ttl(self.config.ttl, CONFIRMATION_TTL);
        Ok(Some(Record::from_rdata(
            Name::from_str(qname)?,
            ttl,
            RData::TXT(TXT::new(vec![host])),
        )))
    }
}
