//! Authoritative DNS server for zones kept in a key-value store.
//!
//! # Zones
//!
//! redzone answers for every zone found in the store (see [`crate::kv_store`]) plus the zones
//! listed in [`Config::auto_create`][`crate::config::Config::auto_create`], which are created
//! with a default SOA when missing. The zone list is reloaded lazily, at most every ten
//! minutes. Queries for names outside of every zone are refused.
//!
//! # Name resolution
//!
//! The query name is looked up among the zone's locations, falling back to wildcards the way
//! [RFC 4592] describes. With a zone holding the locations `@`, `www` and `*.dyn`:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short www.example.com A
//! 192.0.2.1
//! ❯ dig @127.0.0.1 -p 5353 +short host7.dyn.example.com A
//! 192.0.2.99
//! ```
//!
//! `A`, `AAAA`, `CNAME`, `NS`, `MX`, `SRV`, `TXT`, `CAA` and `SOA` queries are answered, other
//! types get `NOTIMP`. `NS`, `MX` and `SRV` answers carry the addresses of in-zone targets in
//! the additional section.
//!
//! # Zone transfers
//!
//! `AXFR` queries receive every record of the zone, framed by its SOA and split over as many
//! messages as needed.
//!
//! # Self-registration
//!
//! See [`register`].
//!
//! [RFC 4592]: https://www.rfc-editor.org/rfc/rfc4592

pub mod axfr;
pub mod handlers;
pub mod register;
pub mod resolver;
pub mod server;
pub mod synth;
pub mod zone_set;

pub use server::new;
