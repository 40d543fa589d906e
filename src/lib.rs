//! redzone
//!
//! An authoritative DNS server whose zones live in [Redis] hashes instead of zone files.
//!
//! Every zone is one hash: its fields are the zone's locations and its values are JSON record
//! documents (see [`zone::Record`]). Records are read from the store on every query, so edits
//! take effect immediately. Hosts inside trusted networks can register their own address
//! records with a single `TXT` query (see [`dns::register`]).
//!
//! [Redis]: https://redis.io
//!
#![warn(clippy::pedantic)]

pub mod config;
pub mod dns;
pub mod error;
pub mod kv_store;
pub mod zone;

pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use kv_store::{FileKvStore, InMemoryKvStore, RedisKvStore};
