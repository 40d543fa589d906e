use crate::error::Error;
use crate::kv_store::{DynKvStore, FileKvStore, InMemoryKvStore, RedisKvStore};
use crate::zone::uniform_zone;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub type SharedConfig = Arc<Config>;

/// TTL used when the configuration doesn't set one.
pub const DEFAULT_TTL: u32 = 300;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub dns_udp_bind_addr: SocketAddr,
    pub dns_tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub dns_tcp_timeout: Duration,
    pub store: StoreConfig,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub key_suffix: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub auto_create: Vec<String>,
    #[serde(default)]
    pub register_networks: Vec<IpNetwork>,
    #[serde(default)]
    pub register_deny: Vec<String>,
}

/// Backend holding the zone data.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Redis(RedisConfig),
    File { path: String },
    Memory,
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct RedisConfig {
    /// `host:port`, or a complete `redis://` URL.
    pub address: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Bounds opening a connection and waiting for a free pooled one. Zero disables it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default)]
    pub connect_timeout: Duration,
    /// Bounds every single store command. Zero disables it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default)]
    pub read_timeout: Duration,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

fn default_pool_size() -> usize {
    16
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.normalized()
    }

    /// Canonicalize user supplied names and reject unusable settings.
    pub fn normalized(mut self) -> Result<Self, Error> {
        if let StoreConfig::Redis(redis) = &self.store {
            if redis.pool_size == 0 {
                return Err(Error::InvalidConfig("store pool_size must be positive".into()));
            }
        }
        self.auto_create = self
            .auto_create
            .iter()
            .map(|zone| uniform_zone(zone))
            .collect();
        self.register_deny = self
            .register_deny
            .iter()
            .map(|subdomain| subdomain.trim().to_lowercase())
            .collect();
        Ok(self)
    }

    /// Whether `source_ip` lies within one of the networks allowed to self-register.
    pub fn registration_permitted(&self, source_ip: IpAddr) -> bool {
        let source_ip = match source_ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(source_ip, IpAddr::V4),
            IpAddr::V4(_) => source_ip,
        };
        self.register_networks
            .iter()
            .any(|network| network.contains(source_ip))
    }

    /// Whether `subdomain` may never be self-registered.
    pub fn registration_denied(&self, subdomain: &str) -> bool {
        let subdomain = subdomain.to_lowercase();
        self.register_deny.iter().any(|deny| *deny == subdomain)
    }

    /// Build the key-value store described by [`Config::store`].
    pub async fn kv_store(&self) -> Result<DynKvStore, Error> {
        let kv_store: DynKvStore = match &self.store {
            StoreConfig::Redis(redis) => Arc::new(RedisKvStore::new(redis)?),
            StoreConfig::File { path } => Arc::new(FileKvStore::try_from_file(path).await?),
            StoreConfig::Memory => Arc::new(InMemoryKvStore::default()),
        };
        Ok(kv_store)
    }

    pub fn log_summary(&self) {
        tracing::info!("configuration:");
        match &self.store {
            StoreConfig::Redis(redis) => {
                tracing::info!("\tstore: redis {}", redis.address);
                tracing::info!("\tconnect timeout: {:?}", redis.connect_timeout);
                tracing::info!("\tread timeout: {:?}", redis.read_timeout);
                tracing::info!("\tpool size: {}", redis.pool_size);
            }
            StoreConfig::File { path } => tracing::info!("\tstore: file {path}"),
            StoreConfig::Memory => tracing::info!("\tstore: memory"),
        }
        tracing::info!("\tkey prefix: {:?}", self.key_prefix);
        tracing::info!("\tkey suffix: {:?}", self.key_suffix);
        tracing::info!("\tTTL: {}", self.ttl);
        for zone in &self.auto_create {
            tracing::info!("\tauto create: {zone}");
        }
        for network in &self.register_networks {
            tracing::info!("\tregister network: {network}");
        }
        for deny in &self.register_deny {
            tracing::info!("\tregister deny: {deny}");
        }
    }
}

impl RedisConfig {
    /// Connection URL for the pool, with the password (if any) folded in.
    pub fn url(&self) -> Result<String, Error> {
        let raw = if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        };
        let mut url = Url::parse(&raw)
            .map_err(|err| Error::InvalidConfig(format!("store address {raw:?}: {err}")))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|()| {
                Error::InvalidConfig(format!("store address {raw:?} can't carry a password"))
            })?;
        }
        Ok(url.to_string())
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}
