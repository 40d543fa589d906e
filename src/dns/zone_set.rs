//! The set of zones this server is authoritative for.
//!
//! The set is refreshed from the store lazily: the first query arriving after
//! [`REFRESH_INTERVAL`] triggers a refresh. Concurrent queries may refresh at the same time;
//! a refresh only reads the store and provisions missing auto-create zones, so running it
//! twice is harmless and the last writer wins.

use crate::error::Error;
use crate::kv_store::ZoneStore;
use crate::zone::{is_subdomain, uniform_zone};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Default)]
struct State {
    zones: Vec<String>,
    refreshed_at: Option<Instant>,
}

#[allow(clippy::module_name_repetitions)]
pub struct ZoneSet {
    store: ZoneStore,
    auto_create: Vec<String>,
    ttl: u32,
    refresh_interval: Duration,
    state: RwLock<State>,
}

impl ZoneSet {
    /// An empty zone set. `auto_create` zones must already be in uniform form.
    pub fn new(store: ZoneStore, auto_create: Vec<String>, ttl: u32) -> Self {
        ZoneSet {
            store,
            auto_create,
            ttl,
            refresh_interval: REFRESH_INTERVAL,
            state: RwLock::default(),
        }
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Reload the zone list from the store, provisioning every auto-create zone that is
    /// missing. A zone that fails to provision is logged and left out.
    ///
    /// # Errors
    ///
    /// Returns the store error if the zones can't be listed. The previous zone set is kept.
    pub async fn refresh(&self) -> Result<Vec<String>, Error> {
        let mut zones = self.store.list_zones().await?;
        for zone in &self.auto_create {
            if zones.iter().any(|existing| uniform_zone(existing) == *zone) {
                continue;
            }
            match self.store.create_zone(zone, self.ttl).await {
                Ok(_) => {
                    info!("zone {zone} auto-created");
                    zones.push(zone.clone());
                }
                Err(err) => warn!("error creating zone {zone}: {err}"),
            }
        }
        info!("loaded zones from store: {zones:?}");

        let mut state = self.state.write().await;
        state.zones = zones.clone();
        state.refreshed_at = Some(Instant::now());
        Ok(zones)
    }

    /// Refresh when the last successful refresh is older than the refresh interval.
    pub async fn refresh_if_stale(&self) {
        let stale = match self.state.read().await.refreshed_at {
            Some(refreshed_at) => refreshed_at.elapsed() >= self.refresh_interval,
            None => true,
        };
        if stale {
            if let Err(err) = self.refresh().await {
                warn!("zone refresh failed, keeping previous zones: {err}");
            }
        }
    }

    /// The most specific zone `qname` belongs to, if any. The name is returned as stored, which
    /// may differ in case from the query.
    pub async fn matching(&self, qname: &str) -> Option<String> {
        self.state
            .read()
            .await
            .zones
            .iter()
            .filter(|zone| is_subdomain(qname, &uniform_zone(zone)))
            .max_by_key(|zone| zone.len())
            .cloned()
    }
}
