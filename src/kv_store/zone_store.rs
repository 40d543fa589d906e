use crate::error::Error;
use crate::kv_store::DynKvStore;
use crate::zone::{Record, Zone, APEX};
use tracing::{debug, warn};

/// Translates zone and record lookups into [`KvStore`][super::KvStore] operations.
///
/// Nothing is cached: every call goes to the store, so edits made directly in the store are
/// visible to the very next query.
#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct ZoneStore {
    kv: DynKvStore,
    key_prefix: String,
    key_suffix: String,
}

impl ZoneStore {
    pub fn new(kv: DynKvStore, key_prefix: impl Into<String>, key_suffix: impl Into<String>) -> Self {
        ZoneStore {
            kv,
            key_prefix: key_prefix.into(),
            key_suffix: key_suffix.into(),
        }
    }

    fn zone_key(&self, zone: &str) -> String {
        format!("{}{zone}{}", self.key_prefix, self.key_suffix)
    }

    /// Names of every zone present in the store.
    pub async fn list_zones(&self) -> Result<Vec<String>, Error> {
        let pattern = format!("{}*{}", self.key_prefix, self.key_suffix);
        let keys = self.kv.keys(&pattern).await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix(self.key_prefix.as_str())
                    .and_then(|key| key.strip_suffix(self.key_suffix.as_str()))
            })
            .filter(|zone| !zone.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// Load the location set of `zone`. A zone without any location is reported as `None`.
    pub async fn load_zone(&self, zone: &str) -> Result<Option<Zone>, Error> {
        let locations = self.kv.hkeys(&self.zone_key(zone)).await?;
        if locations.is_empty() {
            return Ok(None);
        }
        Ok(Some(Zone::new(zone, locations)))
    }

    /// Fetch and parse the record stored at `location`. The zone name itself addresses the
    /// apex. A document that can't be parsed is logged and treated as absent.
    pub async fn record(&self, zone: &Zone, location: &str) -> Result<Option<Record>, Error> {
        let label = if location == zone.name { APEX } else { location };
        let Some(doc) = self.kv.hget(&self.zone_key(&zone.key), label).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&doc) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(zone = %zone.name, label, "ignoring malformed record {doc:?}: {err}");
                Ok(None)
            }
        }
    }

    /// Store `record` at `label` of `zone`, replacing whatever was there.
    pub async fn put_record(&self, zone: &Zone, label: &str, record: &Record) -> Result<(), Error> {
        let doc = serde_json::to_string(record)?;
        self.kv.hset(&self.zone_key(&zone.key), label, &doc).await
    }

    /// Provision `zone` with a default SOA at its apex. An existing apex is left untouched, in
    /// which case `false` is returned.
    pub async fn create_zone(&self, zone: &str, ttl: u32) -> Result<bool, Error> {
        if !zone.ends_with('.') {
            return Err(Error::NotFQDN(zone.to_string()));
        }
        let doc = serde_json::to_string(&Record::default_apex(zone, ttl))?;
        let created = self.kv.hset_nx(&self.zone_key(zone), APEX, &doc).await?;
        if created {
            debug!("zone {zone} SOA created");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::{InMemoryKvStore, KvStore};
    use std::sync::Arc;

    fn store() -> (Arc<InMemoryKvStore>, ZoneStore) {
        let kv = Arc::new(InMemoryKvStore::default());
        let zones = ZoneStore::new(kv.clone(), "_dns:", ":zone");
        (kv, zones)
    }

    #[tokio::test]
    async fn lists_zones_by_prefix_and_suffix() {
        let (kv, zones) = store();
        kv.hset("_dns:example.com.:zone", "@", "{}").await.unwrap();
        kv.hset("_dns:example.org.:zone", "@", "{}").await.unwrap();
        kv.hset("_dns:example.net.", "@", "{}").await.unwrap();
        kv.hset("session:abc", "x", "y").await.unwrap();
        assert_eq!(
            zones.list_zones().await.unwrap(),
            vec!["example.com.", "example.org."]
        );
    }

    #[tokio::test]
    async fn loads_zone_locations() {
        let (kv, zones) = store();
        kv.hset("_dns:example.com.:zone", "@", "{}").await.unwrap();
        kv.hset("_dns:example.com.:zone", "*.www", "{}").await.unwrap();

        let zone = zones.load_zone("example.com.").await.unwrap().unwrap();
        assert_eq!(zone.name, "example.com.");
        assert!(zone.contains("@"));
        assert!(zone.contains("*.www"));
        assert!(zones.load_zone("missing.com.").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_absent() {
        let (kv, zones) = store();
        kv.hset("_dns:example.com.:zone", "@", r#"{"soa": {"ns": "ns1.example.com."}}"#)
            .await
            .unwrap();
        kv.hset("_dns:example.com.:zone", "bad", "{not json")
            .await
            .unwrap();
        let zone = zones.load_zone("example.com.").await.unwrap().unwrap();

        assert!(zones.record(&zone, "bad").await.unwrap().is_none());
        assert!(zones.record(&zone, "nothing").await.unwrap().is_none());
        let apex = zones.record(&zone, "example.com.").await.unwrap().unwrap();
        assert_eq!(apex.soa.unwrap().ns, "ns1.example.com.");
    }

    #[tokio::test]
    async fn mixed_case_zone_key_is_kept() {
        let (kv, zones) = store();
        kv.hset("_dns:Example.com.:zone", "www", r#"{"a": [{"ip": "192.0.2.1"}]}"#)
            .await
            .unwrap();
        let zone = zones.load_zone("Example.com.").await.unwrap().unwrap();
        assert_eq!(zone.name, "example.com.");
        assert!(zones.record(&zone, "www").await.unwrap().is_some());

        zones
            .put_record(&zone, "new", &Record::address("10.0.0.1".parse().unwrap(), 60))
            .await
            .unwrap();
        assert!(kv.hget("_dns:Example.com.:zone", "new").await.unwrap().is_some());
        assert!(kv.keys("_dns:example.com.*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_zone_never_overwrites_apex() {
        let (kv, zones) = store();
        assert!(zones.create_zone("example.com.", 300).await.unwrap());
        let zone = zones.load_zone("example.com.").await.unwrap().unwrap();
        let soa = zones.record(&zone, "@").await.unwrap().unwrap().soa.unwrap();
        assert_eq!(soa.ns, "ns1.example.com.");
        assert_eq!(soa.mbox, "hostmaster.example.com.");
        assert_eq!(soa.minttl, 300);

        let custom = r#"{"soa": {"ns": "ns.custom.net.", "mbox": "admin.custom.net."}}"#;
        kv.hset("_dns:example.com.:zone", "@", custom).await.unwrap();
        assert!(!zones.create_zone("example.com.", 300).await.unwrap());
        assert_eq!(
            kv.hget("_dns:example.com.:zone", "@").await.unwrap().as_deref(),
            Some(custom)
        );

        assert!(matches!(
            zones.create_zone("example.com", 300).await,
            Err(Error::NotFQDN(_))
        ));
    }
}
