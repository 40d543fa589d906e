use crate::config::SharedConfig;
use crate::dns::handlers::Handler;
use crate::dns::zone_set::ZoneSet;
use crate::kv_store::{DynKvStore, ZoneStore};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::ServerFuture;

/// Build the DNS server for the zones held in `kv_store`. The zone set is loaded, and any
/// missing auto-create zone provisioned, before the sockets are bound.
pub async fn new(
    config: SharedConfig,
    kv_store: DynKvStore,
) -> anyhow::Result<ServerFuture<Handler>> {
    let store = ZoneStore::new(kv_store, &config.key_prefix, &config.key_suffix);
    let zone_set = ZoneSet::new(store.clone(), config.auto_create.clone(), config.ttl);
    zone_set.refresh().await?;

    let udp_addr = config.dns_udp_bind_addr;
    let tcp_addr = config.dns_tcp_bind_addr;
    let tcp_timeout = config.dns_tcp_timeout;
    let dns_handler = Handler::new(config, store, Arc::new(zone_set));
    let mut dns_server = ServerFuture::new(dns_handler);
    dns_server.register_socket(UdpSocket::bind(udp_addr).await?);
    dns_server.register_listener(TcpListener::bind(tcp_addr).await?, tcp_timeout);
    Ok(dns_server)
}
