use lazy_static::lazy_static;

pub use node_metrics::*;

lazy_static! {
    pub static ref GOSSIP_ACTIVE_FORKS: Result<IntGauge> = try_create_int_gauge(
        "network_gossip_active_forks",
        "Count of consensus forks with live gossip topics"
    );
    pub static ref GOSSIP_SUBSCRIBED_SUBNETS: Result<IntGauge> = try_create_int_gauge(
        "network_gossip_subscribed_attestation_subnets",
        "Count of attestation subnets currently subscribed"
    );
    pub static ref SYNC_BLOCKS_IMPORTED: Result<IntCounter> = try_create_int_counter(
        "network_sync_blocks_imported_total",
        "Count of blocks imported by forward range sync"
    );
    pub static ref BACKFILL_BLOCKS_IMPORTED: Result<IntCounter> = try_create_int_counter(
        "network_backfill_blocks_imported_total",
        "Count of blocks stored by backfill"
    );
    pub static ref LOOKUPS_PENDING: Result<IntGauge> = try_create_int_gauge(
        "network_lookups_pending",
        "Count of by-root lookups with outstanding attempts"
    );
}
