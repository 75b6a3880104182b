use lazy_static::lazy_static;

pub use node_metrics::*;

lazy_static! {
    /*
     * Block processing
     */
    pub static ref BLOCK_PROCESSING_REQUESTS: Result<IntCounter> = try_create_int_counter(
        "beacon_block_processing_requests_total",
        "Count of blocks submitted for processing"
    );
    pub static ref BLOCK_PROCESSING_SUCCESSES: Result<IntCounter> = try_create_int_counter(
        "beacon_block_processing_successes_total",
        "Count of blocks processed without error"
    );
    pub static ref BLOCK_PROCESSING_TIMES: Result<Histogram> = try_create_histogram(
        "beacon_block_processing_seconds",
        "Full runtime of block processing"
    );
    pub static ref BLOCK_QUEUE_LENGTH: Result<IntGauge> = try_create_int_gauge(
        "beacon_block_queue_length",
        "Count of blocks awaiting processing"
    );

    /*
     * Quarantines
     */
    pub static ref BLOB_QUARANTINE_SIZE: Result<IntGauge> = try_create_int_gauge(
        "beacon_blob_quarantine_size",
        "Count of blob sidecars held pending their block"
    );
    pub static ref BLOCK_QUARANTINE_SIZE: Result<IntGauge> = try_create_int_gauge(
        "beacon_block_quarantine_size",
        "Count of blocks held pending a parent or blobs"
    );

    /*
     * Head tracking
     */
    pub static ref HEAD_CHANGES: Result<IntCounter> = try_create_int_counter(
        "beacon_head_changes_total",
        "Count of canonical head updates"
    );
    pub static ref REORGS_DETECTED: Result<IntCounter> = try_create_int_counter(
        "beacon_reorgs_total",
        "Count of head changes that were not simple chain extensions"
    );
    pub static ref FINALIZED_EPOCH: Result<IntGauge> = try_create_int_gauge(
        "beacon_finalized_epoch",
        "Most recent finalized epoch"
    );
    pub static ref HEAD_SLOT: Result<IntGauge> =
        try_create_int_gauge("beacon_head_slot", "Slot of the canonical head");

    /*
     * Action tracker
     */
    pub static ref ACTION_TRACKER_SHUFFLING_UPDATES: Result<IntCounter> = try_create_int_counter(
        "beacon_action_tracker_shuffling_updates_total",
        "Count of next-epoch duty updates served from the shuffling alone"
    );
    pub static ref ACTION_TRACKER_EPOCH_REF_UPDATES: Result<IntCounter> = try_create_int_counter(
        "beacon_action_tracker_epoch_ref_updates_total",
        "Count of next-epoch duty updates that rebuilt a full epoch reference"
    );

    /*
     * Event bus
     */
    pub static ref EVENT_BUS_LAGGED_TOTAL: Result<IntCounter> = try_create_int_counter(
        "beacon_event_bus_lagged_events_total",
        "Count of events dropped because a subscriber was too slow"
    );

    /*
     * Pruning
     */
    pub static ref HISTORY_PRUNE_TIMES: Result<Histogram> = try_create_histogram(
        "beacon_history_prune_seconds",
        "Time spent pruning old blocks from the database"
    );
    pub static ref BLOBS_PRUNED: Result<IntCounter> = try_create_int_counter(
        "beacon_blobs_pruned_total",
        "Count of blob sidecar sets removed by pruning"
    );
}
