use lazy_static::lazy_static;

pub use node_metrics::*;

lazy_static! {
    pub static ref CURRENT_SLOT: Result<IntGauge> =
        try_create_int_gauge("node_current_slot", "The slot at the wall clock");
    /// Actual second-loop sleep relative to the intended one second; values
    /// well above 1.0 surface event-loop starvation.
    pub static ref TICKS_DELAY: Result<Histogram> = try_create_histogram(
        "node_ticks_delay_seconds",
        "Observed interval of the one-second tick"
    );
    pub static ref PROCESS_THREADS: Result<IntGauge> =
        try_create_int_gauge("node_process_threads", "OS threads in this process");
    /// Seconds until the next scheduled validator action.
    pub static ref NEXT_ACTION_WAIT: Result<IntGauge> = try_create_int_gauge(
        "node_next_action_wait_seconds",
        "Seconds until the next locally-attached validator duty"
    );
    pub static ref ATTESTATIONS_PUBLISHED: Result<IntCounter> = try_create_int_counter(
        "node_attestations_published_total",
        "Attestations signed and published by attached validators"
    );
    pub static ref BLOCKS_PROPOSED: Result<IntCounter> = try_create_int_counter(
        "node_blocks_proposed_total",
        "Blocks proposed by attached validators"
    );
    pub static ref SYNC_MESSAGES_PUBLISHED: Result<IntCounter> = try_create_int_counter(
        "node_sync_messages_published_total",
        "Sync-committee messages published by attached validators"
    );
    pub static ref DUTIES_SKIPPED_SLASHABLE: Result<IntCounter> = try_create_int_counter(
        "node_duties_skipped_slashable_total",
        "Duties refused by the slashing-protection check"
    );
    pub static ref DUTIES_SKIPPED_DOPPELGANGER: Result<IntCounter> = try_create_int_counter(
        "node_duties_skipped_doppelganger_total",
        "Duties withheld while doppelganger detection listens"
    );
}
