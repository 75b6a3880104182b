use crate::metrics;
use slog::{trace, Logger};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use types::{Attestation, Checkpoint, Epoch, Hash256, Slot};

/// Capacity of each event channel before the oldest event is overwritten.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub slot: Slot,
    pub block: Hash256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadEvent {
    pub slot: Slot,
    pub block: Hash256,
    pub previous_head: Hash256,
    pub epoch_transition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
    pub slot: Slot,
    pub depth: u64,
    pub old_head: Hash256,
    pub new_head: Hash256,
    pub common_ancestor: Hash256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedEvent {
    pub checkpoint: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalityUpdateEvent {
    pub finalized: Checkpoint,
    pub signature_slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticUpdateEvent {
    pub attested_block: Hash256,
    pub signature_slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionEvent {
    pub slot: Slot,
    pub subcommittee_index: u64,
    pub beacon_block_root: Hash256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub validator_index: u64,
    pub epoch: Epoch,
}

/// Fan-out channels feeding REST event-stream subscribers.
///
/// Producers never block: each channel is a fixed-size ring and a slow
/// subscriber observes `RecvError::Lagged(n)` after the `n` oldest events
/// were overwritten. We deliberately prefer losing old events over applying
/// backpressure to the slot loop; the dropped count is surfaced through the
/// subscriber side and `EVENT_BUS_LAGGED_TOTAL`.
pub struct EventBus {
    block_tx: Sender<BlockEvent>,
    head_tx: Sender<HeadEvent>,
    reorg_tx: Sender<ReorgEvent>,
    finalized_tx: Sender<FinalizedEvent>,
    finality_update_tx: Sender<FinalityUpdateEvent>,
    optimistic_update_tx: Sender<OptimisticUpdateEvent>,
    attestation_tx: Sender<Attestation>,
    contribution_tx: Sender<ContributionEvent>,
    exit_tx: Sender<ExitEvent>,
    log: Logger,
}

macro_rules! channel_api {
    ($register: ident, $emit: ident, $field: ident, $event: ty) => {
        pub fn $register(&self) -> Receiver<$event> {
            self.$field.subscribe()
        }

        pub fn $emit(&self, event: $event) {
            if self.$field.receiver_count() > 0 {
                let _ = self.$field.send(event);
            } else {
                trace!(self.log, "No subscribers for event"; "channel" => stringify!($field));
            }
        }
    };
}

impl EventBus {
    pub fn new(capacity: usize, log: Logger) -> Self {
        Self {
            block_tx: broadcast::channel(capacity).0,
            head_tx: broadcast::channel(capacity).0,
            reorg_tx: broadcast::channel(capacity).0,
            finalized_tx: broadcast::channel(capacity).0,
            finality_update_tx: broadcast::channel(capacity).0,
            optimistic_update_tx: broadcast::channel(capacity).0,
            attestation_tx: broadcast::channel(capacity).0,
            contribution_tx: broadcast::channel(capacity).0,
            exit_tx: broadcast::channel(capacity).0,
            log,
        }
    }

    channel_api!(subscribe_blocks, on_new_block, block_tx, BlockEvent);
    channel_api!(subscribe_head, on_new_head, head_tx, HeadEvent);
    channel_api!(subscribe_reorgs, on_reorg, reorg_tx, ReorgEvent);
    channel_api!(subscribe_finalized, on_finalization, finalized_tx, FinalizedEvent);
    channel_api!(
        subscribe_finality_updates,
        on_finality_update,
        finality_update_tx,
        FinalityUpdateEvent
    );
    channel_api!(
        subscribe_optimistic_updates,
        on_optimistic_update,
        optimistic_update_tx,
        OptimisticUpdateEvent
    );
    channel_api!(subscribe_attestations, on_attestation, attestation_tx, Attestation);
    channel_api!(
        subscribe_contributions,
        on_contribution,
        contribution_tx,
        ContributionEvent
    );
    channel_api!(subscribe_exits, on_exit, exit_tx, ExitEvent);

    /// Record that a subscriber observed lost events. Called by stream
    /// handlers when they hit `RecvError::Lagged`.
    pub fn note_lagged(&self, dropped: u64) {
        metrics::inc_counter_by(&metrics::EVENT_BUS_LAGGED_TOTAL, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::o;
    use tokio::sync::broadcast::error::RecvError;

    fn bus(capacity: usize) -> EventBus {
        EventBus::new(capacity, Logger::root(slog::Discard, o!()))
    }

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = bus(DEFAULT_CHANNEL_CAPACITY);
        let mut a = bus.subscribe_blocks();
        let mut b = bus.subscribe_blocks();
        let event = BlockEvent {
            slot: Slot::new(1),
            block: Hash256::repeat_byte(1),
        };
        bus.on_new_block(event.clone());
        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest() {
        let bus = bus(2);
        let mut rx = bus.subscribe_blocks();
        for i in 0..4u8 {
            bus.on_new_block(BlockEvent {
                slot: Slot::new(i as u64),
                block: Hash256::repeat_byte(i),
            });
        }
        // The two oldest were overwritten.
        match rx.recv().await {
            Err(RecvError::Lagged(n)) => assert_eq!(n, 2),
            other => panic!("expected lag, got {other:?}"),
        }
        assert_eq!(rx.recv().await.unwrap().slot, Slot::new(2));
        assert_eq!(rx.recv().await.unwrap().slot, Slot::new(3));
    }

    #[tokio::test]
    async fn send_without_subscribers_does_not_panic() {
        let bus = bus(2);
        bus.on_reorg(ReorgEvent {
            slot: Slot::new(1),
            depth: 1,
            old_head: Hash256::zero(),
            new_head: Hash256::zero(),
            common_ancestor: Hash256::zero(),
        });
    }
}
