use crate::metrics;
use crate::service::{PeerAction, RpcBlock, SyncNetwork};
use crate::sync::{SyncState, SyncStatus};
use beacon_chain::store::Store;
use beacon_chain::{BeaconChain, BeaconChainTypes, BlockError, BlockProcessorHandle, BlockSource};
use slog::{debug, info, trace, warn, Logger};
use slot_clock::SlotClock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use types::{EthSpec, Hash256, Slot};

/// Slots per download batch.
pub const BATCH_SIZE_SLOTS: u64 = 64;
/// How close to the wall clock the head must be to count as caught up.
pub const SYNC_TOLERANCE_SLOTS: u64 = 1;
/// How often the backfiller checks whether forward sync has completed.
pub const BACKFILL_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Pause after a failed batch before retrying.
const BATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// From the head towards the wall clock.
    Forward,
    /// From the backfill pointer towards the horizon.
    Backward,
}

/// How a range-sync engine hands downloaded blocks to the chain. Forward
/// sync verifies through the block processor; backfill links headers
/// backwards into the store.
pub trait RangeBlockVerifier<E: EthSpec>: Send + Sync + 'static {
    fn verify(
        &self,
        block: RpcBlock<E>,
        maybe_finalized: bool,
    ) -> impl Future<Output = Result<Hash256, BlockError>> + Send;
}

impl<E: EthSpec> RangeBlockVerifier<E> for BlockProcessorHandle<E> {
    async fn verify(&self, rpc_block: RpcBlock<E>, maybe_finalized: bool) -> Result<Hash256, BlockError> {
        self.process_block(
            BlockSource::RangeSync,
            rpc_block.block,
            rpc_block.blobs,
            maybe_finalized,
        )
        .await
    }
}

/// Writes already-finalized history without re-running state transitions:
/// each block must be the parent of the previous one.
pub struct BackfillVerifier<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
}

impl<T: BeaconChainTypes> BackfillVerifier<T> {
    pub fn new(chain: Arc<BeaconChain<T>>) -> Self {
        Self { chain }
    }
}

impl<T: BeaconChainTypes> RangeBlockVerifier<T::EthSpec> for BackfillVerifier<T> {
    async fn verify(
        &self,
        rpc_block: RpcBlock<T::EthSpec>,
        _maybe_finalized: bool,
    ) -> Result<Hash256, BlockError> {
        let block = rpc_block.block;
        let block_root = block.canonical_root();
        let store = self.chain.store.clone();

        let expected = self.chain.backfill_expected_root();
        if let Some(expected_root) = expected {
            if block_root != expected_root {
                return Err(BlockError::Invalid {
                    reason: "backfill block does not link to the known chain",
                });
            }
        }

        store
            .put_block(block_root, (*block).clone())
            .map_err(|e| BlockError::Internal(e.to_string()))?;
        // Blobs below the data-availability window are neither requested
        // nor retained.
        if self.chain.blobs_required_for_slot(block.slot()) {
            if let Some(blobs) = rpc_block.blobs {
                store
                    .put_blobs(block_root, blobs)
                    .map_err(|e| BlockError::Internal(e.to_string()))?;
            }
        }
        self.chain
            .note_backfilled_block(block_root, block.slot(), block.parent_root());
        Ok(block_root)
    }
}

/// One direction of range sync. Forward and backward instances share this
/// engine and differ in lifecycle: the backfiller only runs once forward
/// sync reports `Synced`.
pub struct RangeSync<T: BeaconChainTypes, P, V> {
    chain: Arc<BeaconChain<T>>,
    network: Arc<P>,
    verifier: V,
    status: Arc<SyncStatus>,
    direction: SyncDirection,
    log: Logger,
}

impl<T, P, V> RangeSync<T, P, V>
where
    T: BeaconChainTypes,
    P: SyncNetwork<T::EthSpec>,
    V: RangeBlockVerifier<T::EthSpec>,
{
    pub fn new(
        chain: Arc<BeaconChain<T>>,
        network: Arc<P>,
        verifier: V,
        status: Arc<SyncStatus>,
        direction: SyncDirection,
        log: Logger,
    ) -> Self {
        Self {
            chain,
            network,
            verifier,
            status,
            direction,
            log,
        }
    }

    pub async fn run(self) {
        match self.direction {
            SyncDirection::Forward => self.run_forward().await,
            SyncDirection::Backward => self.run_backward().await,
        }
    }

    async fn run_forward(self) {
        let slot_duration = self.chain.slot_clock.slot_duration();
        loop {
            let wall_slot = self.chain.wall_slot();
            let head_slot = self.chain.head_slot();
            let distance = wall_slot.as_u64().saturating_sub(head_slot.as_u64());

            if distance <= SYNC_TOLERANCE_SLOTS {
                if self.status.is_syncing() {
                    info!(self.log, "Range sync caught up"; "head_slot" => head_slot);
                }
                self.status.set(SyncState::Synced);
                tokio::time::sleep(slot_duration).await;
                continue;
            }

            self.status.set(SyncState::Syncing {
                from: head_slot,
                to: wall_slot,
            });
            let start_slot = head_slot + 1;
            let count = distance.min(BATCH_SIZE_SLOTS);
            // Ranges entirely below the wall-clock finalized distance are
            // overwhelmingly likely to be final; the hint lets the chain
            // defer head recomputation to the slot boundary.
            let maybe_finalized = wall_slot.as_u64().saturating_sub(start_slot.as_u64())
                > 2 * T::EthSpec::slots_per_epoch();

            match self.network.blocks_by_range(start_slot, count).await {
                Ok(batch) if batch.is_empty() => {
                    trace!(self.log, "Empty range response"; "start_slot" => start_slot);
                    tokio::time::sleep(BATCH_RETRY_DELAY).await;
                }
                Ok(batch) => {
                    self.process_batch(batch, maybe_finalized).await;
                }
                Err(e) => {
                    debug!(self.log, "Range request failed"; "error" => %e, "start_slot" => start_slot);
                    self.status.set(SyncState::Stalled);
                    tokio::time::sleep(BATCH_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn process_batch(&self, batch: Vec<RpcBlock<T::EthSpec>>, maybe_finalized: bool) {
        for rpc_block in batch {
            let peer = rpc_block.peer;
            let slot = rpc_block.block.slot();
            match self.verifier.verify(rpc_block, maybe_finalized).await {
                Ok(_) => {
                    metrics::inc_counter(&metrics::SYNC_BLOCKS_IMPORTED);
                }
                Err(BlockError::Duplicate) => {}
                Err(BlockError::QueueFull) => {
                    // Backpressure: pause and re-request from the head on
                    // the next pass.
                    debug!(self.log, "Processor queue full, pausing sync");
                    tokio::time::sleep(BATCH_RETRY_DELAY).await;
                    return;
                }
                Err(e) if e.is_peer_fault() => {
                    warn!(self.log, "Invalid block in range"; "slot" => slot, "peer" => %peer, "reason" => %e);
                    self.network
                        .report_peer(peer, PeerAction::LowToleranceError, "invalid range block");
                    return;
                }
                Err(e) => {
                    // MissingParent inside a range means our head diverged
                    // from this peer's chain; restart from the new head.
                    debug!(self.log, "Range block not imported"; "slot" => slot, "reason" => %e);
                    return;
                }
            }
        }
    }

    async fn run_backward(self) {
        // Backfill only runs once the node is synced forward.
        loop {
            if self.status.is_synced() {
                break;
            }
            tokio::time::sleep(BACKFILL_POLL_INTERVAL).await;
        }

        loop {
            let backfill_slot = self.chain.backfill_slot();
            let horizon = self.chain.backfill_horizon_slot();
            if backfill_slot <= horizon {
                info!(self.log, "Backfill complete"; "oldest_slot" => backfill_slot);
                return;
            }
            self.status.set(SyncState::BackFilling {
                from: backfill_slot,
            });

            let count = (backfill_slot.as_u64() - horizon.as_u64()).min(BATCH_SIZE_SLOTS);
            let start_slot = Slot::new(backfill_slot.as_u64() - count);
            match self.network.blocks_by_range(start_slot, count).await {
                Ok(batch) => {
                    // Newest first, so each block links to the previous.
                    for rpc_block in batch.into_iter().rev() {
                        let peer = rpc_block.peer;
                        if let Err(e) = self.verifier.verify(rpc_block, true).await {
                            if e.is_peer_fault() {
                                self.network.report_peer(
                                    peer,
                                    PeerAction::LowToleranceError,
                                    "invalid backfill block",
                                );
                            }
                            debug!(self.log, "Backfill batch aborted"; "reason" => %e);
                            break;
                        }
                        metrics::inc_counter(&metrics::BACKFILL_BLOCKS_IMPORTED);
                    }
                }
                Err(e) => {
                    debug!(self.log, "Backfill request failed"; "error" => %e);
                    tokio::time::sleep(BATCH_RETRY_DELAY).await;
                }
            }
        }
    }
}
