use crate::blob_quarantine::BlobFetchRecord;
use crate::block_verification::BlockError;
use crate::events::{BlockEvent, FinalityUpdateEvent, FinalizedEvent, OptimisticUpdateEvent};
use crate::metrics;
use crate::state_transition::TransitionError;
use crate::store::Store;
use crate::{BeaconChain, BeaconChainTypes};
use slog::{debug, trace, warn, Logger};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use strum::IntoStaticStr;
use tokio::sync::{mpsc, oneshot};
use types::{BlobSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot};

/// Where a block entered the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BlockSource {
    Gossip,
    RangeSync,
    Lookup,
    HttpApi,
}

/// A block submitted for processing, with the channel its verdict goes back
/// on.
pub struct WorkEvent<E: EthSpec> {
    pub source: BlockSource,
    pub block: Arc<SignedBeaconBlock<E>>,
    pub blobs: Option<BlobSidecarList>,
    /// Hint that the block lies in an already-finalized range; head
    /// recomputation is deferred to the slot boundary for these.
    pub maybe_finalized: bool,
    result_tx: oneshot::Sender<Result<Hash256, BlockError>>,
}

/// Emitted towards the request manager when processing had to shelve a
/// block, and after each successful import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineNotification {
    UnknownParent {
        block_root: Hash256,
        parent_root: Hash256,
    },
    MissingBlobs(BlobFetchRecord),
    BlockImported {
        block_root: Hash256,
        slot: Slot,
    },
}

/// Cloneable submission side of the processing queue.
#[derive(Clone)]
pub struct BlockProcessorHandle<E: EthSpec> {
    tx: mpsc::Sender<WorkEvent<E>>,
    queue_capacity: usize,
}

impl<E: EthSpec> BlockProcessorHandle<E> {
    /// Submit a block and await its verdict.
    ///
    /// Returns `QueueFull` immediately when the queue is saturated; callers
    /// are expected to back off.
    pub async fn process_block(
        &self,
        source: BlockSource,
        block: Arc<SignedBeaconBlock<E>>,
        blobs: Option<BlobSidecarList>,
        maybe_finalized: bool,
    ) -> Result<Hash256, BlockError> {
        let (result_tx, result_rx) = oneshot::channel();
        self.tx
            .try_send(WorkEvent {
                source,
                block,
                blobs,
                maybe_finalized,
                result_tx,
            })
            .map_err(|_| BlockError::QueueFull)?;
        metrics::set_gauge(
            &metrics::BLOCK_QUEUE_LENGTH,
            (self.queue_capacity - self.tx.capacity()) as i64,
        );
        result_rx
            .await
            .unwrap_or_else(|_| Err(BlockError::Internal("block processor dropped".into())))
    }
}

/// The single consumer of the block queue.
///
/// Exactly one state transition runs at a time; the DAG and fork choice are
/// mutated from this task only. CPU-heavy transition work is pushed onto the
/// blocking pool while the queue waits.
pub struct BlockProcessor<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
    notification_tx: mpsc::UnboundedSender<QuarantineNotification>,
    log: Logger,
}

impl<T: BeaconChainTypes> BlockProcessor<T> {
    #[allow(clippy::type_complexity)]
    pub fn new(
        chain: Arc<BeaconChain<T>>,
    ) -> (
        Self,
        BlockProcessorHandle<T::EthSpec>,
        mpsc::Receiver<WorkEvent<T::EthSpec>>,
        mpsc::UnboundedReceiver<QuarantineNotification>,
    ) {
        let capacity = chain.config.block_queue_capacity;
        let (tx, rx) = mpsc::channel(capacity);
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let log = chain.log.clone();
        (
            Self {
                chain,
                notification_tx,
                log,
            },
            BlockProcessorHandle {
                tx,
                queue_capacity: capacity,
            },
            rx,
            notification_rx,
        )
    }

    pub async fn run(self, mut rx: mpsc::Receiver<WorkEvent<T::EthSpec>>) {
        while let Some(event) = rx.recv().await {
            let WorkEvent {
                source,
                block,
                blobs,
                maybe_finalized,
                result_tx,
            } = event;

            metrics::inc_counter(&metrics::BLOCK_PROCESSING_REQUESTS);
            let timer = metrics::start_timer(&metrics::BLOCK_PROCESSING_TIMES);
            let block_root = block.canonical_root();
            let result = self
                .process_block(source, block_root, block, blobs, maybe_finalized)
                .await;
            metrics::stop_timer(timer);

            match &result {
                Ok(root) => {
                    metrics::inc_counter(&metrics::BLOCK_PROCESSING_SUCCESSES);
                    trace!(self.log, "Block imported"; "root" => ?root, "source" => <&str>::from(source));
                    self.retry_quarantined_children(*root).await;
                }
                Err(e) => {
                    debug!(
                        self.log,
                        "Block not imported";
                        "reason" => %e,
                        "source" => <&str>::from(source),
                        "root" => ?block_root,
                    );
                }
            }
            // The submitter may have gone away (e.g. timed-out sync batch);
            // the import itself stands either way.
            let _ = result_tx.send(result);
        }
        debug!(self.log, "Block processor stopped");
    }

    async fn process_block(
        &self,
        _source: BlockSource,
        block_root: Hash256,
        block: Arc<SignedBeaconBlock<T::EthSpec>>,
        blobs: Option<BlobSidecarList>,
        maybe_finalized: bool,
    ) -> Result<Hash256, BlockError> {
        let chain = &self.chain;

        if chain.block_known(&block_root) {
            return Err(BlockError::Duplicate);
        }
        let finalized_slot = chain.finalized_slot();
        if block.slot() <= finalized_slot {
            return Err(BlockError::UnviableFork);
        }
        if !block.message.fork_name_matches(&chain.spec) {
            return Err(BlockError::Invalid {
                reason: "block fork variant does not match the schedule at its slot",
            });
        }

        let parent_root = block.parent_root();
        if !chain.block_known(&parent_root) {
            chain
                .block_quarantine
                .lock()
                .add_orphan(finalized_slot, block.clone())?;
            self.notify(QuarantineNotification::UnknownParent {
                block_root,
                parent_root,
            });
            return Err(BlockError::MissingParent(parent_root));
        }

        let blobs = self.resolve_blobs(block_root, &block, blobs, finalized_slot)?;

        let summary = {
            let state_transition = chain.state_transition.clone();
            let block = block.clone();
            let blobs = blobs.clone();
            tokio::task::spawn_blocking(move || {
                state_transition.apply_block(&block, blobs.as_ref())
            })
            .await
            .map_err(|e| BlockError::Internal(format!("state transition task failed: {e}")))?
            .map_err(|e| match e {
                TransitionError::InvalidBlock(reason) => BlockError::Invalid { reason },
                TransitionError::InvalidBlobs(reason) => BlockError::Invalid { reason },
                TransitionError::Internal(detail) => BlockError::Internal(detail),
            })?
        };

        chain
            .dag
            .write()
            .insert(block_root, block.slot(), parent_root)
            .map_err(|_| BlockError::Duplicate)?;
        chain
            .store
            .put_block(block_root, (*block).clone())
            .map_err(|e| BlockError::Internal(e.to_string()))?;
        if let Some(blobs) = &blobs {
            chain
                .store
                .put_blobs(block_root, blobs.clone())
                .map_err(|e| BlockError::Internal(e.to_string()))?;
        }

        if let Some(head_state) = summary.head_state {
            *chain.head_state.write() = head_state;
        }

        chain.event_bus.on_new_block(BlockEvent {
            slot: block.slot(),
            block: block_root,
        });

        if let Some(finalized) = summary.finalized {
            self.advance_finalization(finalized, block.slot());
        }

        if !chain.execution.is_execution_valid(block_root) {
            chain.event_bus.on_optimistic_update(OptimisticUpdateEvent {
                attested_block: block_root,
                signature_slot: block.slot(),
            });
        }

        // Finalized-range batches skip per-block head updates; the slot loop
        // recomputes at the boundary.
        if !maybe_finalized {
            chain.recompute_head_at_slot(chain.wall_slot());
        }

        self.notify(QuarantineNotification::BlockImported {
            block_root,
            slot: block.slot(),
        });
        Ok(block_root)
    }

    /// Determine the blob list a Deneb block is processed with.
    ///
    /// Caller-provided sidecars are merged into the quarantine first so a
    /// partial delivery still counts toward completeness. A block whose set
    /// is incomplete is shelved as blobless and reported as missing its
    /// dependencies; re-submission after the gap fills will succeed.
    fn resolve_blobs(
        &self,
        block_root: Hash256,
        block: &Arc<SignedBeaconBlock<T::EthSpec>>,
        blobs: Option<BlobSidecarList>,
        finalized_slot: Slot,
    ) -> Result<Option<BlobSidecarList>, BlockError> {
        let chain = &self.chain;
        if block.num_expected_blobs() == 0 || !chain.blobs_required_for_slot(block.slot()) {
            return Ok(None);
        }

        let mut quarantine = chain.blob_quarantine.lock();
        for blob in blobs.into_iter().flatten() {
            quarantine.put(blob);
        }
        if quarantine.has_blobs(block) {
            return Ok(Some(quarantine.pop_blobs(&block_root)));
        }
        let record = quarantine.fetch_record(block);
        drop(quarantine);

        chain
            .block_quarantine
            .lock()
            .add_blobless(finalized_slot, block.clone())?;
        self.notify(QuarantineNotification::MissingBlobs(record));
        Err(BlockError::MissingParent(block_root))
    }

    fn advance_finalization(&self, finalized: types::Checkpoint, signature_slot: Slot) {
        let chain = &self.chain;
        let current = chain.finalized_checkpoint();
        if finalized.epoch <= current.epoch {
            return;
        }
        let result = chain.dag.write().set_finalized_checkpoint(finalized);
        match result {
            Ok(()) => {
                chain.needs_pruning.store(true, Ordering::Relaxed);
                metrics::set_gauge(&metrics::FINALIZED_EPOCH, finalized.epoch.as_u64() as i64);
                chain
                    .event_bus
                    .on_finalization(FinalizedEvent { checkpoint: finalized });
                chain.event_bus.on_finality_update(FinalityUpdateEvent {
                    finalized,
                    signature_slot,
                });
            }
            Err(e) => {
                warn!(
                    self.log,
                    "Refusing inconsistent finalization";
                    "checkpoint" => %finalized,
                    "error" => ?e,
                );
            }
        }
    }

    /// Re-process orphans whose parent chain just became available,
    /// cascading through grandchildren.
    async fn retry_quarantined_children(&self, imported_root: Hash256) {
        let mut parents = vec![imported_root];
        while let Some(parent_root) = parents.pop() {
            let children = self.chain.block_quarantine.lock().pop_children(&parent_root);
            for child in children {
                let child_root = child.canonical_root();
                match self
                    .process_block(BlockSource::Lookup, child_root, child, None, false)
                    .await
                {
                    Ok(root) => parents.push(root),
                    Err(e) => {
                        trace!(
                            self.log,
                            "Quarantined block retry failed";
                            "root" => ?child_root,
                            "reason" => %e,
                        );
                    }
                }
            }
        }
    }

    fn notify(&self, notification: QuarantineNotification) {
        if self.notification_tx.send(notification).is_err() {
            trace!(self.log, "Quarantine notification receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;
    use types::MainnetEthSpec;

    type E = MainnetEthSpec;

    #[tokio::test]
    async fn duplicate_blocks_are_rejected() {
        let harness = TestHarness::deneb();
        let block = harness.extend_chain(1).await.pop().unwrap();
        let result = harness
            .handle
            .process_block(BlockSource::Gossip, block, None, false)
            .await;
        assert_eq!(result, Err(BlockError::Duplicate));
    }

    #[tokio::test]
    async fn orphans_are_quarantined_and_reported() {
        let harness = TestHarness::deneb();
        let missing_parent = types::Hash256::repeat_byte(0xfe);
        let orphan = harness.make_block_with_parent(missing_parent, 1);
        let result = harness
            .handle
            .process_block(BlockSource::Gossip, orphan.clone(), None, false)
            .await;
        assert_eq!(result, Err(BlockError::MissingParent(missing_parent)));

        let notification = harness.next_notification().await;
        assert_eq!(
            notification,
            QuarantineNotification::UnknownParent {
                block_root: orphan.canonical_root(),
                parent_root: missing_parent,
            }
        );
    }

    #[tokio::test]
    async fn invalid_blocks_surface_as_invalid() {
        let harness = TestHarness::deneb();
        let block = harness.make_block(1);
        harness.transition.mark_invalid(block.canonical_root());
        let result = harness
            .handle
            .process_block(BlockSource::Gossip, block, None, false)
            .await;
        assert!(matches!(result, Err(BlockError::Invalid { .. })));
    }

    #[tokio::test]
    async fn pre_finalized_blocks_are_unviable() {
        let harness = TestHarness::deneb();
        // The anchor sits at slot 0; a block "at" slot 0 can never be viable.
        let block = harness.make_block(0);
        let result = harness
            .handle
            .process_block(BlockSource::RangeSync, block, None, true)
            .await;
        assert_eq!(result, Err(BlockError::UnviableFork));
    }

    #[tokio::test]
    async fn quarantined_children_cascade_after_parent_import() {
        let harness = TestHarness::deneb();
        let parent = harness.make_block(1);
        let child = harness.make_block_with_parent(parent.canonical_root(), 2);

        // Child first: quarantined.
        let result = harness
            .handle
            .process_block(BlockSource::Gossip, child.clone(), None, false)
            .await;
        assert_eq!(
            result,
            Err(BlockError::MissingParent(parent.canonical_root()))
        );

        // Parent arrives; both blocks are imported.
        harness
            .handle
            .process_block(BlockSource::Gossip, parent.clone(), None, false)
            .await
            .unwrap();
        assert!(harness.chain.block_known(&child.canonical_root()));
        assert_eq!(harness.chain.head_root(), child.canonical_root());
    }
}
