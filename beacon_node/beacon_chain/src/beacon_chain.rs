use crate::action_tracker::ActionTracker;
use crate::blob_quarantine::BlobQuarantine;
use crate::block_quarantine::BlockQuarantine;
use crate::canonical_head::CanonicalHead;
use crate::chain_config::{ChainConfig, HistoryMode};
use crate::chain_dag::ChainDag;
use crate::events::EventBus;
use crate::execution::ExecutionLayer;
use crate::fork_choice::ForkChoice;
use crate::metrics;
use crate::state_transition::{HeadState, StateTransition};
use crate::store::Store;
use crate::BeaconChainTypes;
use parking_lot::{Mutex, RwLock};
use slog::{debug, info, Logger};
use slot_clock::SlotClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use types::{Checkpoint, ChainSpec, Epoch, EthSpec, ForkName, Hash256, Slot};

/// A point-in-time view of the canonical head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub root: Hash256,
    pub slot: Slot,
}

/// Ties together the block DAG, fork choice, the quarantines and the
/// externally-provided state transition.
///
/// Mutation discipline: the DAG and fork choice are only written by the
/// block-processor task and the slot loop's head recomputation; everything
/// else reads snapshots.
pub struct BeaconChain<T: BeaconChainTypes> {
    pub spec: ChainSpec,
    pub config: ChainConfig,
    pub log: Logger,
    pub slot_clock: T::SlotClock,
    pub store: Arc<T::Store>,
    pub genesis_validators_root: Hash256,
    pub(crate) dag: RwLock<ChainDag>,
    pub(crate) fork_choice: RwLock<ForkChoice>,
    pub blob_quarantine: Mutex<BlobQuarantine>,
    pub block_quarantine: Mutex<BlockQuarantine<T::EthSpec>>,
    pub canonical_head: CanonicalHead,
    pub action_tracker: Mutex<ActionTracker<T::EthSpec>>,
    pub(crate) head_state: RwLock<HeadState>,
    pub state_transition: Arc<dyn StateTransition<T::EthSpec>>,
    pub execution: Arc<dyn ExecutionLayer>,
    pub event_bus: Arc<EventBus>,
    /// Set when finalization advances; consumed by the slot-end pruning step.
    pub(crate) needs_pruning: AtomicBool,
    /// The root the next (older) backfill block must have, once known.
    backfill_expected: Mutex<Option<Hash256>>,
}

impl<T: BeaconChainTypes> BeaconChain<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spec: ChainSpec,
        config: ChainConfig,
        slot_clock: T::SlotClock,
        store: Arc<T::Store>,
        genesis_validators_root: Hash256,
        anchor_root: Hash256,
        anchor_slot: Slot,
        state_transition: Arc<dyn StateTransition<T::EthSpec>>,
        execution: Arc<dyn ExecutionLayer>,
        event_bus: Arc<EventBus>,
        log: Logger,
    ) -> Self {
        let finalized = Checkpoint {
            epoch: anchor_slot.epoch(T::EthSpec::slots_per_epoch()),
            root: anchor_root,
        };
        let dag = ChainDag::new(anchor_root, anchor_slot, finalized);
        let action_tracker = ActionTracker::new(spec.clone());
        info!(
            log,
            "Beacon chain initialized";
            "anchor_root" => ?anchor_root,
            "anchor_slot" => anchor_slot,
        );
        Self {
            fork_choice: RwLock::new(ForkChoice::new(config.fork_choice_version)),
            blob_quarantine: Mutex::new(BlobQuarantine::with_default_capacity::<T::EthSpec>()),
            block_quarantine: Mutex::new(BlockQuarantine::new(config.block_quarantine_capacity)),
            canonical_head: CanonicalHead::new(anchor_root, anchor_slot),
            action_tracker: Mutex::new(action_tracker),
            head_state: RwLock::new(HeadState {
                slot: anchor_slot,
                ..Default::default()
            }),
            dag: RwLock::new(dag),
            spec,
            config,
            slot_clock,
            store,
            genesis_validators_root,
            state_transition,
            execution,
            event_bus,
            needs_pruning: AtomicBool::new(false),
            backfill_expected: Mutex::new(None),
            log,
        }
    }

    /// The wall-clock slot, clamped to genesis before the chain starts.
    pub fn wall_slot(&self) -> Slot {
        self.slot_clock.now().unwrap_or(self.spec.genesis_slot)
    }

    pub fn head(&self) -> HeadInfo {
        self.canonical_head.cached_head()
    }

    pub fn head_root(&self) -> Hash256 {
        self.head().root
    }

    pub fn head_slot(&self) -> Slot {
        self.head().slot
    }

    /// Number of slots the head lags the wall clock.
    pub fn head_distance(&self) -> u64 {
        self.wall_slot()
            .as_u64()
            .saturating_sub(self.head_slot().as_u64())
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.dag.read().finalized_checkpoint()
    }

    pub fn finalized_slot(&self) -> Slot {
        self.dag.read().finalized_slot()
    }

    pub fn backfill_slot(&self) -> Slot {
        self.dag.read().backfill_slot()
    }

    /// The oldest slot backfill needs to reach.
    pub fn backfill_horizon_slot(&self) -> Slot {
        self.dag.read().horizon_slot()
    }

    pub fn set_backfill_horizon(&self, slot: Slot) {
        self.dag.write().set_horizon_slot(slot);
    }

    /// The root the next backfill block must carry to link into the stored
    /// chain. `None` until the first backfilled block establishes the chain.
    pub fn backfill_expected_root(&self) -> Option<Hash256> {
        *self.backfill_expected.lock()
    }

    /// Move the backfill pointer down past a stored block.
    pub fn note_backfilled_block(&self, _root: Hash256, slot: Slot, parent_root: Hash256) {
        self.dag.write().set_backfill_slot(slot);
        *self.backfill_expected.lock() = Some(parent_root);
    }

    pub fn fork_name_at_wall_slot(&self) -> ForkName {
        self.spec.fork_name_at_slot::<T::EthSpec>(self.wall_slot())
    }

    pub fn block_known(&self, root: &Hash256) -> bool {
        self.dag.read().contains(root)
    }

    pub fn is_descendant(&self, ancestor: &Hash256, descendant: &Hash256) -> bool {
        self.dag.read().is_descendant(ancestor, descendant)
    }

    /// A clone of the head-state projection.
    pub fn head_state_snapshot(&self) -> HeadState {
        self.head_state.read().clone()
    }

    /// Record a head vote. Must only be called from the event loop (gossip
    /// validation and the duty dispatcher), never from the task pool.
    pub fn apply_attestation(&self, validator_index: u64, block_root: Hash256, slot: Slot) {
        self.fork_choice
            .write()
            .process_attestation(validator_index, block_root, slot);
    }

    /// The epoch below which blob sidecars are no longer required to be
    /// served, `None` before Deneb is scheduled.
    pub fn data_availability_boundary(&self) -> Option<Epoch> {
        let deneb_epoch = self.spec.deneb_fork_epoch?;
        let current_epoch = self.wall_slot().epoch(T::EthSpec::slots_per_epoch());
        Some(std::cmp::max(
            deneb_epoch,
            current_epoch.saturating_sub(self.spec.min_epochs_for_blob_sidecars_requests),
        ))
    }

    /// Whether blobs must be retrieved for a block at `slot`.
    pub fn blobs_required_for_slot(&self, slot: Slot) -> bool {
        let epoch = slot.epoch(T::EthSpec::slots_per_epoch());
        self.data_availability_boundary()
            .map_or(false, |boundary| epoch >= boundary)
    }

    /// Pre-stage state the next slot will need: build the shuffling for the
    /// upcoming epoch now so boundary-crossing block processing does not
    /// construct it inline.
    pub fn advance_clearance_state(&self, next_slot: Slot) {
        let next_epoch = next_slot.epoch(T::EthSpec::slots_per_epoch());
        let mut head_state = self.head_state.write();
        if head_state.shufflings.contains_key(&next_epoch) || head_state.validators.is_empty() {
            return;
        }
        let shuffling = ActionTracker::<T::EthSpec>::epoch_ref_fallback(&head_state, next_epoch);
        head_state.shufflings.insert(next_epoch, shuffling);
    }

    /// Prune the DAG, fork choice and quarantines down to the finalized
    /// block, if finalization advanced since the last call. Cheap no-op
    /// otherwise.
    pub fn prune_state_caches_and_fork_choice(&self) {
        if !self.needs_pruning.swap(false, Ordering::Relaxed) {
            return;
        }
        let mut dag = self.dag.write();
        let removed = dag.prune();
        let finalized_slot = dag.finalized_slot();
        self.fork_choice.write().prune(&dag);
        drop(dag);
        self.block_quarantine.lock().prune(finalized_slot);
        debug!(
            self.log,
            "Pruned non-finalized branches";
            "removed_blocks" => removed.len(),
            "finalized_slot" => finalized_slot,
        );
    }

    /// Delete old blocks from the store. Runs on the blocking pool since the
    /// first pass after a restart can take a while.
    pub fn prune_history(&self) -> Result<usize, crate::store::StoreError> {
        if self.config.history_mode != HistoryMode::Prune {
            return Ok(0);
        }
        let timer = metrics::start_timer(&metrics::HISTORY_PRUNE_TIMES);
        let horizon = self.dag.read().horizon_slot();
        let keep_from = std::cmp::min(self.finalized_slot(), horizon.max(Slot::new(0)));
        let removed = self.store.prune_history(keep_from)?;
        metrics::stop_timer(timer);
        Ok(removed)
    }

    /// Delete expired blob sidecars once per epoch boundary.
    ///
    /// Sidecars older than `current_epoch - MIN_EPOCHS_FOR_BLOB_SIDECARS_REQUESTS - 1`
    /// are outside the serving window; nothing is deleted before that window
    /// clears the Deneb fork epoch.
    pub fn prune_blobs(&self, slot: Slot) -> Result<usize, crate::store::StoreError> {
        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let Some(deneb_epoch) = self.spec.deneb_fork_epoch else {
            return Ok(0);
        };
        if slot % slots_per_epoch != 0 {
            return Ok(0);
        }
        let epoch = slot.epoch(slots_per_epoch);
        let cutoff = epoch
            .saturating_sub(self.spec.min_epochs_for_blob_sidecars_requests)
            .saturating_sub(1u64);
        if cutoff < deneb_epoch {
            return Ok(0);
        }
        // `cutoff` is the newest epoch to delete; the store keeps everything
        // at or above the boundary it is given.
        let removed = self.store.prune_blobs(cutoff + 1)?;
        if removed > 0 {
            metrics::inc_counter_by(&metrics::BLOBS_PRUNED, removed as u64);
            debug!(self.log, "Pruned expired blob sidecars"; "removed" => removed, "cutoff_epoch" => cutoff);
        }
        Ok(removed)
    }
}
