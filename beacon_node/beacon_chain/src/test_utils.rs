//! Test doubles and builders for beacon-chain tests.

use crate::block_processor::{BlockProcessor, BlockProcessorHandle, QuarantineNotification};
use crate::chain_config::ChainConfig;
use crate::events::EventBus;
use crate::execution::DisabledExecutionLayer;
use crate::state_transition::{HeadState, StateTransition, TransitionError, TransitionSummary};
use crate::store::{MemoryStore, Store};
use crate::{BeaconChain, BeaconChainTypes, BlockSource};
use parking_lot::Mutex;
use slog::{o, Logger};
use slot_clock::{SlotClock, TestingSlotClock};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use types::{
    BeaconBlock, BlobSidecar, ChainSpec, Checkpoint, Epoch, EthSpec, Hash256, KzgCommitment,
    KzgProof, MainnetEthSpec, ParticipationFlags, Signature, SignedBeaconBlock, Slot,
    ValidatorSnapshot,
};

/// Fixes the `BeaconChainTypes` for a given clock, store and preset.
pub struct Witness<S, St, E>(PhantomData<(S, St, E)>);

impl<S, St, E> BeaconChainTypes for Witness<S, St, E>
where
    S: SlotClock + 'static,
    St: Store<E>,
    E: EthSpec,
{
    type EthSpec = E;
    type SlotClock = S;
    type Store = St;
}

pub type TestTypes = Witness<TestingSlotClock, MemoryStore<MainnetEthSpec>, MainnetEthSpec>;

pub fn test_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

/// A state transition that accepts everything except explicitly-marked
/// roots, and surfaces whatever finalization/head-state the test staged.
pub struct TestTransition<E: EthSpec> {
    invalid: Mutex<HashSet<Hash256>>,
    pending_finalized: Mutex<Option<Checkpoint>>,
    pending_head_state: Mutex<Option<HeadState>>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> Default for TestTransition<E> {
    fn default() -> Self {
        Self {
            invalid: Mutex::new(HashSet::new()),
            pending_finalized: Mutex::new(None),
            pending_head_state: Mutex::new(None),
            _phantom: PhantomData,
        }
    }
}

impl<E: EthSpec> TestTransition<E> {
    pub fn mark_invalid(&self, root: Hash256) {
        self.invalid.lock().insert(root);
    }

    /// The next applied block will report this finalization.
    pub fn stage_finalization(&self, checkpoint: Checkpoint) {
        *self.pending_finalized.lock() = Some(checkpoint);
    }

    /// The next applied block will carry this head-state refresh.
    pub fn stage_head_state(&self, head_state: HeadState) {
        *self.pending_head_state.lock() = Some(head_state);
    }
}

impl<E: EthSpec> StateTransition<E> for TestTransition<E> {
    fn apply_block(
        &self,
        block: &SignedBeaconBlock<E>,
        _blobs: Option<&types::BlobSidecarList>,
    ) -> Result<TransitionSummary, TransitionError> {
        if self.invalid.lock().contains(&block.canonical_root()) {
            return Err(TransitionError::InvalidBlock("marked invalid by test"));
        }
        Ok(TransitionSummary {
            justified: None,
            finalized: self.pending_finalized.lock().take(),
            head_state: self.pending_head_state.lock().take(),
        })
    }
}

/// A fully-participating validator snapshot at maximum effective balance.
pub fn max_balance_validator(spec: &ChainSpec) -> ValidatorSnapshot {
    let mut participation = ParticipationFlags::empty();
    participation.add_flag(types::participation::TIMELY_SOURCE_FLAG_INDEX);
    participation.add_flag(types::participation::TIMELY_TARGET_FLAG_INDEX);
    ValidatorSnapshot {
        effective_balance: spec.max_effective_balance,
        balance: spec.max_effective_balance,
        inactivity_score: 0,
        participation,
    }
}

/// An empty block of the scheduled fork at `slot`, chained to `parent_root`.
pub fn block_at_slot<E: EthSpec>(
    spec: &ChainSpec,
    slot: Slot,
    parent_root: Hash256,
) -> SignedBeaconBlock<E> {
    block_at_slot_with_proposer(spec, slot, parent_root, slot.as_u64() % 64)
}

pub fn block_at_slot_with_proposer<E: EthSpec>(
    spec: &ChainSpec,
    slot: Slot,
    parent_root: Hash256,
    proposer_index: u64,
) -> SignedBeaconBlock<E> {
    let mut message = BeaconBlock::empty_at_slot(spec, slot);
    match &mut message {
        BeaconBlock::Base(inner) => {
            inner.parent_root = parent_root;
            inner.proposer_index = proposer_index;
        }
        BeaconBlock::Altair(inner) => {
            inner.parent_root = parent_root;
            inner.proposer_index = proposer_index;
        }
        BeaconBlock::Merge(inner) => {
            inner.parent_root = parent_root;
            inner.proposer_index = proposer_index;
        }
        BeaconBlock::Capella(inner) => {
            inner.parent_root = parent_root;
            inner.proposer_index = proposer_index;
        }
        BeaconBlock::Deneb(inner) => {
            inner.parent_root = parent_root;
            inner.proposer_index = proposer_index;
        }
    }
    SignedBeaconBlock::from_block(message, Signature::empty())
}

/// A Deneb block carrying `commitments` distinct kzg commitments.
pub fn block_with_blobs<E: EthSpec>(
    spec: &ChainSpec,
    slot: Slot,
    parent_root: Hash256,
    commitments: usize,
) -> SignedBeaconBlock<E> {
    let mut block = block_at_slot::<E>(spec, slot, parent_root);
    match &mut block.message {
        BeaconBlock::Deneb(inner) => {
            inner.blob_kzg_commitments = (0..commitments)
                .map(|i| KzgCommitment([i as u8 + 1; 48]))
                .collect();
        }
        other => panic!(
            "blob-carrying blocks require the Deneb fork, got {}",
            other.fork_name()
        ),
    }
    block
}

/// Sidecars matching every commitment of `block`, in index order.
pub fn blobs_for_block<E: EthSpec>(block: &SignedBeaconBlock<E>) -> Vec<Arc<BlobSidecar>> {
    let header = block.signed_block_header();
    block
        .message
        .blob_kzg_commitments()
        .unwrap_or(&[])
        .iter()
        .enumerate()
        .map(|(index, commitment)| {
            Arc::new(BlobSidecar {
                index: index as u64,
                blob: vec![index as u8; 32],
                kzg_commitment: *commitment,
                kzg_proof: KzgProof::empty(),
                signed_block_header: header.clone(),
            })
        })
        .collect()
}

/// A chain with an in-memory store, a manual clock and a spawned block
/// processor.
pub struct TestHarness {
    pub chain: Arc<BeaconChain<TestTypes>>,
    pub handle: BlockProcessorHandle<MainnetEthSpec>,
    pub transition: Arc<TestTransition<MainnetEthSpec>>,
    pub clock: TestingSlotClock,
    pub anchor_root: Hash256,
    notifications:
        tokio::sync::Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<QuarantineNotification>>>,
}

impl TestHarness {
    /// All forks active from genesis, with a short blob-retention window.
    pub fn deneb() -> Self {
        Self::deneb_with_anchor(Slot::new(0))
    }

    pub fn deneb_with_anchor(anchor_slot: Slot) -> Self {
        let spec = ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            min_epochs_for_blob_sidecars_requests: 4,
            ..ChainSpec::mainnet()
        };
        Self::new(spec, anchor_slot)
    }

    pub fn new(spec: ChainSpec, anchor_slot: Slot) -> Self {
        Self::new_with_execution(spec, anchor_slot, Arc::new(DisabledExecutionLayer))
    }

    pub fn new_with_execution(
        spec: ChainSpec,
        anchor_slot: Slot,
        execution: Arc<dyn crate::ExecutionLayer>,
    ) -> Self {
        let log = test_logger();
        let clock = TestingSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            Duration::from_secs(spec.seconds_per_slot),
        );
        clock.set_slot(anchor_slot.as_u64() + 1);
        let anchor_root = Hash256::repeat_byte(0x01);
        let transition = Arc::new(TestTransition::default());
        let event_bus = Arc::new(EventBus::new(
            crate::events::DEFAULT_CHANNEL_CAPACITY,
            log.clone(),
        ));
        let chain = Arc::new(BeaconChain::<TestTypes>::new(
            spec,
            ChainConfig::default(),
            clock.clone(),
            Arc::new(MemoryStore::new()),
            Hash256::repeat_byte(0x42),
            anchor_root,
            anchor_slot,
            transition.clone(),
            execution,
            event_bus,
            log,
        ));
        let (processor, handle, work_rx, notification_rx) = BlockProcessor::new(chain.clone());
        tokio::spawn(processor.run(work_rx));
        Self {
            chain,
            handle,
            transition,
            clock,
            anchor_root,
            notifications: tokio::sync::Mutex::new(Some(notification_rx)),
        }
    }

    /// Install `count` fully-participating validators in the head state, so
    /// fork choice has balances to weigh.
    pub fn set_validators(&self, count: usize) {
        let mut head_state = self.chain.head_state.write();
        head_state.validators = (0..count)
            .map(|_| max_balance_validator(&self.chain.spec))
            .collect();
    }

    pub fn make_block(&self, slot: u64) -> Arc<SignedBeaconBlock<MainnetEthSpec>> {
        self.make_block_with_parent(self.chain.head_root(), slot)
    }

    pub fn make_block_with_parent(
        &self,
        parent_root: Hash256,
        slot: u64,
    ) -> Arc<SignedBeaconBlock<MainnetEthSpec>> {
        Arc::new(block_at_slot(&self.chain.spec, Slot::new(slot), parent_root))
    }

    /// Extend the canonical chain by `count` blocks, one per slot.
    pub async fn extend_chain(&self, count: usize) -> Vec<Arc<SignedBeaconBlock<MainnetEthSpec>>> {
        let mut blocks = vec![];
        for _ in 0..count {
            let slot = self.chain.head_slot().as_u64() + 1;
            if self.clock.now().map_or(true, |now| now.as_u64() < slot) {
                self.clock.set_slot(slot);
            }
            let block = self.make_block(slot);
            self.handle
                .process_block(BlockSource::Gossip, block.clone(), None, false)
                .await
                .expect("harness blocks are valid");
            blocks.push(block);
        }
        blocks
    }

    pub async fn next_notification(&self) -> QuarantineNotification {
        self.notifications
            .lock()
            .await
            .as_mut()
            .expect("notifications were taken by another consumer")
            .recv()
            .await
            .expect("notification channel open")
    }

    /// Hand the notification stream to a request manager under test.
    pub async fn take_notifications(
        &self,
    ) -> tokio::sync::mpsc::UnboundedReceiver<QuarantineNotification> {
        self.notifications
            .lock()
            .await
            .take()
            .expect("notifications already taken")
    }
}
