use std::collections::HashMap;
use std::sync::Arc;
use types::{
    BlobSidecarList, Checkpoint, Epoch, EthSpec, Hash256, SignedBeaconBlock, Slot,
    ValidatorSnapshot,
};

/// The ordering of active validators for one epoch, sufficient for duty and
/// proposer computation without the full state.
#[derive(Debug, Clone, PartialEq)]
pub struct Shuffling {
    pub epoch: Epoch,
    /// Active validator indices in shuffled order.
    pub active_validators: Arc<Vec<u64>>,
    /// The block root the shuffling was decided by; identical inputs yield
    /// identical shufflings.
    pub decision_root: Hash256,
}

impl Shuffling {
    /// The proposer for `slot`, derived from the shuffled ordering.
    pub fn proposer_for_slot(&self, slot: Slot, slots_per_epoch: u64) -> Option<u64> {
        if self.active_validators.is_empty() {
            return None;
        }
        let offset = (slot % slots_per_epoch) as usize;
        let digest = types::hash_concat(types::uint_to_leaf(slot.as_u64()), self.decision_root);
        let pick = u64::from_le_bytes(digest.as_bytes()[0..8].try_into().expect("8 bytes"));
        let position = (pick as usize + offset) % self.active_validators.len();
        self.active_validators.get(position).copied()
    }

    /// Proposers for every slot of the epoch.
    pub fn proposers(&self, slots_per_epoch: u64) -> Vec<(Slot, u64)> {
        self.epoch
            .slot_iter(slots_per_epoch)
            .filter_map(|slot| self.proposer_for_slot(slot, slots_per_epoch).map(|v| (slot, v)))
            .collect()
    }
}

/// A read-only projection of the head state, refreshed by the state
/// transition whenever the epoch advances.
#[derive(Debug, Clone, Default)]
pub struct HeadState {
    pub slot: Slot,
    pub validators: Vec<ValidatorSnapshot>,
    /// Shufflings keyed by epoch; the transition provides the current and,
    /// when cheaply derivable, the next epoch.
    pub shufflings: HashMap<Epoch, Shuffling>,
}

impl HeadState {
    pub fn current_epoch(&self, slots_per_epoch: u64) -> Epoch {
        self.slot.epoch(slots_per_epoch)
    }

    pub fn effective_balances(&self) -> Vec<u64> {
        self.validators.iter().map(|v| v.effective_balance).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The block is invalid under the state transition function.
    InvalidBlock(&'static str),
    /// A blob sidecar failed KZG verification against the block's
    /// commitments.
    InvalidBlobs(&'static str),
    /// The transition could not run; validity was not determined.
    Internal(String),
}

/// What the orchestrator learns from a successful transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionSummary {
    pub justified: Option<Checkpoint>,
    pub finalized: Option<Checkpoint>,
    /// A refreshed head-state projection, present when validator-set-affecting
    /// changes occurred (epoch boundary crossed).
    pub head_state: Option<HeadState>,
}

/// The consensus-spec state transition, supplied by an external crate.
///
/// Implementations are called from the block processor only, one block at a
/// time, in parent-before-child order.
pub trait StateTransition<E: EthSpec>: Send + Sync {
    fn apply_block(
        &self,
        block: &SignedBeaconBlock<E>,
        blobs: Option<&BlobSidecarList>,
    ) -> Result<TransitionSummary, TransitionError>;
}
