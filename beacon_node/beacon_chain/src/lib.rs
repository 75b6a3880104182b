pub mod action_tracker;
pub mod beacon_chain;
pub mod blob_quarantine;
pub mod block_processor;
pub mod block_quarantine;
pub mod block_verification;
pub mod canonical_head;
pub mod chain_config;
pub mod chain_dag;
pub mod events;
pub mod execution;
pub mod fork_choice;
pub mod metrics;
pub mod state_transition;
pub mod store;
pub mod test_utils;

use slot_clock::SlotClock;
use store::Store;
use types::EthSpec;

pub use crate::beacon_chain::{BeaconChain, HeadInfo};
pub use action_tracker::{ActionTracker, UpdateSource};
pub use blob_quarantine::{BlobFetchRecord, BlobQuarantine};
pub use block_processor::{
    BlockProcessor, BlockProcessorHandle, BlockSource, QuarantineNotification,
};
pub use block_quarantine::BlockQuarantine;
pub use block_verification::BlockError;
pub use chain_config::{ChainConfig, ForkChoiceVersion, HistoryMode};
pub use events::EventBus;
pub use execution::{ExecutionLayer, PayloadStatus, ValidatorRegistration};
pub use fork_choice::ForkChoice;
pub use state_transition::{HeadState, Shuffling, StateTransition, TransitionError, TransitionSummary};

/// The types a beacon chain is instantiated over, fixing the network preset,
/// the clock and the database backend in one place.
pub trait BeaconChainTypes: Send + Sync + 'static {
    type EthSpec: EthSpec;
    type SlotClock: SlotClock + 'static;
    type Store: Store<Self::EthSpec>;
}
