use types::{Address, Hash256};

/// The execution layer's verdict on a payload or fork-choice update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStatus {
    Valid,
    Invalid,
    /// The execution layer has not yet validated the chain up to this
    /// payload; the beacon node proceeds optimistically.
    Syncing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRegistration {
    pub validator_index: u64,
    pub fee_recipient: Address,
    pub gas_limit: u64,
    pub timestamp: u64,
}

/// The engine-API surface the node requires of its execution client.
pub trait ExecutionLayer: Send + Sync {
    /// Inform the execution layer of the new canonical and finalized heads.
    fn notify_forkchoice_updated(&self, head: Hash256, finalized: Hash256) -> PayloadStatus;

    /// Whether the execution payload of `block_root` has been fully
    /// validated (i.e. the head is not optimistic).
    fn is_execution_valid(&self, block_root: Hash256) -> bool;

    /// Re-submit validator registrations to the external payload builder.
    /// Fire-and-forget; failures are the execution manager's to retry.
    fn register_validators(&self, registrations: Vec<ValidatorRegistration>);
}

/// An execution layer for chains that have not merged, and for tests.
#[derive(Default)]
pub struct DisabledExecutionLayer;

impl ExecutionLayer for DisabledExecutionLayer {
    fn notify_forkchoice_updated(&self, _head: Hash256, _finalized: Hash256) -> PayloadStatus {
        PayloadStatus::Valid
    }

    fn is_execution_valid(&self, _block_root: Hash256) -> bool {
        true
    }

    fn register_validators(&self, _registrations: Vec<ValidatorRegistration>) {}
}
