use crate::{Checkpoint, Hash256, Signature, Slot, SubnetId};
use serde::{Deserialize, Serialize};

/// A single validator's vote for a head block and finality targets.
///
/// Aggregation structure is the consensus-spec collaborator's concern; fork
/// choice only consumes the head vote and the duty dispatcher only needs a
/// signable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub slot: Slot,
    pub committee_index: u64,
    pub beacon_block_root: Hash256,
    pub source: Checkpoint,
    pub target: Checkpoint,
    pub signature: Signature,
}

impl Attestation {
    /// The attestation subnet this message is gossiped on.
    pub fn subnet_id(
        &self,
        committees_per_slot: u64,
        slots_per_epoch: u64,
        subnet_count: u64,
    ) -> SubnetId {
        let slots_since_epoch_start = self.slot.as_u64() % slots_per_epoch;
        let committees_since_epoch_start = committees_per_slot * slots_since_epoch_start;
        SubnetId::new((committees_since_epoch_start + self.committee_index) % subnet_count)
    }
}
