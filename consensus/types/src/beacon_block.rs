use crate::{
    hash_concat, uint_to_leaf, BeaconBlockHeader, ChainSpec, EthSpec, ForkName, Hash256,
    KzgCommitment, Signature, SignedBeaconBlockHeader, Slot,
};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// A beacon block, tagged by the consensus fork its slot falls in.
///
/// Dispatch is by exhaustive match; a block whose variant disagrees with the
/// fork schedule at its slot is rejected at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "E: EthSpec", tag = "version", rename_all = "lowercase")]
pub enum BeaconBlock<E: EthSpec> {
    Base(BeaconBlockBase<E>),
    Altair(BeaconBlockAltair<E>),
    Merge(BeaconBlockMerge<E>),
    Capella(BeaconBlockCapella<E>),
    Deneb(BeaconBlockDeneb<E>),
}

macro_rules! beacon_block_variant {
    ($name: ident, { $($extra_field: ident : $extra_type: ty),* }) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(bound = "E: EthSpec")]
        pub struct $name<E: EthSpec> {
            pub slot: Slot,
            pub proposer_index: u64,
            pub parent_root: Hash256,
            pub state_root: Hash256,
            pub graffiti: Hash256,
            $(pub $extra_field: $extra_type,)*
            #[serde(skip)]
            pub _phantom: PhantomData<E>,
        }
    };
}

beacon_block_variant!(BeaconBlockBase, {});
beacon_block_variant!(BeaconBlockAltair, { sync_aggregate_root: Hash256 });
beacon_block_variant!(BeaconBlockMerge, {
    sync_aggregate_root: Hash256,
    execution_payload_root: Hash256
});
beacon_block_variant!(BeaconBlockCapella, {
    sync_aggregate_root: Hash256,
    execution_payload_root: Hash256,
    bls_to_execution_changes_root: Hash256
});
beacon_block_variant!(BeaconBlockDeneb, {
    sync_aggregate_root: Hash256,
    execution_payload_root: Hash256,
    bls_to_execution_changes_root: Hash256,
    blob_kzg_commitments: Vec<KzgCommitment>
});

/// Match over every variant, binding the inner struct's common fields.
macro_rules! map_block_ref {
    ($self: expr, $inner: ident => $body: expr) => {
        match $self {
            BeaconBlock::Base($inner) => $body,
            BeaconBlock::Altair($inner) => $body,
            BeaconBlock::Merge($inner) => $body,
            BeaconBlock::Capella($inner) => $body,
            BeaconBlock::Deneb($inner) => $body,
        }
    };
}

impl<E: EthSpec> BeaconBlock<E> {
    pub fn slot(&self) -> Slot {
        map_block_ref!(self, inner => inner.slot)
    }

    pub fn proposer_index(&self) -> u64 {
        map_block_ref!(self, inner => inner.proposer_index)
    }

    pub fn parent_root(&self) -> Hash256 {
        map_block_ref!(self, inner => inner.parent_root)
    }

    pub fn state_root(&self) -> Hash256 {
        map_block_ref!(self, inner => inner.state_root)
    }

    pub fn fork_name(&self) -> ForkName {
        match self {
            BeaconBlock::Base(_) => ForkName::Base,
            BeaconBlock::Altair(_) => ForkName::Altair,
            BeaconBlock::Merge(_) => ForkName::Merge,
            BeaconBlock::Capella(_) => ForkName::Capella,
            BeaconBlock::Deneb(_) => ForkName::Deneb,
        }
    }

    /// `true` iff the variant agrees with the fork schedule at the block's slot.
    pub fn fork_name_matches(&self, spec: &ChainSpec) -> bool {
        spec.fork_name_at_slot::<E>(self.slot()) == self.fork_name()
    }

    /// The kzg commitments of the block body. `None` before Deneb.
    pub fn blob_kzg_commitments(&self) -> Option<&[KzgCommitment]> {
        match self {
            BeaconBlock::Deneb(inner) => Some(&inner.blob_kzg_commitments),
            _ => None,
        }
    }

    /// The number of blob sidecars this block requires for availability.
    pub fn num_expected_blobs(&self) -> usize {
        self.blob_kzg_commitments().map_or(0, |c| c.len())
    }

    pub fn body_root(&self) -> Hash256 {
        let mut root = self.graffiti_root();
        match self {
            BeaconBlock::Base(_) => {}
            BeaconBlock::Altair(inner) => {
                root = hash_concat(root, inner.sync_aggregate_root);
            }
            BeaconBlock::Merge(inner) => {
                root = hash_concat(root, inner.sync_aggregate_root);
                root = hash_concat(root, inner.execution_payload_root);
            }
            BeaconBlock::Capella(inner) => {
                root = hash_concat(root, inner.sync_aggregate_root);
                root = hash_concat(root, inner.execution_payload_root);
                root = hash_concat(root, inner.bls_to_execution_changes_root);
            }
            BeaconBlock::Deneb(inner) => {
                root = hash_concat(root, inner.sync_aggregate_root);
                root = hash_concat(root, inner.execution_payload_root);
                root = hash_concat(root, inner.bls_to_execution_changes_root);
                for commitment in &inner.blob_kzg_commitments {
                    root = hash_concat(root, commitment.as_leaf());
                }
                root = hash_concat(root, uint_to_leaf(inner.blob_kzg_commitments.len() as u64));
            }
        }
        root
    }

    fn graffiti_root(&self) -> Hash256 {
        map_block_ref!(self, inner => hash_concat(uint_to_leaf(inner.proposer_index), inner.graffiti))
    }

    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body_root(),
        }
    }

    pub fn canonical_root(&self) -> Hash256 {
        self.block_header().canonical_root()
    }

    /// An empty block of the fork active at `slot`, mostly useful in testing.
    pub fn empty_at_slot(spec: &ChainSpec, slot: Slot) -> Self {
        let common = BeaconBlockBase::<E> {
            slot,
            proposer_index: 0,
            parent_root: Hash256::zero(),
            state_root: Hash256::zero(),
            graffiti: Hash256::zero(),
            _phantom: PhantomData,
        };
        match spec.fork_name_at_slot::<E>(slot) {
            ForkName::Base => BeaconBlock::Base(common),
            ForkName::Altair => BeaconBlock::Altair(BeaconBlockAltair {
                slot,
                proposer_index: 0,
                parent_root: Hash256::zero(),
                state_root: Hash256::zero(),
                graffiti: Hash256::zero(),
                sync_aggregate_root: Hash256::zero(),
                _phantom: PhantomData,
            }),
            ForkName::Merge => BeaconBlock::Merge(BeaconBlockMerge {
                slot,
                proposer_index: 0,
                parent_root: Hash256::zero(),
                state_root: Hash256::zero(),
                graffiti: Hash256::zero(),
                sync_aggregate_root: Hash256::zero(),
                execution_payload_root: Hash256::zero(),
                _phantom: PhantomData,
            }),
            ForkName::Capella => BeaconBlock::Capella(BeaconBlockCapella {
                slot,
                proposer_index: 0,
                parent_root: Hash256::zero(),
                state_root: Hash256::zero(),
                graffiti: Hash256::zero(),
                sync_aggregate_root: Hash256::zero(),
                execution_payload_root: Hash256::zero(),
                bls_to_execution_changes_root: Hash256::zero(),
                _phantom: PhantomData,
            }),
            ForkName::Deneb => BeaconBlock::Deneb(BeaconBlockDeneb {
                slot,
                proposer_index: 0,
                parent_root: Hash256::zero(),
                state_root: Hash256::zero(),
                graffiti: Hash256::zero(),
                sync_aggregate_root: Hash256::zero(),
                execution_payload_root: Hash256::zero(),
                bls_to_execution_changes_root: Hash256::zero(),
                blob_kzg_commitments: vec![],
                _phantom: PhantomData,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "E: EthSpec")]
pub struct SignedBeaconBlock<E: EthSpec> {
    pub message: BeaconBlock<E>,
    pub signature: Signature,
}

impl<E: EthSpec> SignedBeaconBlock<E> {
    pub fn from_block(message: BeaconBlock<E>, signature: Signature) -> Self {
        Self { message, signature }
    }

    pub fn slot(&self) -> Slot {
        self.message.slot()
    }

    pub fn parent_root(&self) -> Hash256 {
        self.message.parent_root()
    }

    pub fn canonical_root(&self) -> Hash256 {
        self.message.canonical_root()
    }

    pub fn num_expected_blobs(&self) -> usize {
        self.message.num_expected_blobs()
    }

    pub fn signed_block_header(&self) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self.message.block_header(),
            signature: self.signature.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Epoch, MainnetEthSpec};

    fn deneb_spec() -> ChainSpec {
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(1)),
            bellatrix_fork_epoch: Some(Epoch::new(2)),
            capella_fork_epoch: Some(Epoch::new(3)),
            deneb_fork_epoch: Some(Epoch::new(4)),
            ..ChainSpec::mainnet()
        }
    }

    #[test]
    fn empty_block_matches_schedule() {
        let spec = deneb_spec();
        for epoch in 0..6u64 {
            let slot = Epoch::new(epoch).start_slot(MainnetEthSpec::slots_per_epoch());
            let block = BeaconBlock::<MainnetEthSpec>::empty_at_slot(&spec, slot);
            assert!(block.fork_name_matches(&spec));
        }
    }

    #[test]
    fn commitments_change_the_root() {
        let spec = deneb_spec();
        let slot = Epoch::new(4).start_slot(MainnetEthSpec::slots_per_epoch());
        let block = BeaconBlock::<MainnetEthSpec>::empty_at_slot(&spec, slot);
        let mut with_blobs = block.clone();
        if let BeaconBlock::Deneb(inner) = &mut with_blobs {
            inner.blob_kzg_commitments.push(KzgCommitment::empty());
        }
        assert_ne!(block.canonical_root(), with_blobs.canonical_root());
        assert_eq!(with_blobs.num_expected_blobs(), 1);
    }

    #[test]
    fn header_root_matches_block_root() {
        let spec = deneb_spec();
        let block = BeaconBlock::<MainnetEthSpec>::empty_at_slot(&spec, Slot::new(3));
        assert_eq!(block.block_header().canonical_root(), block.canonical_root());
    }
}
