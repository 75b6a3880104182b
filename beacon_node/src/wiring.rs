//! Stand-ins for the externally-provided collaborators, and the glue that
//! assembles a node around them.
//!
//! Deployments link the real state-transition, database, execution-layer
//! and libp2p crates and implement the same traits; everything in this
//! module keeps the node runnable without them.

use beacon_chain::state_transition::{StateTransition, TransitionError, TransitionSummary};
use beacon_chain::store::MemoryStore;
use beacon_chain::BeaconChainTypes;
use network::{PeerAction, PeerId, RpcBlock, RpcError, SyncNetwork};
use slot_clock::SystemTimeSlotClock;
use std::marker::PhantomData;
use std::sync::Arc;
use types::{
    BlobIdentifier, BlobSidecar, BlobSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot,
};

/// Fixes the runtime types for the production wiring.
pub struct ProductionTypes<E>(PhantomData<E>);

impl<E: EthSpec> BeaconChainTypes for ProductionTypes<E> {
    type EthSpec = E;
    type SlotClock = SystemTimeSlotClock;
    type Store = MemoryStore<E>;
}

/// Accepts every structurally-sound block.
///
/// The wiring point for the consensus-spec crate: full state transition,
/// signature batches and KZG verification replace this in deployments.
pub struct PassthroughStateTransition;

impl<E: EthSpec> StateTransition<E> for PassthroughStateTransition {
    fn apply_block(
        &self,
        _block: &SignedBeaconBlock<E>,
        _blobs: Option<&BlobSidecarList>,
    ) -> Result<TransitionSummary, TransitionError> {
        Ok(TransitionSummary::default())
    }
}

/// A peer-request provider with no peers.
///
/// The wiring point for the libp2p substrate; until one is attached every
/// request reports `NoPeers` and the sync managers idle.
pub struct DisconnectedNetwork;

impl<E: EthSpec> SyncNetwork<E> for DisconnectedNetwork {
    async fn blocks_by_range(
        &self,
        _start_slot: Slot,
        _count: u64,
    ) -> Result<Vec<RpcBlock<E>>, RpcError> {
        Err(RpcError::NoPeers)
    }

    async fn block_by_root(&self, _block_root: Hash256) -> Result<Option<RpcBlock<E>>, RpcError> {
        Err(RpcError::NoPeers)
    }

    async fn blobs_by_root(
        &self,
        _blob_ids: Vec<BlobIdentifier>,
    ) -> Result<Vec<Arc<BlobSidecar>>, RpcError> {
        Err(RpcError::NoPeers)
    }

    fn report_peer(&self, _peer: PeerId, _action: PeerAction, _reason: &'static str) {}
}
