//! The boundary to the libp2p/discv5 substrate.
//!
//! The controller and sync managers never touch sockets: subscription and
//! ENR changes leave as [`NetworkCommand`]s, and peer requests go through
//! the [`SyncNetwork`] trait the substrate implements.

use crate::gossip::topics::GossipTopic;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use strum::IntoStaticStr;
use types::{BlobIdentifier, BlobSidecar, BlobSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot, SubnetId, SyncSubnetId};

/// An opaque peer identity assigned by the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// How severely a misbehaving peer should be penalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
pub enum PeerAction {
    /// Disconnect and ban.
    Fatal,
    /// Significant score penalty.
    LowToleranceError,
    /// Moderate score penalty.
    MidToleranceError,
    /// Minor score penalty.
    HighToleranceError,
}

/// Instructions for the gossip substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCommand {
    Subscribe(GossipTopic),
    Unsubscribe(GossipTopic),
    /// Replace the `attnets` bitfield advertised in the node's ENR.
    UpdateEnrAttnets(BTreeSet<SubnetId>),
    /// Replace the `syncnets` bitfield advertised in the node's ENR.
    UpdateEnrSyncnets(BTreeSet<SyncSubnetId>),
    Publish(GossipTopic),
    ReportPeer(PeerId, PeerAction, &'static str),
}

/// A block downloaded from a peer, with any coupled sidecars.
#[derive(Debug, Clone)]
pub struct RpcBlock<E: EthSpec> {
    pub peer: PeerId,
    pub block: Arc<SignedBeaconBlock<E>>,
    pub blobs: Option<BlobSidecarList>,
}

#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum RpcError {
    NoPeers,
    Timeout,
    Disconnected,
    InvalidResponse(&'static str),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::InvalidResponse(detail) => write!(f, "InvalidResponse({detail})"),
            other => write!(f, "{}", <&str>::from(other)),
        }
    }
}

/// Peer request/response as provided by the networking substrate.
///
/// Peer selection, retries against other peers and stream handling live
/// behind this trait; callers see one logical request.
pub trait SyncNetwork<E: EthSpec>: Send + Sync + 'static {
    /// Blocks in `[start_slot, start_slot + count)`, ascending, with blob
    /// sidecars coupled for slots inside the data-availability window.
    fn blocks_by_range(
        &self,
        start_slot: Slot,
        count: u64,
    ) -> impl Future<Output = Result<Vec<RpcBlock<E>>, RpcError>> + Send;

    fn block_by_root(
        &self,
        block_root: Hash256,
    ) -> impl Future<Output = Result<Option<RpcBlock<E>>, RpcError>> + Send;

    fn blobs_by_root(
        &self,
        blob_ids: Vec<BlobIdentifier>,
    ) -> impl Future<Output = Result<Vec<Arc<BlobSidecar>>, RpcError>> + Send;

    fn report_peer(&self, peer: PeerId, action: PeerAction, reason: &'static str);
}
