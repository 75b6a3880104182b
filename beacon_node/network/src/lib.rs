pub mod gossip;
pub mod metrics;
pub mod service;
pub mod sync;

pub use gossip::controller::GossipController;
pub use gossip::topics::{GossipKind, GossipTopic};
pub use service::{NetworkCommand, PeerAction, PeerId, RpcBlock, RpcError, SyncNetwork};
pub use sync::block_lookups::RequestManager;
pub use sync::range_sync::{BackfillVerifier, RangeBlockVerifier, RangeSync, SyncDirection};
pub use sync::{SyncState, SyncStatus};
