//! Types used across the beacon node.
//!
//! SSZ serialization and hash-tree-root computation belong to the external
//! consensus-spec layer; the digests produced here commit to the same fields
//! but are not wire-compatible merkleization.

pub mod attestation;
pub mod beacon_block;
pub mod beacon_block_header;
pub mod blob_sidecar;
pub mod chain_spec;
pub mod checkpoint;
pub mod eth_spec;
pub mod fork_name;
pub mod participation;
pub mod signature;
pub mod slot_epoch;
pub mod subnet_id;
pub mod sync_subnet_id;

pub use attestation::Attestation;
pub use beacon_block::{
    BeaconBlock, BeaconBlockAltair, BeaconBlockBase, BeaconBlockCapella, BeaconBlockDeneb,
    BeaconBlockMerge, SignedBeaconBlock,
};
pub use beacon_block_header::{BeaconBlockHeader, SignedBeaconBlockHeader};
pub use blob_sidecar::{BlobIdentifier, BlobSidecar, BlobSidecarList, KzgCommitment, KzgProof};
pub use chain_spec::ChainSpec;
pub use checkpoint::Checkpoint;
pub use eth_spec::{EthSpec, MainnetEthSpec, MinimalEthSpec};
pub use fork_name::ForkName;
pub use participation::{ParticipationFlags, ValidatorSnapshot};
pub use signature::Signature;
pub use slot_epoch::{Epoch, Slot};
pub use subnet_id::SubnetId;
pub use sync_subnet_id::SyncSubnetId;

pub type Hash256 = ethereum_types::H256;
pub type Address = ethereum_types::H160;

/// Fold two 32-byte values into one.
///
/// This is the digest primitive used for block and header roots. True SSZ
/// merkleization is performed by the consensus-spec collaborator; the node
/// only requires that roots are deterministic 32-byte commitments.
pub fn hash_concat(h1: Hash256, h2: Hash256) -> Hash256 {
    Hash256::from(eth2_hashing::hash32_concat(h1.as_bytes(), h2.as_bytes()))
}

/// Commit to a `u64` as a 32-byte little-endian leaf.
pub fn uint_to_leaf(value: u64) -> Hash256 {
    let mut bytes = [0; 32];
    bytes[0..8].copy_from_slice(&value.to_le_bytes());
    Hash256::from(bytes)
}
