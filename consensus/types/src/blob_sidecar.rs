use crate::{Hash256, SignedBeaconBlockHeader, Slot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const KZG_COMMITMENT_BYTES_LEN: usize = 48;
pub const KZG_PROOF_BYTES_LEN: usize = 48;

/// An opaque KZG commitment. Verification is performed by the consensus-spec
/// collaborator's trusted setup; the node treats these as identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KzgCommitment(#[serde(with = "serde_fixed_48")] pub [u8; KZG_COMMITMENT_BYTES_LEN]);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KzgProof(#[serde(with = "serde_fixed_48")] pub [u8; KZG_PROOF_BYTES_LEN]);

impl KzgCommitment {
    pub fn empty() -> Self {
        Self([0; KZG_COMMITMENT_BYTES_LEN])
    }

    /// Commit to this value as a 32-byte leaf.
    pub fn as_leaf(&self) -> Hash256 {
        Hash256::from(eth2_hashing::hash32_concat(&self.0[0..32], &self.0[16..48]))
    }
}

impl KzgProof {
    pub fn empty() -> Self {
        Self([0; KZG_PROOF_BYTES_LEN])
    }
}

impl fmt::Debug for KzgCommitment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KzgCommitment(0x{}…)", hex::encode(&self.0[0..4]))
    }
}

impl fmt::Debug for KzgProof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KzgProof(0x{}…)", hex::encode(&self.0[0..4]))
    }
}

/// Identifies a blob sidecar by the block carrying its commitment and its
/// position within that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobIdentifier {
    pub block_root: Hash256,
    pub index: u64,
}

/// A data-availability payload gossiped separately from its block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobSidecar {
    pub index: u64,
    pub blob: Vec<u8>,
    pub kzg_commitment: KzgCommitment,
    pub kzg_proof: KzgProof,
    pub signed_block_header: SignedBeaconBlockHeader,
}

pub type BlobSidecarList = Vec<Arc<BlobSidecar>>;

impl BlobSidecar {
    pub fn slot(&self) -> Slot {
        self.signed_block_header.message.slot
    }

    pub fn block_root(&self) -> Hash256 {
        self.signed_block_header.message.canonical_root()
    }

    pub fn block_parent_root(&self) -> Hash256 {
        self.signed_block_header.message.parent_root
    }

    pub fn proposer_index(&self) -> u64 {
        self.signed_block_header.message.proposer_index
    }

    pub fn id(&self) -> BlobIdentifier {
        BlobIdentifier {
            block_root: self.block_root(),
            index: self.index,
        }
    }
}

mod serde_fixed_48 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 48], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 48], D::Error> {
        let s = String::deserialize(deserializer)?;
        let decoded = hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)?;
        decoded
            .try_into()
            .map_err(|_| D::Error::custom("expected 48 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BeaconBlockHeader, Signature};

    fn sidecar(index: u64, slot: u64) -> BlobSidecar {
        BlobSidecar {
            index,
            blob: vec![0; 32],
            kzg_commitment: KzgCommitment::empty(),
            kzg_proof: KzgProof::empty(),
            signed_block_header: SignedBeaconBlockHeader {
                message: BeaconBlockHeader {
                    slot: Slot::new(slot),
                    proposer_index: 7,
                    parent_root: Hash256::repeat_byte(1),
                    state_root: Hash256::repeat_byte(2),
                    body_root: Hash256::repeat_byte(3),
                },
                signature: Signature::empty(),
            },
        }
    }

    #[test]
    fn id_is_stable_across_indices() {
        let a = sidecar(0, 5);
        let b = sidecar(1, 5);
        assert_eq!(a.id().block_root, b.id().block_root);
        assert_ne!(a.id(), b.id());
    }
}
