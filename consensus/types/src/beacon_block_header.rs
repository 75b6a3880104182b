use crate::{hash_concat, uint_to_leaf, Hash256, Signature, Slot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: u64,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

impl BeaconBlockHeader {
    /// The digest identifying the block this header commits to.
    pub fn canonical_root(&self) -> Hash256 {
        let h = hash_concat(uint_to_leaf(self.slot.as_u64()), uint_to_leaf(self.proposer_index));
        let h = hash_concat(h, self.parent_root);
        let h = hash_concat(h, self.state_root);
        hash_concat(h, self.body_root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_commits_to_every_field() {
        let header = BeaconBlockHeader {
            slot: Slot::new(1),
            proposer_index: 2,
            parent_root: Hash256::repeat_byte(3),
            state_root: Hash256::repeat_byte(4),
            body_root: Hash256::repeat_byte(5),
        };
        let base = header.canonical_root();

        let variants = [
            BeaconBlockHeader {
                slot: Slot::new(9),
                ..header.clone()
            },
            BeaconBlockHeader {
                proposer_index: 9,
                ..header.clone()
            },
            BeaconBlockHeader {
                parent_root: Hash256::repeat_byte(9),
                ..header.clone()
            },
            BeaconBlockHeader {
                state_root: Hash256::repeat_byte(9),
                ..header.clone()
            },
            BeaconBlockHeader {
                body_root: Hash256::repeat_byte(9),
                ..header.clone()
            },
        ];
        for variant in variants {
            assert_ne!(variant.canonical_root(), base);
        }
    }
}
