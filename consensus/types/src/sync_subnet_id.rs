use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the gossip partitions for sync-committee messages.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncSubnetId(u64);

impl SyncSubnetId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The subcommittee subnet for a position in the sync committee.
    pub fn from_committee_position(position: usize, committee_size: usize, subnet_count: u64) -> Self {
        let subcommittee_size = committee_size / subnet_count as usize;
        Self((position / subcommittee_size) as u64)
    }
}

impl From<u64> for SyncSubnetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SyncSubnetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SyncSubnetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SyncSubnetId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_partition_evenly() {
        assert_eq!(SyncSubnetId::from_committee_position(0, 512, 4).as_u64(), 0);
        assert_eq!(SyncSubnetId::from_committee_position(127, 512, 4).as_u64(), 0);
        assert_eq!(SyncSubnetId::from_committee_position(128, 512, 4).as_u64(), 1);
        assert_eq!(SyncSubnetId::from_committee_position(511, 512, 4).as_u64(), 3);
    }
}
