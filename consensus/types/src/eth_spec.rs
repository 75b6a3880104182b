use crate::{ChainSpec, Epoch};
use std::fmt::Debug;

/// Compile-time network preset, selecting the constants that size caches and
/// gossip partitions.
pub trait EthSpec: 'static + Default + Sync + Send + Clone + Debug + PartialEq + Eq {
    fn slots_per_epoch() -> u64;

    fn max_blobs_per_block() -> usize;

    fn attestation_subnet_count() -> u64 {
        64
    }

    fn sync_committee_subnet_count() -> u64 {
        4
    }

    fn sync_committee_size() -> usize {
        512
    }

    fn epochs_per_sync_committee_period() -> Epoch;

    fn default_spec() -> ChainSpec;

    fn spec_name() -> &'static str;
}

/// Ethereum Foundation mainnet preset.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    fn slots_per_epoch() -> u64 {
        32
    }

    fn max_blobs_per_block() -> usize {
        6
    }

    fn epochs_per_sync_committee_period() -> Epoch {
        Epoch::new(256)
    }

    fn default_spec() -> ChainSpec {
        ChainSpec::mainnet()
    }

    fn spec_name() -> &'static str {
        "mainnet"
    }
}

/// Ethereum Foundation minimal preset, used in testing.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    fn slots_per_epoch() -> u64 {
        8
    }

    fn max_blobs_per_block() -> usize {
        6
    }

    fn epochs_per_sync_committee_period() -> Epoch {
        Epoch::new(8)
    }

    fn default_spec() -> ChainSpec {
        ChainSpec::minimal()
    }

    fn spec_name() -> &'static str {
        "minimal"
    }
}
