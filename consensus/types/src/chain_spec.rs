use crate::{Epoch, EthSpec, ForkName, Hash256, Slot};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime network parameters.
///
/// Unlike [`crate::EthSpec`], these may vary between networks sharing a
/// preset (fork epochs in particular).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub config_name: String,
    pub seconds_per_slot: u64,
    pub genesis_slot: Slot,

    /*
     * Fork schedule. `None` means the fork is not scheduled.
     */
    pub genesis_fork_version: [u8; 4],
    pub altair_fork_version: [u8; 4],
    pub altair_fork_epoch: Option<Epoch>,
    pub bellatrix_fork_version: [u8; 4],
    pub bellatrix_fork_epoch: Option<Epoch>,
    pub capella_fork_version: [u8; 4],
    pub capella_fork_epoch: Option<Epoch>,
    pub deneb_fork_version: [u8; 4],
    pub deneb_fork_epoch: Option<Epoch>,

    /*
     * Balance parameters, used by the action-tracker fast path.
     */
    pub max_effective_balance: u64,
    pub effective_balance_increment: u64,
    pub hysteresis_quotient: u64,
    pub hysteresis_downward_multiplier: u64,
    pub hysteresis_upward_multiplier: u64,

    /*
     * Networking.
     */
    pub maximum_gossip_clock_disparity_millis: u64,
    pub min_epochs_for_blob_sidecars_requests: u64,
    pub epochs_per_subnet_subscription: u64,
}

impl ChainSpec {
    /// The fork active at `epoch`.
    pub fn fork_name_at_epoch(&self, epoch: Epoch) -> ForkName {
        match self.deneb_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Deneb,
            _ => (),
        }
        match self.capella_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Capella,
            _ => (),
        }
        match self.bellatrix_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Merge,
            _ => (),
        }
        match self.altair_fork_epoch {
            Some(fork_epoch) if epoch >= fork_epoch => return ForkName::Altair,
            _ => (),
        }
        ForkName::Base
    }

    pub fn fork_name_at_slot<E: EthSpec>(&self, slot: Slot) -> ForkName {
        self.fork_name_at_epoch(slot.epoch(E::slots_per_epoch()))
    }

    pub fn fork_version_for_name(&self, fork_name: ForkName) -> [u8; 4] {
        match fork_name {
            ForkName::Base => self.genesis_fork_version,
            ForkName::Altair => self.altair_fork_version,
            ForkName::Merge => self.bellatrix_fork_version,
            ForkName::Capella => self.capella_fork_version,
            ForkName::Deneb => self.deneb_fork_version,
        }
    }

    pub fn fork_epoch(&self, fork_name: ForkName) -> Option<Epoch> {
        match fork_name {
            ForkName::Base => Some(Epoch::new(0)),
            ForkName::Altair => self.altair_fork_epoch,
            ForkName::Merge => self.bellatrix_fork_epoch,
            ForkName::Capella => self.capella_fork_epoch,
            ForkName::Deneb => self.deneb_fork_epoch,
        }
    }

    /// The earliest scheduled fork strictly after `epoch`, if any.
    pub fn next_fork_epoch(&self, epoch: Epoch) -> Option<(ForkName, Epoch)> {
        let mut current = self.fork_name_at_epoch(epoch);
        while let Some(next) = current.next_fork() {
            if let Some(fork_epoch) = self.fork_epoch(next) {
                if fork_epoch > epoch {
                    return Some((next, fork_epoch));
                }
            }
            current = next;
        }
        None
    }

    /// The 4-byte gossip topic prefix for `fork_name` on this network.
    pub fn fork_digest(&self, fork_name: ForkName, genesis_validators_root: Hash256) -> [u8; 4] {
        let version = self.fork_version_for_name(fork_name);
        let mut leaf = [0; 32];
        leaf[0..4].copy_from_slice(&version);
        let digest = crate::hash_concat(Hash256::from(leaf), genesis_validators_root);
        let mut result = [0; 4];
        result.copy_from_slice(&digest.as_bytes()[0..4]);
        result
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    pub fn maximum_gossip_clock_disparity(&self) -> Duration {
        Duration::from_millis(self.maximum_gossip_clock_disparity_millis)
    }

    pub fn mainnet() -> Self {
        Self {
            config_name: "mainnet".to_string(),
            seconds_per_slot: 12,
            genesis_slot: Slot::new(0),
            genesis_fork_version: [0, 0, 0, 0],
            altair_fork_version: [1, 0, 0, 0],
            altair_fork_epoch: Some(Epoch::new(74240)),
            bellatrix_fork_version: [2, 0, 0, 0],
            bellatrix_fork_epoch: Some(Epoch::new(144896)),
            capella_fork_version: [3, 0, 0, 0],
            capella_fork_epoch: Some(Epoch::new(194048)),
            deneb_fork_version: [4, 0, 0, 0],
            deneb_fork_epoch: Some(Epoch::new(269568)),
            max_effective_balance: 32_000_000_000,
            effective_balance_increment: 1_000_000_000,
            hysteresis_quotient: 4,
            hysteresis_downward_multiplier: 1,
            hysteresis_upward_multiplier: 5,
            maximum_gossip_clock_disparity_millis: 500,
            min_epochs_for_blob_sidecars_requests: 4096,
            epochs_per_subnet_subscription: 256,
        }
    }

    pub fn minimal() -> Self {
        Self {
            config_name: "minimal".to_string(),
            seconds_per_slot: 6,
            altair_fork_version: [1, 0, 0, 1],
            bellatrix_fork_version: [2, 0, 0, 1],
            capella_fork_version: [3, 0, 0, 1],
            deneb_fork_version: [4, 0, 0, 1],
            min_epochs_for_blob_sidecars_requests: 272,
            epochs_per_subnet_subscription: 4,
            ..Self::mainnet()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MainnetEthSpec;

    fn spec_with_forks(altair: u64, bellatrix: u64, capella: u64, deneb: u64) -> ChainSpec {
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(altair)),
            bellatrix_fork_epoch: Some(Epoch::new(bellatrix)),
            capella_fork_epoch: Some(Epoch::new(capella)),
            deneb_fork_epoch: Some(Epoch::new(deneb)),
            ..ChainSpec::mainnet()
        }
    }

    #[test]
    fn fork_name_at_epoch() {
        let spec = spec_with_forks(1, 2, 3, 4);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(0)), ForkName::Base);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(1)), ForkName::Altair);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(2)), ForkName::Merge);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(3)), ForkName::Capella);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(4)), ForkName::Deneb);
        assert_eq!(spec.fork_name_at_epoch(Epoch::new(999)), ForkName::Deneb);
    }

    #[test]
    fn next_fork_epoch_skips_unscheduled() {
        let mut spec = spec_with_forks(1, 2, 3, 4);
        spec.capella_fork_epoch = None;
        assert_eq!(
            spec.next_fork_epoch(Epoch::new(2)),
            Some((ForkName::Deneb, Epoch::new(4)))
        );
        assert_eq!(spec.next_fork_epoch(Epoch::new(4)), None);
    }

    #[test]
    fn fork_digests_are_distinct() {
        let spec = spec_with_forks(1, 2, 3, 4);
        let root = Hash256::repeat_byte(42);
        let digests: Vec<_> = ForkName::list_all()
            .into_iter()
            .map(|fork| spec.fork_digest(fork, root))
            .collect();
        for (i, a) in digests.iter().enumerate() {
            for b in digests.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn fork_name_at_slot_uses_epoch_boundary() {
        let spec = spec_with_forks(1, 2, 3, 4);
        let last_base_slot = Epoch::new(1).start_slot(MainnetEthSpec::slots_per_epoch()) - 1;
        assert_eq!(
            spec.fork_name_at_slot::<MainnetEthSpec>(last_base_slot),
            ForkName::Base
        );
        assert_eq!(
            spec.fork_name_at_slot::<MainnetEthSpec>(last_base_slot + 1),
            ForkName::Altair
        );
    }
}
