use crate::metrics;
use crate::state_transition::{HeadState, Shuffling};
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;
use types::{
    participation::{TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
    ChainSpec, Epoch, EthSpec, ForkName, Hash256, Slot, SubnetId, SyncSubnetId,
};

/// Which computation produced a duty update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// The next epoch's shuffling alone was sufficient.
    Shuffling,
    /// A full epoch reference had to be rebuilt from the validator set.
    EpochRef,
}

/// Tracks the duties of locally-attached validators for the epoch of
/// interest: attestation subnets (aggregate and stability), proposer slots
/// and sync-committee subnets.
///
/// Touched only from the event loop; the scheduler refreshes it at each slot
/// end and the gossip controller reads it every slot.
pub struct ActionTracker<E: EthSpec> {
    spec: ChainSpec,
    local_validators: BTreeSet<u64>,
    /// The epoch the duties below were computed for.
    epoch: Epoch,
    /// Attestation duties per slot of `epoch`.
    attester_duties: BTreeMap<Slot, Vec<(u64, SubnetId)>>,
    aggregate_subnets: BTreeSet<SubnetId>,
    stability_subnets: BTreeSet<SubnetId>,
    proposer_slots: BTreeMap<Slot, u64>,
    sync_subnets: BTreeSet<SyncSubnetId>,
    /// Inputs of the last `update_actions`, for idempotence.
    last_inputs: Option<(Epoch, Hash256, usize)>,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> ActionTracker<E> {
    pub fn new(spec: ChainSpec) -> Self {
        Self {
            spec,
            local_validators: BTreeSet::new(),
            epoch: Epoch::new(0),
            attester_duties: BTreeMap::new(),
            aggregate_subnets: BTreeSet::new(),
            stability_subnets: BTreeSet::new(),
            proposer_slots: BTreeMap::new(),
            sync_subnets: BTreeSet::new(),
            last_inputs: None,
            _phantom: PhantomData,
        }
    }

    pub fn attach_validators(&mut self, indices: impl IntoIterator<Item = u64>) {
        self.local_validators.extend(indices);
        // Duties must be recomputed for the new set.
        self.last_inputs = None;
    }

    pub fn detach_validator(&mut self, index: u64) {
        self.local_validators.remove(&index);
        self.last_inputs = None;
    }

    pub fn has_validators(&self) -> bool {
        !self.local_validators.is_empty()
    }

    pub fn local_validators(&self) -> impl Iterator<Item = u64> + '_ {
        self.local_validators.iter().copied()
    }

    pub fn duty_epoch(&self) -> Epoch {
        self.epoch
    }

    /// Per-slot housekeeping: refresh the long-lived stability subnets for
    /// the epoch of `slot` and drop duties for slots that have passed.
    pub fn update_slot(&mut self, slot: Slot) {
        let epoch = slot.epoch(E::slots_per_epoch());
        self.stability_subnets = self
            .local_validators
            .iter()
            .map(|validator| {
                SubnetId::stability_subnet(
                    *validator,
                    epoch,
                    self.spec.epochs_per_subnet_subscription,
                    E::attestation_subnet_count(),
                )
            })
            .collect();
        self.attester_duties.retain(|duty_slot, _| *duty_slot >= slot);
        self.proposer_slots.retain(|duty_slot, _| *duty_slot >= slot);
    }

    /// Recompute duties for the epoch covered by `shuffling`.
    ///
    /// Idempotent: identical inputs leave the tracker untouched.
    pub fn update_actions(&mut self, shuffling: &Shuffling, proposers: &[(Slot, u64)]) {
        let inputs = (
            shuffling.epoch,
            shuffling.decision_root,
            self.local_validators.len(),
        );
        if self.last_inputs == Some(inputs) {
            return;
        }
        self.last_inputs = Some(inputs);
        self.epoch = shuffling.epoch;

        let slots_per_epoch = E::slots_per_epoch();
        let subnet_count = E::attestation_subnet_count();

        self.attester_duties.clear();
        self.aggregate_subnets.clear();
        self.sync_subnets.clear();
        for (position, validator) in shuffling.active_validators.iter().enumerate() {
            if !self.local_validators.contains(validator) {
                continue;
            }
            let duty_slot =
                shuffling.epoch.start_slot(slots_per_epoch) + (position as u64 % slots_per_epoch);
            let subnet = SubnetId::new(position as u64 % subnet_count);
            self.attester_duties
                .entry(duty_slot)
                .or_default()
                .push((*validator, subnet));
            self.aggregate_subnets.insert(subnet);

            if position < E::sync_committee_size() {
                self.sync_subnets.insert(SyncSubnetId::from_committee_position(
                    position,
                    E::sync_committee_size(),
                    E::sync_committee_subnet_count(),
                ));
            }
        }

        self.proposer_slots = proposers
            .iter()
            .filter(|(_, validator)| self.local_validators.contains(validator))
            .map(|(slot, validator)| (*slot, *validator))
            .collect();
    }

    /// Refresh duties for `next_epoch`, preferring the cheap path.
    ///
    /// The next epoch's shuffling alone suffices iff the first proposer of
    /// the next epoch demonstrably cannot change with end-of-epoch balance
    /// processing: full participation flags, maximal effective balance, zero
    /// inactivity score and a balance that cannot cross a hysteresis
    /// threshold. Any doubt forces a full epoch-reference rebuild.
    pub fn maybe_update_next_epoch(
        &mut self,
        head_state: &HeadState,
        fork: ForkName,
        next_epoch: Epoch,
    ) -> UpdateSource {
        let slots_per_epoch = E::slots_per_epoch();

        if let Some(source) = self.try_shuffling_update(head_state, fork, next_epoch) {
            return source;
        }

        let shuffling = Self::epoch_ref_fallback(head_state, next_epoch);
        let proposers = shuffling.proposers(slots_per_epoch);
        self.update_actions(&shuffling, &proposers);
        metrics::inc_counter(&metrics::ACTION_TRACKER_EPOCH_REF_UPDATES);
        UpdateSource::EpochRef
    }

    fn try_shuffling_update(
        &mut self,
        head_state: &HeadState,
        fork: ForkName,
        next_epoch: Epoch,
    ) -> Option<UpdateSource> {
        let slots_per_epoch = E::slots_per_epoch();

        if !fork.altair_enabled() {
            return None;
        }
        let shuffling = head_state.shufflings.get(&next_epoch)?;
        let first_proposer =
            shuffling.proposer_for_slot(next_epoch.start_slot(slots_per_epoch), slots_per_epoch)?;
        let proposer = head_state.validators.get(first_proposer as usize)?;

        let stable = proposer
            .participation
            .has_flag(TIMELY_SOURCE_FLAG_INDEX)
            && proposer.participation.has_flag(TIMELY_TARGET_FLAG_INDEX)
            && proposer.effective_balance == self.spec.max_effective_balance
            && head_state.current_epoch(slots_per_epoch) != Epoch::new(0)
            && proposer.inactivity_score == 0
            && proposer.balance_within_hysteresis(&self.spec);
        if !stable {
            return None;
        }

        let proposers = shuffling.proposers(slots_per_epoch);
        self.update_actions(shuffling, &proposers);
        metrics::inc_counter(&metrics::ACTION_TRACKER_SHUFFLING_UPDATES);
        Some(UpdateSource::Shuffling)
    }

    /// Rebuild an epoch reference from the validator set alone: every
    /// validator with a non-zero effective balance is active, ordered by a
    /// digest over the epoch.
    pub fn epoch_ref_fallback(head_state: &HeadState, epoch: Epoch) -> Shuffling {
        let mut active: Vec<u64> = head_state
            .validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.effective_balance > 0)
            .map(|(i, _)| i as u64)
            .collect();
        let rotation = types::uint_to_leaf(epoch.as_u64());
        active.sort_by_key(|validator| {
            types::hash_concat(types::uint_to_leaf(*validator), rotation)
        });
        Shuffling {
            epoch,
            active_validators: Arc::new(active),
            decision_root: rotation,
        }
    }

    /// Attestation subnets to be subscribed: this epoch's aggregate duties
    /// plus the long-lived per-validator stability subnets.
    pub fn subscriptions(&self) -> BTreeSet<SubnetId> {
        self.aggregate_subnets
            .union(&self.stability_subnets)
            .copied()
            .collect()
    }

    pub fn aggregate_subnets(&self) -> &BTreeSet<SubnetId> {
        &self.aggregate_subnets
    }

    pub fn stability_subnets(&self) -> &BTreeSet<SubnetId> {
        &self.stability_subnets
    }

    pub fn sync_subnets(&self) -> &BTreeSet<SyncSubnetId> {
        &self.sync_subnets
    }

    pub fn proposer_for_slot(&self, slot: Slot) -> Option<u64> {
        self.proposer_slots.get(&slot).copied()
    }

    pub fn attesters_at_slot(&self, slot: Slot) -> &[(u64, SubnetId)] {
        self.attester_duties
            .get(&slot)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{MainnetEthSpec, ParticipationFlags, ValidatorSnapshot};

    type E = MainnetEthSpec;

    fn stable_validator(spec: &ChainSpec) -> ValidatorSnapshot {
        let mut participation = ParticipationFlags::empty();
        participation.add_flag(TIMELY_SOURCE_FLAG_INDEX);
        participation.add_flag(TIMELY_TARGET_FLAG_INDEX);
        ValidatorSnapshot {
            effective_balance: spec.max_effective_balance,
            balance: spec.max_effective_balance,
            inactivity_score: 0,
            participation,
        }
    }

    fn head_state_with_shuffling(spec: &ChainSpec, validators: usize, next_epoch: Epoch) -> HeadState {
        let mut state = HeadState {
            slot: (next_epoch - 1u64).start_slot(E::slots_per_epoch()),
            validators: (0..validators).map(|_| stable_validator(spec)).collect(),
            shufflings: Default::default(),
        };
        state.shufflings.insert(
            next_epoch,
            Shuffling {
                epoch: next_epoch,
                active_validators: Arc::new((0..validators as u64).collect()),
                decision_root: Hash256::repeat_byte(7),
            },
        );
        state
    }

    fn tracker_with_all_validators(spec: &ChainSpec, count: u64) -> ActionTracker<E> {
        let mut tracker = ActionTracker::<E>::new(spec.clone());
        tracker.attach_validators(0..count);
        tracker
    }

    #[test]
    fn fast_path_taken_when_first_proposer_is_stable() {
        let spec = ChainSpec::mainnet();
        let next_epoch = Epoch::new(5);
        let state = head_state_with_shuffling(&spec, 64, next_epoch);
        let mut tracker = tracker_with_all_validators(&spec, 64);

        let source = tracker.maybe_update_next_epoch(&state, ForkName::Capella, next_epoch);
        assert_eq!(source, UpdateSource::Shuffling);
        assert_eq!(tracker.duty_epoch(), next_epoch);
    }

    #[test]
    fn fallback_when_any_condition_fails() {
        let spec = ChainSpec::mainnet();
        let next_epoch = Epoch::new(5);
        let slots_per_epoch = E::slots_per_epoch();
        let base = head_state_with_shuffling(&spec, 64, next_epoch);
        let first_proposer = base.shufflings[&next_epoch]
            .proposer_for_slot(next_epoch.start_slot(slots_per_epoch), slots_per_epoch)
            .unwrap() as usize;

        // Pre-Altair fork.
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&base, ForkName::Base, next_epoch),
            UpdateSource::EpochRef
        );

        // Shuffling unavailable.
        let mut no_shuffling = base.clone();
        no_shuffling.shufflings.clear();
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&no_shuffling, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );

        // Missing participation flag.
        let mut flagless = base.clone();
        flagless.validators[first_proposer].participation = ParticipationFlags::empty();
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&flagless, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );

        // Effective balance below maximum.
        let mut weak = base.clone();
        weak.validators[first_proposer].effective_balance -= 1;
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&weak, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );

        // Genesis epoch.
        let mut genesis = base.clone();
        genesis.slot = Slot::new(1);
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&genesis, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );

        // Non-zero inactivity score.
        let mut inactive = base.clone();
        inactive.validators[first_proposer].inactivity_score = 4;
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&inactive, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );

        // Balance drifted outside the hysteresis band.
        let mut drifted = base.clone();
        drifted.validators[first_proposer].balance =
            spec.max_effective_balance + 2_000_000_000;
        let mut tracker = tracker_with_all_validators(&spec, 64);
        assert_eq!(
            tracker.maybe_update_next_epoch(&drifted, ForkName::Capella, next_epoch),
            UpdateSource::EpochRef
        );
    }

    #[test]
    fn update_actions_is_idempotent() {
        let spec = ChainSpec::mainnet();
        let next_epoch = Epoch::new(5);
        let state = head_state_with_shuffling(&spec, 64, next_epoch);
        let shuffling = state.shufflings[&next_epoch].clone();
        let proposers = shuffling.proposers(E::slots_per_epoch());

        let mut tracker = tracker_with_all_validators(&spec, 64);
        tracker.update_actions(&shuffling, &proposers);
        let subnets = tracker.subscriptions();
        let proposer_slots: Vec<_> = next_epoch
            .slot_iter(E::slots_per_epoch())
            .filter_map(|s| tracker.proposer_for_slot(s))
            .collect();

        tracker.update_actions(&shuffling, &proposers);
        assert_eq!(tracker.subscriptions(), subnets);
        assert_eq!(
            next_epoch
                .slot_iter(E::slots_per_epoch())
                .filter_map(|s| tracker.proposer_for_slot(s))
                .collect::<Vec<_>>(),
            proposer_slots
        );
    }

    #[test]
    fn stability_subnets_follow_update_slot() {
        let spec = ChainSpec::mainnet();
        let mut tracker = tracker_with_all_validators(&spec, 4);
        assert!(tracker.stability_subnets().is_empty());
        tracker.update_slot(Slot::new(100));
        assert!(!tracker.stability_subnets().is_empty());
        for subnet in tracker.stability_subnets() {
            assert!(subnet.as_u64() < E::attestation_subnet_count());
        }
    }
}
