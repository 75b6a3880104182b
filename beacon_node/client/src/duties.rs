use crate::metrics;
use beacon_chain::{BeaconChain, BeaconChainTypes, ValidatorRegistration};
use network::{GossipKind, GossipTopic, NetworkCommand};
use parking_lot::Mutex;
use slog::{crit, debug, info, trace, warn, Logger};
use slot_clock::SlotClock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use types::{
    Address, Attestation, Checkpoint, Epoch, EthSpec, Hash256, Signature, Slot,
};

/// How often validator registrations are re-submitted to the external
/// payload builder.
pub const EPOCHS_PER_VALIDATOR_REGISTRATION_SUBMISSION: u64 = 1;
/// Expected aggregators per committee; the selection modulus below targets
/// this on average.
pub const TARGET_AGGREGATORS_PER_COMMITTEE: u64 = 16;
/// Epochs a freshly-armed validator listens for its own keys before signing.
pub const DOPPELGANGER_DETECTION_EPOCHS: u64 = 1;

/// A signing request that slashing protection refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSafe {
    DoubleVote,
    SurroundingVote,
    SurroundedVote,
    DoubleBlockProposal,
}

impl std::fmt::Display for NotSafe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The slashing-protection database interface. Every signing duty consults
/// this before producing a signature; refusals are final for that duty.
pub trait SlashingProtection: Send + Sync {
    fn check_and_insert_attestation(
        &self,
        validator_index: u64,
        source: Epoch,
        target: Epoch,
    ) -> Result<(), NotSafe>;

    fn check_and_insert_block_proposal(
        &self,
        validator_index: u64,
        slot: Slot,
    ) -> Result<(), NotSafe>;

    /// Drop records no longer needed once `finalized_epoch` is final.
    fn prune(&self, finalized_epoch: Epoch);
}

/// Signs on behalf of an attached validator (local keystore or remote
/// signer).
pub trait ValidatorSigner: Send + Sync {
    fn sign(&self, validator_index: u64, signing_root: Hash256) -> Signature;
}

/// An in-memory slashing-protection implementation with the interchange
/// semantics used by the on-disk database.
#[derive(Default)]
pub struct MemorySlashingProtection {
    attestations: Mutex<HashMap<u64, Vec<(Epoch, Epoch)>>>,
    proposals: Mutex<HashSet<(u64, Slot)>>,
}

impl SlashingProtection for MemorySlashingProtection {
    fn check_and_insert_attestation(
        &self,
        validator_index: u64,
        source: Epoch,
        target: Epoch,
    ) -> Result<(), NotSafe> {
        let mut attestations = self.attestations.lock();
        let history = attestations.entry(validator_index).or_default();
        for (prev_source, prev_target) in history.iter() {
            if *prev_target == target {
                return Err(NotSafe::DoubleVote);
            }
            if source < *prev_source && target > *prev_target {
                return Err(NotSafe::SurroundingVote);
            }
            if source > *prev_source && target < *prev_target {
                return Err(NotSafe::SurroundedVote);
            }
        }
        history.push((source, target));
        Ok(())
    }

    fn check_and_insert_block_proposal(
        &self,
        validator_index: u64,
        slot: Slot,
    ) -> Result<(), NotSafe> {
        if !self.proposals.lock().insert((validator_index, slot)) {
            return Err(NotSafe::DoubleBlockProposal);
        }
        Ok(())
    }

    fn prune(&self, finalized_epoch: Epoch) {
        let mut attestations = self.attestations.lock();
        for history in attestations.values_mut() {
            history.retain(|(_, target)| *target > finalized_epoch);
        }
    }
}

/// A signer producing placeholder signatures, for tests and for wiring
/// without keys.
#[derive(Default)]
pub struct NullSigner;

impl ValidatorSigner for NullSigner {
    fn sign(&self, _validator_index: u64, _signing_root: Hash256) -> Signature {
        Signature::empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DoppelgangerStatus {
    /// Detection disabled or the listening window has passed.
    Clear,
    /// Listening; signing withheld.
    Listening { broadcast_start_epoch: Epoch },
    /// Another instance was seen using this key. Never sign.
    Detected,
}

struct AttachedValidator {
    doppelganger: DoppelgangerStatus,
    /// The most recent epoch in which the doppelganger listener ran for
    /// this validator.
    last_checked: Epoch,
}

/// The locally-attached validator set and its per-slot duty bookkeeping.
pub struct ValidatorStore {
    validators: Mutex<BTreeMap<u64, AttachedValidator>>,
    pub slashing_protection: Arc<dyn SlashingProtection>,
    pub signer: Arc<dyn ValidatorSigner>,
    /// Duties already performed, to guarantee at-most-once per slot.
    performed_attestations: Mutex<HashSet<(u64, Slot)>>,
    performed_sync_messages: Mutex<BTreeMap<Slot, HashSet<u64>>>,
    /// Fee recipients set at runtime through the keymanager surface, with
    /// the epoch they were last refreshed.
    dynamic_fee_recipients: Mutex<HashMap<u64, (Address, Epoch)>>,
}

impl ValidatorStore {
    pub fn new(
        slashing_protection: Arc<dyn SlashingProtection>,
        signer: Arc<dyn ValidatorSigner>,
    ) -> Self {
        Self {
            validators: Mutex::new(BTreeMap::new()),
            slashing_protection,
            signer,
            performed_attestations: Mutex::new(HashSet::new()),
            performed_sync_messages: Mutex::new(BTreeMap::new()),
            dynamic_fee_recipients: Mutex::new(HashMap::new()),
        }
    }

    pub fn attach(&self, indices: impl IntoIterator<Item = u64>) {
        let mut validators = self.validators.lock();
        for index in indices {
            validators.entry(index).or_insert(AttachedValidator {
                doppelganger: DoppelgangerStatus::Clear,
                last_checked: Epoch::new(0),
            });
        }
    }

    pub fn validator_indices(&self) -> Vec<u64> {
        self.validators.lock().keys().copied().collect()
    }

    pub fn set_fee_recipient(&self, validator_index: u64, recipient: Address, epoch: Epoch) {
        self.dynamic_fee_recipients
            .lock()
            .insert(validator_index, (recipient, epoch));
    }

    pub fn fee_recipient(&self, validator_index: u64) -> Option<Address> {
        self.dynamic_fee_recipients
            .lock()
            .get(&validator_index)
            .map(|(a, _)| *a)
    }
}

/// Runs the duties of attached validators each slot: attest, aggregate,
/// sync-committee messages and block proposal, each gated by slashing
/// protection and doppelganger state.
pub struct DutyDispatcher<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
    store: Arc<ValidatorStore>,
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    doppelganger_detection: bool,
    log: Logger,
}

impl<T: BeaconChainTypes> DutyDispatcher<T> {
    pub fn new(
        chain: Arc<BeaconChain<T>>,
        store: Arc<ValidatorStore>,
        command_tx: mpsc::UnboundedSender<NetworkCommand>,
        doppelganger_detection: bool,
        log: Logger,
    ) -> Self {
        chain
            .action_tracker
            .lock()
            .attach_validators(store.validator_indices());
        Self {
            chain,
            store,
            command_tx,
            doppelganger_detection,
            log,
        }
    }

    pub fn store(&self) -> &Arc<ValidatorStore> {
        &self.store
    }

    /// Run every duty whose slot falls in `(last_slot, wall_slot]`.
    pub async fn handle_validator_duties(&self, last_slot: Slot, wall_slot: Slot) {
        if self.store.validator_indices().is_empty() {
            return;
        }
        let mut slot = last_slot + 1;
        while slot <= wall_slot {
            self.dispatch_slot(slot);
            slot += 1;
        }
        self.record_next_action_wait(wall_slot);

        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        if wall_slot % slots_per_epoch == 0 {
            let epoch = wall_slot.epoch(slots_per_epoch);
            if epoch.as_u64() % EPOCHS_PER_VALIDATOR_REGISTRATION_SUBMISSION == 0 {
                self.submit_validator_registrations(epoch);
            }
        }
    }

    fn dispatch_slot(&self, slot: Slot) {
        let epoch = slot.epoch(T::EthSpec::slots_per_epoch());
        let head = self.chain.head();
        let finalized = self.chain.finalized_checkpoint();

        let (attesters, proposer, sync_subnets_active) = {
            let tracker = self.chain.action_tracker.lock();
            (
                tracker.attesters_at_slot(slot).to_vec(),
                tracker.proposer_for_slot(slot),
                !tracker.sync_subnets().is_empty(),
            )
        };

        if let Some(proposer_index) = proposer {
            self.propose_block(proposer_index, slot);
        }

        let digest = self
            .chain
            .spec
            .fork_digest(self.chain.fork_name_at_wall_slot(), self.chain.genesis_validators_root);
        for (validator_index, subnet) in attesters {
            if !self.may_sign(validator_index, epoch) {
                continue;
            }
            if !self
                .store
                .performed_attestations
                .lock()
                .insert((validator_index, slot))
            {
                // Already attested for this slot (e.g. duty re-dispatch
                // after a skipped wall tick).
                continue;
            }
            let attestation = Attestation {
                slot,
                committee_index: subnet.as_u64(),
                beacon_block_root: head.root,
                source: finalized,
                target: Checkpoint {
                    epoch,
                    root: head.root,
                },
                signature: Signature::empty(),
            };
            if let Err(reason) = self.store.slashing_protection.check_and_insert_attestation(
                validator_index,
                attestation.source.epoch,
                attestation.target.epoch,
            ) {
                warn!(
                    self.log,
                    "Attestation refused by slashing protection";
                    "validator" => validator_index,
                    "reason" => %reason,
                );
                metrics::inc_counter(&metrics::DUTIES_SKIPPED_SLASHABLE);
                continue;
            }
            let signing_root = types::hash_concat(
                attestation.target.root,
                types::uint_to_leaf(slot.as_u64()),
            );
            let mut signed = attestation;
            signed.signature = self.store.signer.sign(validator_index, signing_root);

            self.chain.apply_attestation(validator_index, head.root, slot);
            self.chain.event_bus.on_attestation(signed);
            self.send(NetworkCommand::Publish(GossipTopic::new(
                digest,
                GossipKind::Attestation(subnet),
            )));
            metrics::inc_counter(&metrics::ATTESTATIONS_PUBLISHED);
            trace!(self.log, "Attestation published"; "validator" => validator_index, "slot" => slot);

            // The aggregation duty two thirds into the slot. True selection
            // hashes a slot signature; without the signing collaborator the
            // same expected aggregator rate comes from the index directly.
            if (validator_index + slot.as_u64()) % TARGET_AGGREGATORS_PER_COMMITTEE == 0 {
                self.send(NetworkCommand::Publish(GossipTopic::new(
                    digest,
                    GossipKind::BeaconAggregateAndProof,
                )));
                trace!(self.log, "Aggregate published"; "validator" => validator_index, "slot" => slot);
            }
        }

        if sync_subnets_active {
            self.publish_sync_committee_messages(slot, epoch, head.root, digest);
        }
    }

    fn propose_block(&self, validator_index: u64, slot: Slot) {
        let epoch = slot.epoch(T::EthSpec::slots_per_epoch());
        if !self.may_sign(validator_index, epoch) {
            return;
        }
        if let Err(reason) = self
            .store
            .slashing_protection
            .check_and_insert_block_proposal(validator_index, slot)
        {
            warn!(
                self.log,
                "Proposal refused by slashing protection";
                "validator" => validator_index,
                "reason" => %reason,
            );
            metrics::inc_counter(&metrics::DUTIES_SKIPPED_SLASHABLE);
            return;
        }
        let digest = self
            .chain
            .spec
            .fork_digest(self.chain.fork_name_at_wall_slot(), self.chain.genesis_validators_root);
        // Payload construction is the execution manager's side; here the
        // duty is acknowledged and broadcast intent is recorded.
        self.send(NetworkCommand::Publish(GossipTopic::new(
            digest,
            GossipKind::BeaconBlock,
        )));
        metrics::inc_counter(&metrics::BLOCKS_PROPOSED);
        info!(self.log, "Block proposal duty executed"; "validator" => validator_index, "slot" => slot);
    }

    fn publish_sync_committee_messages(
        &self,
        slot: Slot,
        epoch: Epoch,
        head_root: Hash256,
        digest: [u8; 4],
    ) {
        let subnets = self.chain.action_tracker.lock().sync_subnets().clone();
        let mut performed = self.store.performed_sync_messages.lock();
        let done = performed.entry(slot).or_default();
        for validator_index in self.store.validator_indices() {
            if !self.may_sign(validator_index, epoch) || !done.insert(validator_index) {
                continue;
            }
            for subnet in &subnets {
                self.send(NetworkCommand::Publish(GossipTopic::new(
                    digest,
                    GossipKind::SyncCommitteeMessage(*subnet),
                )));
            }
            self.chain
                .event_bus
                .on_contribution(beacon_chain::events::ContributionEvent {
                    slot,
                    subcommittee_index: subnets.iter().next().map(|s| s.as_u64()).unwrap_or(0),
                    beacon_block_root: head_root,
                });
            metrics::inc_counter(&metrics::SYNC_MESSAGES_PUBLISHED);
        }
    }

    /// Whether the validator may produce signatures this epoch.
    fn may_sign(&self, validator_index: u64, current_epoch: Epoch) -> bool {
        if !self.doppelganger_detection {
            return true;
        }
        let mut validators = self.store.validators.lock();
        let Some(validator) = validators.get_mut(&validator_index) else {
            return false;
        };
        match validator.doppelganger {
            DoppelgangerStatus::Clear => true,
            DoppelgangerStatus::Detected => {
                metrics::inc_counter(&metrics::DUTIES_SKIPPED_DOPPELGANGER);
                false
            }
            DoppelgangerStatus::Listening {
                broadcast_start_epoch,
            } => {
                let listened_through_window = validator.last_checked >= broadcast_start_epoch;
                validator.last_checked = current_epoch;
                if current_epoch >= broadcast_start_epoch + DOPPELGANGER_DETECTION_EPOCHS
                    && listened_through_window
                {
                    debug!(
                        self.log,
                        "Doppelganger window passed, enabling validator";
                        "validator" => validator_index,
                    );
                    validator.doppelganger = DoppelgangerStatus::Clear;
                    true
                } else {
                    metrics::inc_counter(&metrics::DUTIES_SKIPPED_DOPPELGANGER);
                    false
                }
            }
        }
    }

    /// Arm doppelganger detection for every validator. Called when sync
    /// completes and gossip is live.
    pub fn arm_doppelganger_detection(&self, current_epoch: Epoch) {
        if !self.doppelganger_detection {
            return;
        }
        let mut validators = self.store.validators.lock();
        for validator in validators.values_mut() {
            if validator.doppelganger == DoppelgangerStatus::Clear {
                validator.doppelganger = DoppelgangerStatus::Listening {
                    broadcast_start_epoch: current_epoch + 1,
                };
            }
        }
        info!(self.log, "Doppelganger detection armed"; "epoch" => current_epoch);
    }

    /// Disarm on network disconnect: the listening window restarts when
    /// gossip returns, since silence while offline proves nothing.
    pub fn disarm_doppelganger_detection(&self) {
        if !self.doppelganger_detection {
            return;
        }
        let mut validators = self.store.validators.lock();
        for validator in validators.values_mut() {
            if matches!(validator.doppelganger, DoppelgangerStatus::Listening { .. }) {
                validator.doppelganger = DoppelgangerStatus::Clear;
            }
        }
    }

    /// Record a gossip sighting of one of our keys that we did not send.
    pub fn observe_doppelganger(&self, validator_index: u64) {
        let mut validators = self.store.validators.lock();
        if let Some(validator) = validators.get_mut(&validator_index) {
            if matches!(validator.doppelganger, DoppelgangerStatus::Listening { .. }) {
                crit!(
                    self.log,
                    "Doppelganger detected, withholding signatures";
                    "validator" => validator_index,
                );
                validator.doppelganger = DoppelgangerStatus::Detected;
            }
        }
    }

    /// Drop per-slot duty bookkeeping that `slot` has made stale, and (at
    /// epoch boundaries) fee-recipient overrides that were never refreshed.
    pub fn prune_slot_caches(&self, slot: Slot) {
        self.store
            .performed_attestations
            .lock()
            .retain(|(_, duty_slot)| *duty_slot + T::EthSpec::slots_per_epoch() > slot);
        let mut sync_messages = self.store.performed_sync_messages.lock();
        *sync_messages = sync_messages.split_off(&slot);

        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        if slot % slots_per_epoch == 0 {
            let epoch = slot.epoch(slots_per_epoch);
            self.store
                .dynamic_fee_recipients
                .lock()
                .retain(|_, (_, set_at)| *set_at + 2u64 > epoch);
        }
    }

    pub fn prune_slashing_protection(&self, finalized_epoch: Epoch) {
        self.store.slashing_protection.prune(finalized_epoch);
    }

    fn submit_validator_registrations(&self, epoch: Epoch) {
        let registrations: Vec<ValidatorRegistration> = self
            .store
            .validator_indices()
            .into_iter()
            .map(|validator_index| ValidatorRegistration {
                validator_index,
                fee_recipient: self.store.fee_recipient(validator_index).unwrap_or_default(),
                gas_limit: 30_000_000,
                timestamp: self
                    .chain
                    .slot_clock
                    .now_duration()
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
            })
            .collect();
        if registrations.is_empty() {
            return;
        }
        debug!(
            self.log,
            "Re-submitting validator registrations";
            "count" => registrations.len(),
            "epoch" => epoch,
        );
        // Fire-and-forget towards the payload builder.
        self.chain.execution.register_validators(registrations);
    }

    fn record_next_action_wait(&self, wall_slot: Slot) {
        let tracker = self.chain.action_tracker.lock();
        let next_duty_slot = (wall_slot.as_u64() + 1..)
            .take(T::EthSpec::slots_per_epoch() as usize * 2)
            .map(Slot::new)
            .find(|s| {
                tracker.proposer_for_slot(*s).is_some() || !tracker.attesters_at_slot(*s).is_empty()
            });
        if let Some(duty_slot) = next_duty_slot {
            if let Some(wait) = self.chain.slot_clock.duration_to_slot(duty_slot) {
                metrics::set_gauge(&metrics::NEXT_ACTION_WAIT, wait.as_secs() as i64);
            }
        }
    }

    fn send(&self, command: NetworkCommand) {
        if self.command_tx.send(command).is_err() {
            trace!(self.log, "Network command receiver closed");
        }
    }
}
