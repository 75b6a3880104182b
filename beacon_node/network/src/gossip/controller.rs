use crate::gossip::topics::{core_topics_for_fork, GossipKind, GossipTopic};
use crate::metrics;
use crate::service::NetworkCommand;
use beacon_chain::{BeaconChain, BeaconChainTypes};
use slog::{debug, trace, Logger};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use types::{Epoch, EthSpec, ForkName, Slot, SubnetId, SyncSubnetId};

/// Head distance at which an unsubscribed node re-joins gossip.
pub const TOPIC_SUBSCRIBE_THRESHOLD_SLOTS: u64 = 64;
/// Extra distance a subscribed node tolerates before leaving, so a node
/// hovering near the threshold does not flap.
pub const HYSTERESIS_BUFFER_SLOTS: u64 = 16;
/// How many epochs before a sync-committee period boundary the next
/// period's subnets are prepared.
pub const SYNC_COMMITTEE_PERIOD_SETUP_EPOCHS: u64 = 4;

/// Mutates gossip topic subscriptions as the node crosses forks, sync
/// thresholds and duty changes.
///
/// Owned exclusively by the slot scheduler; all state transitions happen on
/// the event loop.
pub struct GossipController<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    /// Consensus forks whose non-block topics are live. At most two, during
    /// a fork transition.
    gossip_state: BTreeSet<ForkName>,
    /// Forks whose block topic is live. Tracked separately because
    /// optimistic sync needs blocks while the node is otherwise behind.
    blocks_gossip_state: BTreeSet<ForkName>,
    subscribed_subnets: BTreeSet<SubnetId>,
    subscribed_sync_subnets: BTreeSet<SyncSubnetId>,
    enr_attnets: BTreeSet<SubnetId>,
    enr_syncnets: BTreeSet<SyncSubnetId>,
    last_sync_committee_period: Option<u64>,
    subscribe_all_subnets: bool,
    log: Logger,
}

impl<T: BeaconChainTypes> GossipController<T> {
    pub fn new(
        chain: Arc<BeaconChain<T>>,
        command_tx: mpsc::UnboundedSender<NetworkCommand>,
        subscribe_all_subnets: bool,
        log: Logger,
    ) -> Self {
        Self {
            chain,
            command_tx,
            gossip_state: BTreeSet::new(),
            blocks_gossip_state: BTreeSet::new(),
            subscribed_subnets: BTreeSet::new(),
            subscribed_sync_subnets: BTreeSet::new(),
            enr_attnets: BTreeSet::new(),
            enr_syncnets: BTreeSet::new(),
            last_sync_committee_period: None,
            subscribe_all_subnets,
            log,
        }
    }

    pub fn gossip_state(&self) -> &BTreeSet<ForkName> {
        &self.gossip_state
    }

    pub fn blocks_gossip_state(&self) -> &BTreeSet<ForkName> {
        &self.blocks_gossip_state
    }

    pub fn subscribed_subnets(&self) -> &BTreeSet<SubnetId> {
        &self.subscribed_subnets
    }

    pub fn subscribed_sync_subnets(&self) -> &BTreeSet<SyncSubnetId> {
        &self.subscribed_sync_subnets
    }

    /// The fork digests whose topics should be live at `epoch`: the active
    /// fork, plus the next fork from one epoch before its activation.
    pub fn target_gossip_state(&self, epoch: Epoch, is_behind: bool) -> BTreeSet<ForkName> {
        if is_behind {
            return BTreeSet::new();
        }
        let mut target = BTreeSet::new();
        target.insert(self.chain.spec.fork_name_at_epoch(epoch));
        if let Some((next_fork, fork_epoch)) = self.chain.spec.next_fork_epoch(epoch) {
            if epoch + 1 == fork_epoch {
                target.insert(next_fork);
            }
        }
        debug_assert!(target.len() <= 2);
        target
    }

    /// Apply the subscription state for `slot`. Idempotent: identical inputs
    /// produce no commands.
    pub fn update_gossip_status(&mut self, slot: Slot) {
        let epoch = slot.epoch(T::EthSpec::slots_per_epoch());
        let head = self.chain.head();
        let head_distance = slot.as_u64().saturating_sub(head.slot.as_u64());

        let is_behind = self.is_behind(head_distance);
        // While the execution layer is still validating the chain we sync
        // optimistically and must keep receiving blocks.
        let syncing_optimistically = !self.chain.execution.is_execution_valid(head.root);
        let is_behind_for_blocks = is_behind && !syncing_optimistically;

        let target = self.target_gossip_state(epoch, is_behind);
        let blocks_target = self.target_gossip_state(epoch, is_behind_for_blocks);

        self.apply_core_transition(&target);
        self.apply_blocks_transition(&blocks_target);
        self.update_attestation_subnets();

        metrics::set_gauge(
            &metrics::GOSSIP_ACTIVE_FORKS,
            self.gossip_state.len() as i64,
        );
        trace!(
            self.log,
            "Gossip status updated";
            "slot" => slot,
            "head_distance" => head_distance,
            "active_forks" => ?self.gossip_state,
        );
    }

    fn is_behind(&self, head_distance: u64) -> bool {
        if self.gossip_state.is_empty() {
            head_distance >= TOPIC_SUBSCRIBE_THRESHOLD_SLOTS
        } else {
            head_distance >= TOPIC_SUBSCRIBE_THRESHOLD_SLOTS + HYSTERESIS_BUFFER_SLOTS
        }
    }

    fn apply_core_transition(&mut self, target: &BTreeSet<ForkName>) {
        let removed: Vec<ForkName> = self.gossip_state.difference(target).copied().collect();
        let added: Vec<ForkName> = target.difference(&self.gossip_state).copied().collect();

        // Remove before add, so a fork transition never doubles topics.
        for fork in removed {
            let digest = self.digest(fork);
            for topic in core_topics_for_fork::<T::EthSpec>(fork, digest) {
                self.send(NetworkCommand::Unsubscribe(topic));
            }
            for subnet in self.subscribed_subnets.clone() {
                self.send(NetworkCommand::Unsubscribe(GossipTopic::new(
                    digest,
                    GossipKind::Attestation(subnet),
                )));
            }
            for subnet in self.subscribed_sync_subnets.clone() {
                self.send(NetworkCommand::Unsubscribe(GossipTopic::new(
                    digest,
                    GossipKind::SyncCommitteeMessage(subnet),
                )));
            }
            self.gossip_state.remove(&fork);
            debug!(self.log, "Unsubscribed from fork topics"; "fork" => %fork);
        }
        for fork in added {
            let digest = self.digest(fork);
            for topic in core_topics_for_fork::<T::EthSpec>(fork, digest) {
                self.send(NetworkCommand::Subscribe(topic));
            }
            for subnet in self.subscribed_subnets.clone() {
                self.send(NetworkCommand::Subscribe(GossipTopic::new(
                    digest,
                    GossipKind::Attestation(subnet),
                )));
            }
            for subnet in self.subscribed_sync_subnets.clone() {
                self.send(NetworkCommand::Subscribe(GossipTopic::new(
                    digest,
                    GossipKind::SyncCommitteeMessage(subnet),
                )));
            }
            self.gossip_state.insert(fork);
            // Force the next sync-committee pass to re-evaluate.
            self.last_sync_committee_period = None;
            debug!(self.log, "Subscribed to fork topics"; "fork" => %fork);
        }

        if self.gossip_state.is_empty() {
            self.subscribed_subnets.clear();
            self.subscribed_sync_subnets.clear();
        }
    }

    fn apply_blocks_transition(&mut self, target: &BTreeSet<ForkName>) {
        let removed: Vec<ForkName> = self.blocks_gossip_state.difference(target).copied().collect();
        let added: Vec<ForkName> = target.difference(&self.blocks_gossip_state).copied().collect();
        for fork in removed {
            let digest = self.digest(fork);
            self.send(NetworkCommand::Unsubscribe(GossipTopic::new(
                digest,
                GossipKind::BeaconBlock,
            )));
            self.blocks_gossip_state.remove(&fork);
        }
        for fork in added {
            let digest = self.digest(fork);
            self.send(NetworkCommand::Subscribe(GossipTopic::new(
                digest,
                GossipKind::BeaconBlock,
            )));
            self.blocks_gossip_state.insert(fork);
        }
    }

    /// Reconcile attestation subnet subscriptions with the action tracker:
    /// this epoch's aggregate duties plus the long-lived stability subnets.
    fn update_attestation_subnets(&mut self) {
        let desired: BTreeSet<SubnetId> = if self.gossip_state.is_empty() {
            BTreeSet::new()
        } else if self.subscribe_all_subnets {
            (0..T::EthSpec::attestation_subnet_count())
                .map(SubnetId::new)
                .collect()
        } else {
            self.chain.action_tracker.lock().subscriptions()
        };

        let added: Vec<SubnetId> = desired.difference(&self.subscribed_subnets).copied().collect();
        let removed: Vec<SubnetId> = self.subscribed_subnets.difference(&desired).copied().collect();
        let digests: Vec<[u8; 4]> = self.gossip_state.iter().map(|f| self.digest(*f)).collect();
        for subnet in removed {
            for digest in &digests {
                self.send(NetworkCommand::Unsubscribe(GossipTopic::new(
                    *digest,
                    GossipKind::Attestation(subnet),
                )));
            }
        }
        for subnet in added {
            for digest in &digests {
                self.send(NetworkCommand::Subscribe(GossipTopic::new(
                    *digest,
                    GossipKind::Attestation(subnet),
                )));
            }
        }
        self.subscribed_subnets = desired;

        let desired_enr: BTreeSet<SubnetId> = if self.subscribe_all_subnets {
            (0..T::EthSpec::attestation_subnet_count())
                .map(SubnetId::new)
                .collect()
        } else {
            self.chain.action_tracker.lock().stability_subnets().clone()
        };
        if desired_enr != self.enr_attnets {
            self.enr_attnets = desired_enr.clone();
            self.send(NetworkCommand::UpdateEnrAttnets(desired_enr));
        }

        metrics::set_gauge(
            &metrics::GOSSIP_SUBSCRIBED_SUBNETS,
            self.subscribed_subnets.len() as i64,
        );
    }

    /// Reconcile sync-committee subnet subscriptions. Recomputed only when
    /// the period changes or a period boundary is near; a no-op otherwise.
    pub fn update_sync_committee_topics(&mut self, slot: Slot) {
        let epoch = slot.epoch(T::EthSpec::slots_per_epoch());
        let period = epoch.as_u64() / T::EthSpec::epochs_per_sync_committee_period().as_u64();
        if self.last_sync_committee_period == Some(period)
            && Self::near_sync_committee_period(epoch).is_none()
        {
            return;
        }
        self.last_sync_committee_period = Some(period);

        let desired: BTreeSet<SyncSubnetId> = if self.gossip_state.is_empty() {
            BTreeSet::new()
        } else if self.subscribe_all_subnets {
            (0..T::EthSpec::sync_committee_subnet_count())
                .map(SyncSubnetId::new)
                .collect()
        } else {
            self.chain.action_tracker.lock().sync_subnets().clone()
        };

        let added: Vec<SyncSubnetId> = desired
            .difference(&self.subscribed_sync_subnets)
            .copied()
            .collect();
        let removed: Vec<SyncSubnetId> = self
            .subscribed_sync_subnets
            .difference(&desired)
            .copied()
            .collect();
        let digests: Vec<[u8; 4]> = self.gossip_state.iter().map(|f| self.digest(*f)).collect();
        for subnet in removed {
            for digest in &digests {
                self.send(NetworkCommand::Unsubscribe(GossipTopic::new(
                    *digest,
                    GossipKind::SyncCommitteeMessage(subnet),
                )));
            }
        }
        for subnet in added {
            for digest in &digests {
                self.send(NetworkCommand::Subscribe(GossipTopic::new(
                    *digest,
                    GossipKind::SyncCommitteeMessage(subnet),
                )));
            }
        }
        self.subscribed_sync_subnets = desired;

        if self.subscribed_sync_subnets != self.enr_syncnets {
            self.enr_syncnets = self.subscribed_sync_subnets.clone();
            self.send(NetworkCommand::UpdateEnrSyncnets(self.enr_syncnets.clone()));
        }
    }

    /// `Some(epochs_until_boundary)` when the next sync-committee period is
    /// close enough to warrant subscribing its subnets ahead of time.
    pub fn near_sync_committee_period(epoch: Epoch) -> Option<u64> {
        let period_length = T::EthSpec::epochs_per_sync_committee_period().as_u64();
        let remaining = period_length - (epoch.as_u64() % period_length);
        (remaining <= SYNC_COMMITTEE_PERIOD_SETUP_EPOCHS).then_some(remaining)
    }

    fn digest(&self, fork: ForkName) -> [u8; 4] {
        self.chain
            .spec
            .fork_digest(fork, self.chain.genesis_validators_root)
    }

    fn send(&self, command: NetworkCommand) {
        if self.command_tx.send(command).is_err() {
            trace!(self.log, "Network command receiver closed");
        }
    }
}
