use crate::gossip::controller::GossipController;
use crate::gossip::topics::GossipKind;
use crate::service::NetworkCommand;
use beacon_chain::test_utils::{test_logger, TestHarness};
use beacon_chain::{ActionTracker, ExecutionLayer, PayloadStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use types::{ChainSpec, Epoch, EthSpec, ForkName, Hash256, MainnetEthSpec, Slot};

type E = MainnetEthSpec;

struct Fixture {
    harness: TestHarness,
    controller: GossipController<beacon_chain::test_utils::TestTypes>,
    commands: mpsc::UnboundedReceiver<NetworkCommand>,
}

fn fixture_with_spec(spec: ChainSpec, anchor_slot: Slot) -> Fixture {
    let harness = TestHarness::new(spec, anchor_slot);
    let (tx, commands) = mpsc::unbounded_channel();
    let controller = GossipController::new(harness.chain.clone(), tx, false, test_logger());
    Fixture {
        harness,
        controller,
        commands,
    }
}

fn drain(commands: &mut mpsc::UnboundedReceiver<NetworkCommand>) -> Vec<NetworkCommand> {
    let mut out = vec![];
    while let Ok(command) = commands.try_recv() {
        out.push(command);
    }
    out
}

fn capella_transition_spec() -> ChainSpec {
    ChainSpec {
        altair_fork_epoch: Some(Epoch::new(0)),
        bellatrix_fork_epoch: Some(Epoch::new(0)),
        capella_fork_epoch: Some(Epoch::new(10)),
        deneb_fork_epoch: None,
        ..ChainSpec::mainnet()
    }
}

#[tokio::test]
async fn fork_transition_subscribes_adjacent_forks() {
    let slots_per_epoch = E::slots_per_epoch();
    let anchor = Epoch::new(9).start_slot(slots_per_epoch);
    let mut fixture = fixture_with_spec(capella_transition_spec(), anchor);

    // Synced inside epoch 8: only Bellatrix.
    let epoch_8_slot = Epoch::new(8).end_slot(slots_per_epoch);
    fixture.controller.update_gossip_status(epoch_8_slot);
    assert_eq!(
        fixture.controller.gossip_state().iter().copied().collect::<Vec<_>>(),
        vec![ForkName::Merge]
    );

    // One epoch before Capella: both forks coexist.
    fixture.controller.update_gossip_status(anchor);
    let state: Vec<ForkName> = fixture.controller.gossip_state().iter().copied().collect();
    assert_eq!(state, vec![ForkName::Merge, ForkName::Capella]);
    assert!(fixture.controller.gossip_state().len() <= 2);

    let commands = drain(&mut fixture.commands);
    assert!(
        commands.iter().any(|c| matches!(
            c,
            NetworkCommand::Subscribe(topic) if topic.kind == GossipKind::BlsToExecutionChange
        )),
        "the Capella-only topic must appear with the new fork digest"
    );

    // At the Capella epoch, Bellatrix topics are dropped.
    fixture
        .controller
        .update_gossip_status(Epoch::new(10).start_slot(slots_per_epoch));
    assert_eq!(
        fixture.controller.gossip_state().iter().copied().collect::<Vec<_>>(),
        vec![ForkName::Capella]
    );
    let commands = drain(&mut fixture.commands);
    let old_digest = fixture
        .harness
        .chain
        .spec
        .fork_digest(ForkName::Merge, fixture.harness.chain.genesis_validators_root);
    assert!(commands.iter().any(|c| matches!(
        c,
        NetworkCommand::Unsubscribe(topic) if topic.fork_digest == old_digest
    )));
}

#[tokio::test]
async fn behind_hysteresis_drives_subscription() {
    let anchor = Slot::new(1_000);
    let mut fixture = fixture_with_spec(
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        },
        anchor,
    );

    // Synced: subscribed.
    fixture.controller.update_gossip_status(anchor + 1);
    assert!(!fixture.controller.gossip_state().is_empty());

    // 79 slots behind: still inside the hysteresis buffer.
    fixture.controller.update_gossip_status(anchor + 79);
    assert!(!fixture.controller.gossip_state().is_empty());

    // Crossing 64 + 16: unsubscribe everything.
    fixture.controller.update_gossip_status(anchor + 80);
    assert!(fixture.controller.gossip_state().is_empty());
    assert!(fixture.controller.subscribed_subnets().is_empty());

    // Back inside the buffer but not within the re-entry threshold.
    fixture.controller.update_gossip_status(anchor + 70);
    assert!(fixture.controller.gossip_state().is_empty());

    // Within 63 slots: re-enter.
    fixture.controller.update_gossip_status(anchor + 63);
    assert!(!fixture.controller.gossip_state().is_empty());
}

struct SyncingExecution;

impl ExecutionLayer for SyncingExecution {
    fn notify_forkchoice_updated(&self, _head: Hash256, _finalized: Hash256) -> PayloadStatus {
        PayloadStatus::Syncing
    }
    fn is_execution_valid(&self, _block_root: Hash256) -> bool {
        false
    }
    fn register_validators(&self, _registrations: Vec<beacon_chain::ValidatorRegistration>) {}
}

#[tokio::test]
async fn optimistic_sync_keeps_blocks_topic() {
    let anchor = Slot::new(1_000);
    let harness = TestHarness::new_with_execution(
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        },
        anchor,
        Arc::new(SyncingExecution),
    );
    let (tx, mut commands) = mpsc::unbounded_channel();
    let mut controller = GossipController::new(harness.chain.clone(), tx, false, test_logger());

    // Far behind, but optimistically syncing: no core topics, blocks stay.
    controller.update_gossip_status(anchor + 200);
    assert!(controller.gossip_state().is_empty());
    assert!(!controller.blocks_gossip_state().is_empty());
    let commands = drain(&mut commands);
    assert!(commands.iter().any(|c| matches!(
        c,
        NetworkCommand::Subscribe(topic) if topic.kind == GossipKind::BeaconBlock
    )));
}

#[tokio::test]
async fn update_gossip_status_is_idempotent() {
    let anchor = Slot::new(500);
    let mut fixture = fixture_with_spec(
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        },
        anchor,
    );

    fixture.controller.update_gossip_status(anchor + 1);
    fixture.controller.update_sync_committee_topics(anchor + 1);
    drain(&mut fixture.commands);

    fixture.controller.update_gossip_status(anchor + 1);
    fixture.controller.update_sync_committee_topics(anchor + 1);
    assert!(
        drain(&mut fixture.commands).is_empty(),
        "identical inputs must produce no subscribe/unsubscribe traffic"
    );
}

#[tokio::test]
async fn subscribed_subnets_are_aggregate_union_stability() {
    let anchor = Slot::new(500);
    let mut fixture = fixture_with_spec(
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        },
        anchor,
    );
    fixture.harness.set_validators(8);

    let slot = anchor + 1;
    {
        let head_state = fixture.harness.chain.head_state_snapshot();
        let epoch = slot.epoch(E::slots_per_epoch());
        let shuffling = ActionTracker::<E>::epoch_ref_fallback(&head_state, epoch);
        let proposers = shuffling.proposers(E::slots_per_epoch());
        let mut tracker = fixture.harness.chain.action_tracker.lock();
        tracker.attach_validators(0..8);
        tracker.update_slot(slot);
        tracker.update_actions(&shuffling, &proposers);
    }

    fixture.controller.update_gossip_status(slot);

    let tracker = fixture.harness.chain.action_tracker.lock();
    let expected: std::collections::BTreeSet<_> = tracker
        .aggregate_subnets()
        .union(tracker.stability_subnets())
        .copied()
        .collect();
    assert!(!expected.is_empty());
    assert_eq!(fixture.controller.subscribed_subnets(), &expected);
}
