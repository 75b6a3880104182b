use crate::service::{PeerAction, PeerId, RpcBlock, RpcError, SyncNetwork};
use crate::sync::block_lookups::RequestManager;
use crate::sync::range_sync::{BackfillVerifier, RangeSync, SyncDirection};
use crate::sync::{SyncState, SyncStatus};
use beacon_chain::test_utils::{block_at_slot, test_logger, TestHarness};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use types::{BlobIdentifier, BlobSidecar, Hash256, MainnetEthSpec, SignedBeaconBlock, Slot};

type E = MainnetEthSpec;

/// Serves a fixed block tree, as a well-behaved peer set would.
#[derive(Default)]
struct MockNetwork {
    by_root: Mutex<HashMap<Hash256, Arc<SignedBeaconBlock<E>>>>,
    by_slot: Mutex<HashMap<Slot, Hash256>>,
    blobs: Mutex<HashMap<BlobIdentifier, Arc<BlobSidecar>>>,
    reports: Mutex<Vec<(PeerId, PeerAction)>>,
}

impl MockNetwork {
    fn add_block(&self, block: Arc<SignedBeaconBlock<E>>) {
        self.by_slot.lock().insert(block.slot(), block.canonical_root());
        self.by_root.lock().insert(block.canonical_root(), block);
    }

    fn add_blob(&self, blob: Arc<BlobSidecar>) {
        self.blobs.lock().insert(blob.id(), blob);
    }

    /// A linear chain spanning `slots`, rooted at `parent`.
    fn add_chain(&self, harness: &TestHarness, mut parent: Hash256, slots: std::ops::RangeInclusive<u64>) {
        for slot in slots {
            let block = Arc::new(block_at_slot::<E>(
                &harness.chain.spec,
                Slot::new(slot),
                parent,
            ));
            parent = block.canonical_root();
            self.add_block(block);
        }
    }
}

impl SyncNetwork<E> for MockNetwork {
    async fn blocks_by_range(
        &self,
        start_slot: Slot,
        count: u64,
    ) -> Result<Vec<RpcBlock<E>>, RpcError> {
        let by_slot = self.by_slot.lock();
        let by_root = self.by_root.lock();
        let mut out = vec![];
        for slot in start_slot.as_u64()..start_slot.as_u64() + count {
            if let Some(root) = by_slot.get(&Slot::new(slot)) {
                out.push(RpcBlock {
                    peer: PeerId::new(1),
                    block: by_root[root].clone(),
                    blobs: None,
                });
            }
        }
        Ok(out)
    }

    async fn block_by_root(&self, block_root: Hash256) -> Result<Option<RpcBlock<E>>, RpcError> {
        Ok(self.by_root.lock().get(&block_root).map(|block| RpcBlock {
            peer: PeerId::new(1),
            block: block.clone(),
            blobs: None,
        }))
    }

    async fn blobs_by_root(
        &self,
        blob_ids: Vec<BlobIdentifier>,
    ) -> Result<Vec<Arc<BlobSidecar>>, RpcError> {
        let blobs = self.blobs.lock();
        Ok(blob_ids.iter().filter_map(|id| blobs.get(id).cloned()).collect())
    }

    fn report_peer(&self, peer: PeerId, action: PeerAction, _reason: &'static str) {
        self.reports.lock().push((peer, action));
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

#[tokio::test]
async fn forward_sync_catches_up_to_wall_clock() {
    let harness = TestHarness::deneb();
    let network = Arc::new(MockNetwork::default());
    network.add_chain(&harness, harness.anchor_root, 1..=10);
    harness.clock.set_slot(10);

    let status = Arc::new(SyncStatus::new());
    let sync = RangeSync::new(
        harness.chain.clone(),
        network.clone(),
        harness.handle.clone(),
        status.clone(),
        SyncDirection::Forward,
        test_logger(),
    );
    let task = tokio::spawn(sync.run());

    wait_until(|| harness.chain.head_slot() == Slot::new(10)).await;
    wait_until(|| status.state() == SyncState::Synced).await;
    task.abort();
}

#[tokio::test]
async fn backfill_waits_for_forward_sync_then_fills_history() {
    // Anchor the chain at slot 5; the history below it exists on the
    // network.
    let harness = TestHarness::deneb_with_anchor(Slot::new(5));
    let network = Arc::new(MockNetwork::default());
    network.add_chain(&harness, harness.anchor_root, 1..=4);
    harness.chain.set_backfill_horizon(Slot::new(1));

    let status = Arc::new(SyncStatus::new());
    let backfill = RangeSync::new(
        harness.chain.clone(),
        network.clone(),
        BackfillVerifier::new(harness.chain.clone()),
        status.clone(),
        SyncDirection::Backward,
        test_logger(),
    );
    let task = tokio::spawn(backfill.run());

    // Still parked: forward sync has not finished.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.chain.backfill_slot(), Slot::new(5));

    status.set(SyncState::Synced);
    wait_until(|| harness.chain.backfill_slot() <= Slot::new(1)).await;
    assert_eq!(harness.chain.store.block_count(), 4);
    task.abort();
}

#[tokio::test]
async fn request_manager_resolves_unknown_parents() {
    let harness = TestHarness::deneb();
    let network = Arc::new(MockNetwork::default());

    // The parent exists on the network but not locally.
    let parent = harness.make_block_with_parent(harness.anchor_root, 1);
    network.add_block(parent.clone());
    let child = harness.make_block_with_parent(parent.canonical_root(), 2);

    let status = Arc::new(SyncStatus::new());
    let manager = RequestManager::new(
        harness.chain.clone(),
        network.clone(),
        harness.handle.clone(),
        status.clone(),
        test_logger(),
    );
    let notifications = harness.take_notifications().await;
    let task = tokio::spawn(manager.run(notifications));

    let result = harness
        .handle
        .process_block(
            beacon_chain::BlockSource::Gossip,
            child.clone(),
            None,
            false,
        )
        .await;
    assert!(matches!(
        result,
        Err(beacon_chain::BlockError::MissingParent(_))
    ));

    // The lookup fetches the parent and the cascade imports the child.
    wait_until(|| harness.chain.block_known(&child.canonical_root())).await;
    assert!(harness.chain.block_known(&parent.canonical_root()));
    task.abort();
}

#[tokio::test]
async fn request_manager_fills_blob_gaps() {
    let harness = TestHarness::deneb();
    let network = Arc::new(MockNetwork::default());

    let block = Arc::new(beacon_chain::test_utils::block_with_blobs::<E>(
        &harness.chain.spec,
        Slot::new(1),
        harness.anchor_root,
        2,
    ));
    let blobs = beacon_chain::test_utils::blobs_for_block(&block);
    for blob in &blobs {
        network.add_blob(blob.clone());
    }

    let status = Arc::new(SyncStatus::new());
    let manager = RequestManager::new(
        harness.chain.clone(),
        network.clone(),
        harness.handle.clone(),
        status.clone(),
        test_logger(),
    );
    let notifications = harness.take_notifications().await;
    let task = tokio::spawn(manager.run(notifications));

    let result = harness
        .handle
        .process_block(beacon_chain::BlockSource::Gossip, block.clone(), None, false)
        .await;
    assert!(matches!(
        result,
        Err(beacon_chain::BlockError::MissingParent(_))
    ));

    wait_until(|| harness.chain.block_known(&block.canonical_root())).await;
    task.abort();
}
