use parking_lot::RwLock;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use types::{BlobSidecarList, Epoch, EthSpec, Hash256, SignedBeaconBlock, Slot};

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    Database(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

/// The block/blob persistence surface the node requires of its database.
///
/// Schema and storage engine are the database layer's concern; the node only
/// assumes durability after [`Store::checkpoint`] returns.
pub trait Store<E: EthSpec>: Send + Sync + 'static {
    fn put_block(&self, block_root: Hash256, block: SignedBeaconBlock<E>) -> Result<(), StoreError>;

    fn get_block(&self, block_root: &Hash256) -> Result<Option<SignedBeaconBlock<E>>, StoreError>;

    fn put_blobs(&self, block_root: Hash256, blobs: BlobSidecarList) -> Result<(), StoreError>;

    fn get_blobs(&self, block_root: &Hash256) -> Result<Option<BlobSidecarList>, StoreError>;

    /// Flush the write-ahead log so everything stored so far survives a
    /// crash.
    fn checkpoint(&self) -> Result<(), StoreError>;

    /// Delete blocks below `keep_from`, returning how many were removed.
    fn prune_history(&self, keep_from: Slot) -> Result<usize, StoreError>;

    /// Delete blob sidecars from epochs below `data_availability_boundary`,
    /// returning how many block entries were removed.
    fn prune_blobs(&self, data_availability_boundary: Epoch) -> Result<usize, StoreError>;
}

/// A non-persistent store backed by hash maps. Used in testing.
pub struct MemoryStore<E: EthSpec> {
    blocks: RwLock<HashMap<Hash256, SignedBeaconBlock<E>>>,
    blobs: RwLock<HashMap<Hash256, BlobSidecarList>>,
    checkpoint_count: AtomicUsize,
    _phantom: PhantomData<E>,
}

impl<E: EthSpec> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn blob_block_count(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoint_count.load(Ordering::Relaxed)
    }
}

impl<E: EthSpec> Default for MemoryStore<E> {
    fn default() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            checkpoint_count: AtomicUsize::new(0),
            _phantom: PhantomData,
        }
    }
}

impl<E: EthSpec> Store<E> for MemoryStore<E> {
    fn put_block(&self, block_root: Hash256, block: SignedBeaconBlock<E>) -> Result<(), StoreError> {
        self.blocks.write().insert(block_root, block);
        Ok(())
    }

    fn get_block(&self, block_root: &Hash256) -> Result<Option<SignedBeaconBlock<E>>, StoreError> {
        Ok(self.blocks.read().get(block_root).cloned())
    }

    fn put_blobs(&self, block_root: Hash256, blobs: BlobSidecarList) -> Result<(), StoreError> {
        self.blobs.write().insert(block_root, blobs);
        Ok(())
    }

    fn get_blobs(&self, block_root: &Hash256) -> Result<Option<BlobSidecarList>, StoreError> {
        Ok(self.blobs.read().get(block_root).cloned())
    }

    fn checkpoint(&self) -> Result<(), StoreError> {
        self.checkpoint_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn prune_history(&self, keep_from: Slot) -> Result<usize, StoreError> {
        let mut blocks = self.blocks.write();
        let before = blocks.len();
        blocks.retain(|_, block| block.slot() >= keep_from);
        Ok(before - blocks.len())
    }

    fn prune_blobs(&self, data_availability_boundary: Epoch) -> Result<usize, StoreError> {
        let mut blobs = self.blobs.write();
        let before = blobs.len();
        blobs.retain(|_, sidecars| {
            sidecars
                .first()
                .map(|sidecar| {
                    sidecar.slot().epoch(E::slots_per_epoch()) >= data_availability_boundary
                })
                .unwrap_or(false)
        });
        Ok(before - blobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blobs_for_block, block_with_blobs};
    use types::{ChainSpec, MainnetEthSpec};

    type E = MainnetEthSpec;

    #[test]
    fn prune_blobs_respects_epoch_boundary() {
        let spec = ChainSpec {
            deneb_fork_epoch: Some(Epoch::new(0)),
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        };
        let store = MemoryStore::<E>::new();
        let slots_per_epoch = E::slots_per_epoch();

        for epoch in 0..4u64 {
            let slot = Epoch::new(epoch).start_slot(slots_per_epoch);
            let block = block_with_blobs::<E>(&spec, slot, Hash256::zero(), 1);
            store
                .put_blobs(block.canonical_root(), blobs_for_block(&block))
                .unwrap();
        }
        assert_eq!(store.blob_block_count(), 4);
        let removed = store.prune_blobs(Epoch::new(2)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.blob_block_count(), 2);
    }

    #[test]
    fn prune_history_keeps_recent_blocks() {
        let spec = ChainSpec::mainnet();
        let store = MemoryStore::<E>::new();
        for slot in 0..10u64 {
            let block = crate::test_utils::block_at_slot::<E>(&spec, Slot::new(slot), Hash256::zero());
            store.put_block(block.canonical_root(), block).unwrap();
        }
        let removed = store.prune_history(Slot::new(5)).unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.block_count(), 5);
    }
}
