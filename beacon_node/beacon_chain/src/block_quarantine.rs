use crate::block_verification::BlockError;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use types::{EthSpec, Hash256, SignedBeaconBlock, Slot};

/// Holds blocks that cannot be processed yet: orphans waiting for a parent,
/// and post-Deneb blocks waiting for their blob sidecars.
///
/// Capacity is shared per pen; inserting into a full pen evicts the oldest
/// entry, since newer blocks are more likely to still matter by the time
/// their dependencies arrive.
pub struct BlockQuarantine<E: EthSpec> {
    orphans: HashMap<Hash256, Arc<SignedBeaconBlock<E>>>,
    orphans_by_parent: HashMap<Hash256, Vec<Hash256>>,
    orphan_order: VecDeque<Hash256>,
    blobless: HashMap<Hash256, Arc<SignedBeaconBlock<E>>>,
    blobless_order: VecDeque<Hash256>,
    capacity: usize,
}

impl<E: EthSpec> BlockQuarantine<E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            orphans: HashMap::new(),
            orphans_by_parent: HashMap::new(),
            orphan_order: VecDeque::new(),
            blobless: HashMap::new(),
            blobless_order: VecDeque::new(),
            capacity,
        }
    }

    /// Hold a block whose parent is unknown.
    ///
    /// Blocks at or below the finalized slot can never become viable and are
    /// rejected outright.
    pub fn add_orphan(
        &mut self,
        finalized_slot: Slot,
        block: Arc<SignedBeaconBlock<E>>,
    ) -> Result<(), BlockError> {
        if block.slot() <= finalized_slot {
            return Err(BlockError::UnviableFork);
        }
        let root = block.canonical_root();
        if self.orphans.contains_key(&root) {
            return Ok(());
        }
        while self.orphans.len() >= self.capacity {
            match self.orphan_order.pop_front() {
                Some(oldest) => self.remove_orphan(&oldest),
                None => break,
            }
        }
        self.orphans_by_parent
            .entry(block.parent_root())
            .or_default()
            .push(root);
        self.orphans.insert(root, block);
        self.orphan_order.push_back(root);
        Ok(())
    }

    /// Hold a post-Deneb block whose blob sidecars have not all arrived.
    pub fn add_blobless(
        &mut self,
        finalized_slot: Slot,
        block: Arc<SignedBeaconBlock<E>>,
    ) -> Result<(), BlockError> {
        if block.slot() <= finalized_slot {
            return Err(BlockError::UnviableFork);
        }
        let root = block.canonical_root();
        if self.blobless.contains_key(&root) {
            return Ok(());
        }
        while self.blobless.len() >= self.capacity {
            match self.blobless_order.pop_front() {
                Some(oldest) => {
                    self.blobless.remove(&oldest);
                }
                None => break,
            }
        }
        self.blobless.insert(root, block);
        self.blobless_order.push_back(root);
        Ok(())
    }

    /// Remove and return all orphans whose parent is `parent_root`, ready for
    /// a processing retry now the parent exists.
    pub fn pop_children(&mut self, parent_root: &Hash256) -> Vec<Arc<SignedBeaconBlock<E>>> {
        let Some(child_roots) = self.orphans_by_parent.remove(parent_root) else {
            return vec![];
        };
        child_roots
            .iter()
            .filter_map(|root| self.orphans.remove(root))
            .collect()
    }

    /// Remove and return the blobless block with the given root, if held.
    pub fn pop_blobless(&mut self, block_root: &Hash256) -> Option<Arc<SignedBeaconBlock<E>>> {
        self.blobless.remove(block_root)
    }

    /// Parent roots we are waiting on, excluding parents that are themselves
    /// quarantined (their own parent is the real blocker).
    pub fn missing_parents(&self) -> Vec<Hash256> {
        self.orphans_by_parent
            .keys()
            .filter(|parent| !self.orphans.contains_key(*parent))
            .copied()
            .collect()
    }

    /// The blobless blocks currently held, for blob-gap re-fetch.
    pub fn blobless_blocks(&self) -> impl Iterator<Item = &Arc<SignedBeaconBlock<E>>> {
        self.blobless.values()
    }

    pub fn contains(&self, root: &Hash256) -> bool {
        self.orphans.contains_key(root) || self.blobless.contains_key(root)
    }

    /// Drop everything at or below the finalized slot.
    pub fn prune(&mut self, finalized_slot: Slot) {
        let stale: Vec<Hash256> = self
            .orphans
            .iter()
            .filter(|(_, block)| block.slot() <= finalized_slot)
            .map(|(root, _)| *root)
            .collect();
        for root in stale {
            self.remove_orphan(&root);
        }
        self.blobless.retain(|_, block| block.slot() > finalized_slot);
    }

    pub fn len(&self) -> usize {
        self.orphans.len() + self.blobless.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty() && self.blobless.is_empty()
    }

    fn remove_orphan(&mut self, root: &Hash256) {
        if let Some(block) = self.orphans.remove(root) {
            if let Some(siblings) = self.orphans_by_parent.get_mut(&block.parent_root()) {
                siblings.retain(|r| r != root);
                if siblings.is_empty() {
                    self.orphans_by_parent.remove(&block.parent_root());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::block_at_slot;
    use types::{ChainSpec, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn spec() -> ChainSpec {
        ChainSpec::mainnet()
    }

    #[test]
    fn rejects_pre_finalized_blocks() {
        let mut quarantine = BlockQuarantine::<E>::new(8);
        let block = Arc::new(block_at_slot::<E>(&spec(), Slot::new(5), Hash256::repeat_byte(1)));
        assert_eq!(
            quarantine.add_orphan(Slot::new(5), block.clone()),
            Err(BlockError::UnviableFork)
        );
        assert_eq!(quarantine.add_orphan(Slot::new(4), block), Ok(()));
    }

    #[test]
    fn pop_children_drains_by_parent() {
        let mut quarantine = BlockQuarantine::<E>::new(8);
        let parent = Hash256::repeat_byte(1);
        let a = Arc::new(block_at_slot::<E>(&spec(), Slot::new(10), parent));
        let b = Arc::new(block_at_slot::<E>(&spec(), Slot::new(11), parent));
        let c = Arc::new(block_at_slot::<E>(&spec(), Slot::new(11), Hash256::repeat_byte(2)));
        quarantine.add_orphan(Slot::new(0), a.clone()).unwrap();
        quarantine.add_orphan(Slot::new(0), b.clone()).unwrap();
        quarantine.add_orphan(Slot::new(0), c.clone()).unwrap();

        let children = quarantine.pop_children(&parent);
        assert_eq!(children.len(), 2);
        assert_eq!(quarantine.len(), 1);
        assert!(quarantine.pop_children(&parent).is_empty());
        assert!(quarantine.contains(&c.canonical_root()));
    }

    #[test]
    fn eviction_favours_oldest() {
        let mut quarantine = BlockQuarantine::<E>::new(2);
        let a = Arc::new(block_at_slot::<E>(&spec(), Slot::new(1), Hash256::repeat_byte(1)));
        let b = Arc::new(block_at_slot::<E>(&spec(), Slot::new(2), Hash256::repeat_byte(2)));
        let c = Arc::new(block_at_slot::<E>(&spec(), Slot::new(3), Hash256::repeat_byte(3)));
        quarantine.add_orphan(Slot::new(0), a.clone()).unwrap();
        quarantine.add_orphan(Slot::new(0), b.clone()).unwrap();
        quarantine.add_orphan(Slot::new(0), c.clone()).unwrap();

        assert_eq!(quarantine.len(), 2);
        assert!(!quarantine.contains(&a.canonical_root()));
        assert!(quarantine.contains(&b.canonical_root()));
        assert!(quarantine.contains(&c.canonical_root()));
    }

    #[test]
    fn missing_parents_skips_chained_orphans() {
        let mut quarantine = BlockQuarantine::<E>::new(8);
        let grandparent = Hash256::repeat_byte(9);
        let parent = Arc::new(block_at_slot::<E>(&spec(), Slot::new(10), grandparent));
        let child = Arc::new(block_at_slot::<E>(
            &spec(),
            Slot::new(11),
            parent.canonical_root(),
        ));
        quarantine.add_orphan(Slot::new(0), parent).unwrap();
        quarantine.add_orphan(Slot::new(0), child).unwrap();

        // Only the grandparent is truly missing.
        assert_eq!(quarantine.missing_parents(), vec![grandparent]);
    }

    #[test]
    fn prune_clears_stale_entries() {
        let mut quarantine = BlockQuarantine::<E>::new(8);
        let old = Arc::new(block_at_slot::<E>(&spec(), Slot::new(5), Hash256::repeat_byte(1)));
        let new = Arc::new(block_at_slot::<E>(&spec(), Slot::new(50), Hash256::repeat_byte(2)));
        quarantine.add_orphan(Slot::new(0), old).unwrap();
        quarantine.add_orphan(Slot::new(0), new).unwrap();
        quarantine.prune(Slot::new(32));
        assert_eq!(quarantine.len(), 1);
    }
}
