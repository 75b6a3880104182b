use crate::metrics;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use types::{BlobIdentifier, BlobSidecar, BlobSidecarList, EthSpec, Hash256, SignedBeaconBlock, Slot};

/// The roots and indices a block is still missing for availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobFetchRecord {
    pub block_root: Hash256,
    pub indices: Vec<u64>,
}

/// Holds blob sidecars until the block carrying their commitments arrives.
///
/// Insertion is advisory: under pressure the oldest sidecar (by insertion
/// order) is silently dropped. Callers that need the blob again can re-fetch
/// it by root.
pub struct BlobQuarantine {
    blobs: HashMap<BlobIdentifier, Arc<BlobSidecar>>,
    /// Insertion order for FIFO eviction. May contain identifiers already
    /// removed via [`Self::pop_blobs`]; they are skipped at eviction time.
    insertion_order: VecDeque<BlobIdentifier>,
    capacity: usize,
}

impl BlobQuarantine {
    /// Capacity covering one epoch of full blocks.
    pub fn with_default_capacity<E: EthSpec>() -> Self {
        Self::new(E::slots_per_epoch() as usize * E::max_blobs_per_block())
    }

    pub fn new(capacity: usize) -> Self {
        Self {
            blobs: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity,
        }
    }

    /// Insert a sidecar, evicting the oldest entry when full. A sidecar that
    /// is already present is left untouched.
    pub fn put(&mut self, blob: Arc<BlobSidecar>) {
        let id = blob.id();
        if self.blobs.contains_key(&id) {
            return;
        }
        while self.blobs.len() >= self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.blobs.remove(&oldest);
                }
                None => break,
            }
        }
        self.blobs.insert(id, blob);
        self.insertion_order.push_back(id);
        metrics::set_gauge(&metrics::BLOB_QUARANTINE_SIZE, self.blobs.len() as i64);
    }

    /// The sorted indices present for `block_root`.
    pub fn blob_indices(&self, block_root: &Hash256) -> Vec<u64> {
        let mut indices: Vec<u64> = self
            .blobs
            .keys()
            .filter(|id| id.block_root == *block_root)
            .map(|id| id.index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Whether a sidecar matching the given coordinates is present. Used for
    /// gossip dedup before the block (and hence the root) is known.
    pub fn has_blob(&self, slot: Slot, proposer_index: u64, index: u64) -> bool {
        self.blobs.values().any(|blob| {
            blob.slot() == slot && blob.proposer_index() == proposer_index && blob.index == index
        })
    }

    /// Whether every sidecar the block commits to is present: the count
    /// matches and the indices are exactly `0..N`.
    pub fn has_blobs<E: EthSpec>(&self, block: &SignedBeaconBlock<E>) -> bool {
        let expected = block.num_expected_blobs();
        let indices = self.blob_indices(&block.canonical_root());
        indices.len() == expected && indices.iter().enumerate().all(|(i, idx)| *idx == i as u64)
    }

    /// Remove and return the contiguous prefix of sidecars for `block_root`,
    /// starting at index 0 and stopping at the first gap.
    pub fn pop_blobs(&mut self, block_root: &Hash256) -> BlobSidecarList {
        let mut blobs = vec![];
        for index in 0.. {
            let id = BlobIdentifier {
                block_root: *block_root,
                index,
            };
            match self.blobs.remove(&id) {
                Some(blob) => blobs.push(blob),
                None => break,
            }
        }
        metrics::set_gauge(&metrics::BLOB_QUARANTINE_SIZE, self.blobs.len() as i64);
        blobs
    }

    /// The indices of `block` that are still missing from quarantine.
    pub fn fetch_record<E: EthSpec>(&self, block: &SignedBeaconBlock<E>) -> BlobFetchRecord {
        let block_root = block.canonical_root();
        let present = self.blob_indices(&block_root);
        let indices = (0..block.num_expected_blobs() as u64)
            .filter(|index| !present.contains(index))
            .collect();
        BlobFetchRecord {
            block_root,
            indices,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{blobs_for_block, block_with_blobs};
    use types::{ChainSpec, Epoch, MainnetEthSpec};

    type E = MainnetEthSpec;

    fn deneb_spec() -> ChainSpec {
        ChainSpec {
            altair_fork_epoch: Some(Epoch::new(0)),
            bellatrix_fork_epoch: Some(Epoch::new(0)),
            capella_fork_epoch: Some(Epoch::new(0)),
            deneb_fork_epoch: Some(Epoch::new(0)),
            ..ChainSpec::mainnet()
        }
    }

    #[test]
    fn at_most_once_and_fifo_eviction() {
        let spec = deneb_spec();
        let mut quarantine = BlobQuarantine::new(4);

        let block_a = block_with_blobs::<E>(&spec, Slot::new(1), Hash256::zero(), 3);
        let blobs_a = blobs_for_block(&block_a);
        for blob in &blobs_a {
            quarantine.put(blob.clone());
            quarantine.put(blob.clone());
        }
        assert_eq!(quarantine.len(), 3);

        // Two more sidecars push the two oldest out.
        let block_b = block_with_blobs::<E>(&spec, Slot::new(2), Hash256::zero(), 2);
        for blob in blobs_for_block(&block_b) {
            quarantine.put(blob);
        }
        assert_eq!(quarantine.len(), 4);
        assert_eq!(quarantine.blob_indices(&block_a.canonical_root()), vec![2]);
        assert_eq!(quarantine.blob_indices(&block_b.canonical_root()), vec![0, 1]);
    }

    #[test]
    fn has_blobs_requires_exact_contiguous_set() {
        let spec = deneb_spec();
        let mut quarantine = BlobQuarantine::with_default_capacity::<E>();
        let block = block_with_blobs::<E>(&spec, Slot::new(1), Hash256::zero(), 3);
        let blobs = blobs_for_block(&block);

        quarantine.put(blobs[0].clone());
        quarantine.put(blobs[2].clone());
        assert!(!quarantine.has_blobs(&block));
        assert_eq!(
            quarantine.fetch_record(&block).indices,
            vec![1],
        );

        quarantine.put(blobs[1].clone());
        assert!(quarantine.has_blobs(&block));
        assert!(quarantine.fetch_record(&block).indices.is_empty());
    }

    #[test]
    fn pop_blobs_returns_contiguous_prefix() {
        let spec = deneb_spec();
        let mut quarantine = BlobQuarantine::with_default_capacity::<E>();
        let block = block_with_blobs::<E>(&spec, Slot::new(1), Hash256::zero(), 4);
        let blobs = blobs_for_block(&block);
        let root = block.canonical_root();

        quarantine.put(blobs[0].clone());
        quarantine.put(blobs[1].clone());
        quarantine.put(blobs[3].clone());

        let popped = quarantine.pop_blobs(&root);
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].index, 0);
        assert_eq!(popped[1].index, 1);
        // Index 3 remains behind the gap.
        assert_eq!(quarantine.blob_indices(&root), vec![3]);
    }

    #[test]
    fn full_block_round_trip_in_index_order() {
        let spec = deneb_spec();
        let mut quarantine = BlobQuarantine::with_default_capacity::<E>();
        let block = block_with_blobs::<E>(&spec, Slot::new(1), Hash256::zero(), 5);
        let blobs = blobs_for_block(&block);
        // Insert out of order.
        for blob in blobs.iter().rev() {
            quarantine.put(blob.clone());
        }
        assert!(quarantine.has_blobs(&block));
        let popped = quarantine.pop_blobs(&block.canonical_root());
        let indices: Vec<u64> = popped.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!(quarantine.is_empty());
    }

    #[test]
    fn has_blob_matches_on_coordinates() {
        let spec = deneb_spec();
        let mut quarantine = BlobQuarantine::with_default_capacity::<E>();
        let block = block_with_blobs::<E>(&spec, Slot::new(7), Hash256::zero(), 1);
        let blobs = blobs_for_block(&block);
        quarantine.put(blobs[0].clone());

        let proposer = block.message.proposer_index();
        assert!(quarantine.has_blob(Slot::new(7), proposer, 0));
        assert!(!quarantine.has_blob(Slot::new(7), proposer, 1));
        assert!(!quarantine.has_blob(Slot::new(8), proposer, 0));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let spec = deneb_spec();
        let capacity = 8;
        let mut quarantine = BlobQuarantine::new(capacity);
        for slot in 1..20u64 {
            let block = block_with_blobs::<E>(&spec, Slot::new(slot), Hash256::zero(), 3);
            for blob in blobs_for_block(&block) {
                quarantine.put(blob);
                assert!(quarantine.len() <= capacity);
            }
        }
    }
}
