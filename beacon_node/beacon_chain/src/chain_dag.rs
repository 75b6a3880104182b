use std::collections::HashMap;
use types::{Checkpoint, Hash256, Slot};

/// Errors from DAG mutation.
#[derive(Debug, PartialEq, Eq)]
pub enum DagError {
    UnknownParent(Hash256),
    DuplicateBlock(Hash256),
    UnknownBlock(Hash256),
    /// The proposed finalized block is not a descendant of the previous one.
    FinalizedAncestryViolation,
}

#[derive(Debug, Clone)]
struct DagNode {
    root: Hash256,
    slot: Slot,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// The block tree.
///
/// Nodes live in an arena and refer to each other by index; the parent of a
/// node is always inserted before it, so arena order is topological. Roots,
/// not indices, are the stable identifiers across pruning.
pub struct ChainDag {
    nodes: Vec<DagNode>,
    indices: HashMap<Hash256, usize>,
    head: usize,
    finalized: Checkpoint,
    finalized_index: usize,
    /// The oldest slot for which backfill has stored a block, moving toward
    /// `horizon` as backfill progresses.
    backfill: Slot,
    /// The oldest slot the node intends to retain.
    horizon: Slot,
}

impl ChainDag {
    /// Start a DAG from an anchor (genesis, or a checkpoint block).
    pub fn new(anchor_root: Hash256, anchor_slot: Slot, finalized: Checkpoint) -> Self {
        let node = DagNode {
            root: anchor_root,
            slot: anchor_slot,
            parent: None,
            children: vec![],
        };
        let mut indices = HashMap::new();
        indices.insert(anchor_root, 0);
        Self {
            nodes: vec![node],
            indices,
            head: 0,
            finalized,
            finalized_index: 0,
            backfill: anchor_slot,
            horizon: Slot::new(0),
        }
    }

    pub fn contains(&self, root: &Hash256) -> bool {
        self.indices.contains_key(root)
    }

    pub fn block_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn slot_of(&self, root: &Hash256) -> Option<Slot> {
        self.indices.get(root).map(|i| self.nodes[*i].slot)
    }

    pub fn parent_of(&self, root: &Hash256) -> Option<Hash256> {
        let node = &self.nodes[*self.indices.get(root)?];
        node.parent.map(|p| self.nodes[p].root)
    }

    pub fn insert(&mut self, root: Hash256, slot: Slot, parent_root: Hash256) -> Result<(), DagError> {
        if self.contains(&root) {
            return Err(DagError::DuplicateBlock(root));
        }
        let parent = *self
            .indices
            .get(&parent_root)
            .ok_or(DagError::UnknownParent(parent_root))?;
        let index = self.nodes.len();
        self.nodes.push(DagNode {
            root,
            slot,
            parent: Some(parent),
            children: vec![],
        });
        self.nodes[parent].children.push(index);
        self.indices.insert(root, index);
        Ok(())
    }

    pub fn head_root(&self) -> Hash256 {
        self.nodes[self.head].root
    }

    pub fn head_slot(&self) -> Slot {
        self.nodes[self.head].slot
    }

    pub fn set_head(&mut self, root: Hash256) -> Result<(), DagError> {
        self.head = *self.indices.get(&root).ok_or(DagError::UnknownBlock(root))?;
        Ok(())
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized
    }

    pub fn finalized_root(&self) -> Hash256 {
        self.nodes[self.finalized_index].root
    }

    pub fn finalized_slot(&self) -> Slot {
        self.nodes[self.finalized_index].slot
    }

    pub fn backfill_slot(&self) -> Slot {
        self.backfill
    }

    pub fn set_backfill_slot(&mut self, slot: Slot) {
        self.backfill = slot;
    }

    pub fn horizon_slot(&self) -> Slot {
        self.horizon
    }

    pub fn set_horizon_slot(&mut self, slot: Slot) {
        self.horizon = slot;
    }

    /// Move the finalized pointer. The new finalized block must descend from
    /// the previous one; pruning happens separately via [`Self::prune`].
    pub fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), DagError> {
        let index = *self
            .indices
            .get(&checkpoint.root)
            .ok_or(DagError::UnknownBlock(checkpoint.root))?;
        if !self.is_descendant(&self.nodes[self.finalized_index].root, &checkpoint.root) {
            return Err(DagError::FinalizedAncestryViolation);
        }
        self.finalized = checkpoint;
        self.finalized_index = index;
        Ok(())
    }

    /// `true` iff `descendant` is `ancestor` or lies in its subtree.
    pub fn is_descendant(&self, ancestor: &Hash256, descendant: &Hash256) -> bool {
        let (Some(&ancestor_index), Some(&descendant_index)) =
            (self.indices.get(ancestor), self.indices.get(descendant))
        else {
            return false;
        };
        let mut current = Some(descendant_index);
        while let Some(index) = current {
            if index == ancestor_index {
                return true;
            }
            // Arena order is topological, so stop as soon as we pass above
            // the ancestor.
            if index < ancestor_index {
                return false;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    /// The ancestor of `root` at `slot`, following parent links.
    pub fn ancestor_at_slot(&self, root: &Hash256, slot: Slot) -> Option<Hash256> {
        let mut index = *self.indices.get(root)?;
        loop {
            let node = &self.nodes[index];
            if node.slot <= slot {
                return Some(node.root);
            }
            index = node.parent?;
        }
    }

    /// The deepest block that is an ancestor of both arguments.
    pub fn common_ancestor(&self, a: &Hash256, b: &Hash256) -> Option<Hash256> {
        let mut a_index = *self.indices.get(a)?;
        let mut b_index = *self.indices.get(b)?;
        // Indices are topological: walk the deeper side up until they meet.
        loop {
            if a_index == b_index {
                return Some(self.nodes[a_index].root);
            }
            if a_index > b_index {
                a_index = self.nodes[a_index].parent?;
            } else {
                b_index = self.nodes[b_index].parent?;
            }
        }
    }

    /// Children of `root`, in insertion order.
    pub fn children_of(&self, root: &Hash256) -> Vec<Hash256> {
        match self.indices.get(root) {
            Some(&i) => self.nodes[i]
                .children
                .iter()
                .map(|c| self.nodes[*c].root)
                .collect(),
            None => vec![],
        }
    }

    /// Iterate `(root, slot, parent_index)` in topological order. Used by
    /// fork choice for subtree weight accumulation.
    pub(crate) fn topological_iter(&self) -> impl Iterator<Item = (Hash256, Slot, Option<usize>)> + '_ {
        self.nodes.iter().map(|n| (n.root, n.slot, n.parent))
    }

    pub(crate) fn index_of(&self, root: &Hash256) -> Option<usize> {
        self.indices.get(root).copied()
    }

    /// Drop everything that does not descend from the finalized block and
    /// make the finalized block the new arena root.
    ///
    /// Returns the roots that were removed.
    pub fn prune(&mut self) -> Vec<Hash256> {
        let keep_root = self.nodes[self.finalized_index].root;
        let head_root = self.nodes[self.head].root;

        let mut kept = vec![self.finalized_index];
        let mut cursor = 0;
        while cursor < kept.len() {
            let index = kept[cursor];
            kept.extend(self.nodes[index].children.iter().copied());
            cursor += 1;
        }
        kept.sort_unstable();

        let mut remap: HashMap<usize, usize> = HashMap::with_capacity(kept.len());
        for (new_index, old_index) in kept.iter().enumerate() {
            remap.insert(*old_index, new_index);
        }

        let mut removed = vec![];
        let mut new_nodes = Vec::with_capacity(kept.len());
        for (old_index, node) in self.nodes.iter().enumerate() {
            if remap.contains_key(&old_index) {
                new_nodes.push(DagNode {
                    root: node.root,
                    slot: node.slot,
                    parent: node.parent.and_then(|p| remap.get(&p).copied()),
                    children: node
                        .children
                        .iter()
                        .filter_map(|c| remap.get(c).copied())
                        .collect(),
                });
            } else {
                removed.push(node.root);
            }
        }

        self.indices = new_nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.root, i))
            .collect();
        self.nodes = new_nodes;
        self.finalized_index = self.indices[&keep_root];
        // A pruned-away head means the caller reorged without updating us
        // first; fall back to the finalized block until the next head update.
        self.head = self.indices.get(&head_root).copied().unwrap_or(self.finalized_index);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(b: u8) -> Hash256 {
        Hash256::repeat_byte(b)
    }

    fn checkpoint(b: u8) -> Checkpoint {
        Checkpoint {
            epoch: types::Epoch::new(0),
            root: root(b),
        }
    }

    fn linear_dag(len: u8) -> ChainDag {
        let mut dag = ChainDag::new(root(0), Slot::new(0), checkpoint(0));
        for i in 1..=len {
            dag.insert(root(i), Slot::new(i as u64), root(i - 1)).unwrap();
        }
        dag
    }

    #[test]
    fn insert_requires_parent() {
        let mut dag = linear_dag(2);
        assert_eq!(
            dag.insert(root(9), Slot::new(9), root(8)),
            Err(DagError::UnknownParent(root(8)))
        );
        assert_eq!(
            dag.insert(root(2), Slot::new(2), root(1)),
            Err(DagError::DuplicateBlock(root(2)))
        );
    }

    #[test]
    fn ancestry_queries() {
        let mut dag = linear_dag(3);
        // Fork at slot 2.
        dag.insert(root(9), Slot::new(3), root(2)).unwrap();

        assert!(dag.is_descendant(&root(0), &root(3)));
        assert!(dag.is_descendant(&root(2), &root(9)));
        assert!(!dag.is_descendant(&root(3), &root(9)));
        assert_eq!(dag.common_ancestor(&root(3), &root(9)), Some(root(2)));
        assert_eq!(dag.ancestor_at_slot(&root(9), Slot::new(1)), Some(root(1)));
    }

    #[test]
    fn prune_discards_non_finalized_branches() {
        let mut dag = linear_dag(3);
        dag.insert(root(9), Slot::new(2), root(1)).unwrap();
        dag.set_head(root(3)).unwrap();
        dag.set_finalized_checkpoint(Checkpoint {
            epoch: types::Epoch::new(1),
            root: root(2),
        })
        .unwrap();

        let removed = dag.prune();
        assert_eq!(removed, vec![root(0), root(1), root(9)]);
        assert!(dag.contains(&root(2)));
        assert!(dag.contains(&root(3)));
        assert_eq!(dag.head_root(), root(3));
        assert_eq!(dag.finalized_root(), root(2));
        // Ancestry still works after reindexing.
        assert!(dag.is_descendant(&root(2), &root(3)));
    }

    #[test]
    fn finalized_must_descend() {
        let mut dag = linear_dag(2);
        dag.insert(root(9), Slot::new(2), root(1)).unwrap();
        dag.set_finalized_checkpoint(Checkpoint {
            epoch: types::Epoch::new(1),
            root: root(2),
        })
        .unwrap();
        assert_eq!(
            dag.set_finalized_checkpoint(Checkpoint {
                epoch: types::Epoch::new(2),
                root: root(9),
            }),
            Err(DagError::FinalizedAncestryViolation)
        );
    }
}
