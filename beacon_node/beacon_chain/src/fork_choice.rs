use crate::chain_config::ForkChoiceVersion;
use crate::chain_dag::ChainDag;
use std::collections::HashMap;
use types::{Hash256, Slot};

/// A validator's most recent head vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LatestMessage {
    root: Hash256,
    slot: Slot,
}

#[derive(Debug, Clone, Copy)]
struct QueuedAttestation {
    validator_index: u64,
    root: Hash256,
    slot: Slot,
}

/// LMD-GHOST head selection over the block DAG.
///
/// Votes are keyed by validator index and weighted by effective balance at
/// head-selection time. Only the block processor task mutates this structure.
pub struct ForkChoice {
    version: ForkChoiceVersion,
    latest_messages: HashMap<u64, LatestMessage>,
    /// Attestations waiting for their slot to pass before they may influence
    /// head selection (`Stable` behaviour).
    queued: Vec<QueuedAttestation>,
    current_slot: Slot,
}

impl ForkChoice {
    pub fn new(version: ForkChoiceVersion) -> Self {
        Self {
            version,
            latest_messages: HashMap::new(),
            queued: vec![],
            current_slot: Slot::new(0),
        }
    }

    /// Advance the fork-choice clock, draining any queued attestations whose
    /// slot has passed.
    pub fn on_tick(&mut self, slot: Slot) {
        if slot <= self.current_slot {
            return;
        }
        self.current_slot = slot;
        let (ready, pending): (Vec<_>, Vec<_>) =
            self.queued.drain(..).partition(|a| a.slot < slot);
        self.queued = pending;
        for attestation in ready {
            self.apply_vote(attestation.validator_index, attestation.root, attestation.slot);
        }
    }

    /// Record a head vote.
    pub fn process_attestation(&mut self, validator_index: u64, root: Hash256, slot: Slot) {
        let defer = match self.version {
            ForkChoiceVersion::Stable => slot >= self.current_slot,
            ForkChoiceVersion::Pr3431 => slot > self.current_slot,
        };
        if defer {
            self.queued.push(QueuedAttestation {
                validator_index,
                root,
                slot,
            });
        } else {
            self.apply_vote(validator_index, root, slot);
        }
    }

    fn apply_vote(&mut self, validator_index: u64, root: Hash256, slot: Slot) {
        let entry = self
            .latest_messages
            .entry(validator_index)
            .or_insert(LatestMessage { root, slot });
        if slot >= entry.slot {
            *entry = LatestMessage { root, slot };
        }
    }

    /// Select the head: walk down from the finalized block picking the
    /// heaviest child, breaking ties toward the lower root.
    ///
    /// `effective_balances` is indexed by validator index; votes from
    /// validators outside it or for unknown blocks carry no weight.
    pub fn get_head(&self, dag: &ChainDag, effective_balances: &[u64]) -> Hash256 {
        // Arena order is topological, so subtree weights accumulate in one
        // reverse pass.
        let node_count = dag.block_count();
        let mut weights = vec![0u64; node_count];
        let mut parents = vec![None; node_count];
        let mut roots = vec![Hash256::zero(); node_count];
        for (index, (root, _slot, parent)) in dag.topological_iter().enumerate() {
            parents[index] = parent;
            roots[index] = root;
        }

        for (validator_index, message) in &self.latest_messages {
            let Some(target) = dag.index_of(&message.root) else {
                continue;
            };
            let balance = effective_balances
                .get(*validator_index as usize)
                .copied()
                .unwrap_or(0);
            weights[target] = weights[target].saturating_add(balance);
        }
        for index in (1..node_count).rev() {
            if let Some(parent) = parents[index] {
                weights[parent] = weights[parent].saturating_add(weights[index]);
            }
        }

        let mut head = dag
            .index_of(&dag.finalized_root())
            .unwrap_or(0);
        loop {
            let children: Vec<usize> = dag
                .children_of(&roots[head])
                .iter()
                .filter_map(|r| dag.index_of(r))
                .collect();
            let Some(best) = children.into_iter().min_by(|a, b| {
                weights[*b]
                    .cmp(&weights[*a])
                    .then_with(|| roots[*a].cmp(&roots[*b]))
            }) else {
                return roots[head];
            };
            head = best;
        }
    }

    /// Forget votes for blocks that were pruned away.
    pub fn prune(&mut self, dag: &ChainDag) {
        self.latest_messages.retain(|_, m| dag.contains(&m.root));
        self.queued.retain(|a| dag.contains(&a.root));
    }

    pub fn queued_attestation_count(&self) -> usize {
        self.queued.len()
    }

    pub fn latest_message_count(&self) -> usize {
        self.latest_messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Checkpoint, Epoch};

    fn root(b: u8) -> Hash256 {
        Hash256::repeat_byte(b)
    }

    fn dag_with_fork() -> ChainDag {
        // 0 <- 1 <- 2
        //       \-- 3
        let mut dag = ChainDag::new(
            root(0),
            Slot::new(0),
            Checkpoint {
                epoch: Epoch::new(0),
                root: root(0),
            },
        );
        dag.insert(root(1), Slot::new(1), root(0)).unwrap();
        dag.insert(root(2), Slot::new(2), root(1)).unwrap();
        dag.insert(root(3), Slot::new(2), root(1)).unwrap();
        dag
    }

    #[test]
    fn heavier_branch_wins() {
        let dag = dag_with_fork();
        let mut fc = ForkChoice::new(ForkChoiceVersion::Stable);
        fc.on_tick(Slot::new(5));
        fc.process_attestation(0, root(2), Slot::new(2));
        fc.process_attestation(1, root(3), Slot::new(2));
        fc.process_attestation(2, root(3), Slot::new(2));
        let balances = vec![32; 3];
        assert_eq!(fc.get_head(&dag, &balances), root(3));
    }

    #[test]
    fn equal_weight_ties_break_to_lower_root() {
        let dag = dag_with_fork();
        let mut fc = ForkChoice::new(ForkChoiceVersion::Stable);
        fc.on_tick(Slot::new(5));
        fc.process_attestation(0, root(2), Slot::new(2));
        fc.process_attestation(1, root(3), Slot::new(2));
        let balances = vec![32; 2];
        // root(2) < root(3) bytewise.
        assert_eq!(fc.get_head(&dag, &balances), root(2));
    }

    #[test]
    fn zero_votes_still_selects_a_leaf() {
        let dag = dag_with_fork();
        let fc = ForkChoice::new(ForkChoiceVersion::Stable);
        assert_eq!(fc.get_head(&dag, &[]), root(2));
    }

    #[test]
    fn stable_defers_current_slot_votes() {
        let dag = dag_with_fork();
        let mut fc = ForkChoice::new(ForkChoiceVersion::Stable);
        fc.on_tick(Slot::new(2));
        fc.process_attestation(0, root(3), Slot::new(2));
        assert_eq!(fc.queued_attestation_count(), 1);
        // The vote carries no weight yet.
        assert_eq!(fc.get_head(&dag, &[32]), root(2));
        fc.on_tick(Slot::new(3));
        assert_eq!(fc.queued_attestation_count(), 0);
        assert_eq!(fc.get_head(&dag, &[32]), root(3));
    }

    #[test]
    fn pr3431_applies_current_slot_votes() {
        let dag = dag_with_fork();
        let mut fc = ForkChoice::new(ForkChoiceVersion::Pr3431);
        fc.on_tick(Slot::new(2));
        fc.process_attestation(0, root(3), Slot::new(2));
        assert_eq!(fc.queued_attestation_count(), 0);
        assert_eq!(fc.get_head(&dag, &[32]), root(3));
    }

    #[test]
    fn later_vote_replaces_earlier() {
        let dag = dag_with_fork();
        let mut fc = ForkChoice::new(ForkChoiceVersion::Stable);
        fc.on_tick(Slot::new(5));
        fc.process_attestation(0, root(2), Slot::new(2));
        fc.process_attestation(0, root(3), Slot::new(3));
        assert_eq!(fc.get_head(&dag, &[32]), root(3));
        assert_eq!(fc.latest_message_count(), 1);
    }
}
