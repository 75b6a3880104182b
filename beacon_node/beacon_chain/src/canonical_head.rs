use crate::beacon_chain::HeadInfo;
use crate::events::{HeadEvent, ReorgEvent};
use crate::metrics;
use crate::{BeaconChain, BeaconChainTypes};
use parking_lot::RwLock;
use slog::{debug, warn};
use types::{EthSpec, Hash256, Slot};

/// The canonical head reference derived from fork choice.
///
/// Reads are cheap snapshots; only head recomputation writes.
pub struct CanonicalHead {
    snapshot: RwLock<HeadInfo>,
}

impl CanonicalHead {
    pub fn new(root: Hash256, slot: Slot) -> Self {
        Self {
            snapshot: RwLock::new(HeadInfo { root, slot }),
        }
    }

    pub fn cached_head(&self) -> HeadInfo {
        *self.snapshot.read()
    }

    fn update(&self, root: Hash256, slot: Slot) {
        *self.snapshot.write() = HeadInfo { root, slot };
    }
}

impl<T: BeaconChainTypes> BeaconChain<T> {
    /// Re-run fork choice and move the head if it changed, emitting head and
    /// reorg events.
    ///
    /// Called after every accepted block and at each slot boundary.
    pub fn recompute_head_at_slot(&self, wall_slot: Slot) {
        let balances = self.head_state.read().effective_balances();

        let mut dag = self.dag.write();
        let new_head_root = {
            let mut fork_choice = self.fork_choice.write();
            fork_choice.on_tick(wall_slot);
            fork_choice.get_head(&dag, &balances)
        };

        let old_head = self.canonical_head.cached_head();
        if new_head_root == old_head.root {
            return;
        }
        let Some(new_head_slot) = dag.slot_of(&new_head_root) else {
            warn!(self.log, "Fork choice returned unknown head"; "root" => ?new_head_root);
            return;
        };

        let is_extension = dag.is_descendant(&old_head.root, &new_head_root);
        let common_ancestor = if is_extension {
            None
        } else {
            dag.common_ancestor(&old_head.root, &new_head_root)
        };

        if dag.set_head(new_head_root).is_err() {
            // Unreachable while fork choice only returns DAG members.
            warn!(self.log, "Unable to move DAG head"; "root" => ?new_head_root);
            return;
        }
        self.canonical_head.update(new_head_root, new_head_slot);
        drop(dag);

        metrics::inc_counter(&metrics::HEAD_CHANGES);
        metrics::set_gauge(&metrics::HEAD_SLOT, new_head_slot.as_u64() as i64);

        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let epoch_transition =
            new_head_slot.epoch(slots_per_epoch) > old_head.slot.epoch(slots_per_epoch);
        self.event_bus.on_new_head(HeadEvent {
            slot: new_head_slot,
            block: new_head_root,
            previous_head: old_head.root,
            epoch_transition,
        });

        if let Some(ancestor) = common_ancestor {
            let ancestor_slot = self.dag.read().slot_of(&ancestor).unwrap_or(old_head.slot);
            let depth = old_head.slot.as_u64().saturating_sub(ancestor_slot.as_u64());
            metrics::inc_counter(&metrics::REORGS_DETECTED);
            debug!(
                self.log,
                "Beacon chain re-org";
                "previous_head" => ?old_head.root,
                "new_head" => ?new_head_root,
                "reorg_depth" => depth,
            );
            self.event_bus.on_reorg(ReorgEvent {
                slot: new_head_slot,
                depth,
                old_head: old_head.root,
                new_head: new_head_root,
                common_ancestor: ancestor,
            });
        }

        let finalized_root = self.finalized_checkpoint().root;
        self.execution
            .notify_forkchoice_updated(new_head_root, finalized_root);
    }
}
