use crate::duties::DutyDispatcher;
use crate::metrics;
use beacon_chain::store::Store;
use beacon_chain::{BeaconChain, BeaconChainTypes, HistoryMode};
use network::{GossipController, SyncStatus};
use parking_lot::Mutex;
use slog::{debug, error, info, warn, Logger};
use slot_clock::SlotClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_executor::{ShutdownReason, TaskExecutor};
use types::{Epoch, EthSpec, Slot};

/// Drives the node from the wall clock: a per-slot loop doing the heavy
/// lifting and a one-second loop for housekeeping and liveness metrics.
///
/// Within a slot the ordering is strict: duties run before the slot-end
/// sequence, and the slot-end steps run in a fixed order so gossip state for
/// slot `s + 1` is always in place before the clock reaches it.
pub struct SlotScheduler<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
    duties: Arc<DutyDispatcher<T>>,
    gossip: Mutex<GossipController<T>>,
    sync_status: Arc<SyncStatus>,
    executor: TaskExecutor,
    stop_at_epoch: Option<Epoch>,
    stop_at_synced_epoch: Option<Epoch>,
    last_pruned_finalized_epoch: Mutex<Epoch>,
    doppelganger_armed: AtomicBool,
    log: Logger,
}

impl<T: BeaconChainTypes> SlotScheduler<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<BeaconChain<T>>,
        duties: Arc<DutyDispatcher<T>>,
        gossip: GossipController<T>,
        sync_status: Arc<SyncStatus>,
        executor: TaskExecutor,
        stop_at_epoch: Option<Epoch>,
        stop_at_synced_epoch: Option<Epoch>,
        log: Logger,
    ) -> Self {
        Self {
            chain,
            duties,
            gossip: Mutex::new(gossip),
            sync_status,
            executor,
            stop_at_epoch,
            stop_at_synced_epoch,
            last_pruned_finalized_epoch: Mutex::new(Epoch::new(0)),
            doppelganger_armed: AtomicBool::new(false),
            log,
        }
    }

    /// Sleep to each slot boundary and run the slot.
    pub async fn run_slot_loop(self: Arc<Self>) {
        let mut last_slot = self.chain.wall_slot();
        loop {
            match self.chain.slot_clock.duration_to_next_slot() {
                Some(duration) => tokio::time::sleep(duration).await,
                None => {
                    // Clock unreadable (e.g. before genesis); try again soon.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }
            let wall_slot = self.chain.wall_slot();
            self.on_slot_start(wall_slot, last_slot).await;
            last_slot = wall_slot;
        }
    }

    pub async fn on_slot_start(&self, wall_slot: Slot, last_slot: Slot) {
        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let epoch = wall_slot.epoch(slots_per_epoch);
        metrics::set_gauge(&metrics::CURRENT_SLOT, wall_slot.as_u64() as i64);
        info!(
            self.log,
            "Slot start";
            "slot" => wall_slot,
            "epoch" => epoch,
            "head_slot" => self.chain.head_slot(),
            "finalized_epoch" => self.chain.finalized_checkpoint().epoch,
        );

        if let Some(stop_at) = self.stop_at_epoch {
            if epoch >= stop_at {
                info!(self.log, "Target epoch reached, stopping"; "epoch" => epoch);
                self.executor
                    .shutdown(ShutdownReason::Success("--stop-at-epoch reached"));
                return;
            }
        }
        self.check_finality_lag(epoch);

        self.chain.recompute_head_at_slot(wall_slot);

        // Doppelganger detection arms the first time the node is synced with
        // gossip live; a validator only signs after a clean listening epoch.
        if self.sync_status.is_synced() && !self.doppelganger_armed.swap(true, Ordering::Relaxed) {
            self.duties.arm_doppelganger_detection(epoch);
        }

        self.duties
            .handle_validator_duties(last_slot, wall_slot)
            .await;

        self.on_slot_end(wall_slot).await;
    }

    /// The slot-end sequence. Step order is load-bearing: pruning must not
    /// race duty propagation, and gossip for the next slot must be settled
    /// before its boundary.
    pub async fn on_slot_end(&self, slot: Slot) {
        let slots_per_epoch = T::EthSpec::slots_per_epoch();
        let slot_duration = self.chain.slot_clock.slot_duration();
        let next_slot = slot + 1;

        // Let aggregate propagation finish: two thirds in, plus half of the
        // remaining third.
        let aggregate_cutoff = slot_duration * 2 / 3 + slot_duration / 6;
        self.sleep_until_offset(slot, aggregate_cutoff).await;

        // Slashing-protection pruning whenever finalization advanced.
        let finalized_epoch = self.chain.finalized_checkpoint().epoch;
        let finality_advanced = {
            let mut last = self.last_pruned_finalized_epoch.lock();
            let advanced = finalized_epoch > *last;
            *last = finalized_epoch;
            advanced
        };
        if finality_advanced && self.chain.config.history_mode == HistoryMode::Prune {
            self.duties.prune_slashing_protection(finalized_epoch);
        }

        self.chain.prune_state_caches_and_fork_choice();

        // History and blob pruning, kept off the event loop; skipped right
        // before an epoch boundary, which has enough to do already.
        if self.chain.config.history_mode == HistoryMode::Prune && next_slot % slots_per_epoch != 0
        {
            let chain = self.chain.clone();
            let result = self
                .executor
                .spawn_blocking_handle(
                    move || {
                        chain.prune_history()?;
                        chain.prune_blobs(slot)
                    },
                    "prune_history",
                )
                .await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(self.log, "Pruning failed"; "error" => %e),
                Err(e) => error!(self.log, "Pruning task panicked"; "error" => %e),
            }
        }

        // Flush the write-ahead log so the slot's imports survive a crash.
        if let Err(e) = self.chain.store.checkpoint() {
            warn!(self.log, "Database checkpoint failed"; "error" => %e);
        }

        // Per-slot duty bookkeeping, including epoch-boundary fee-recipient
        // cleanup.
        self.duties.prune_slot_caches(slot);

        // Next-epoch duty refresh, only from a synced, execution-valid head.
        if self.chain.head_distance() <= 1
            && self
                .chain
                .execution
                .is_execution_valid(self.chain.head_root())
        {
            let head_state = self.chain.head_state_snapshot();
            let next_epoch = slot.epoch(slots_per_epoch) + 1;
            let fork = self.chain.spec.fork_name_at_epoch(next_epoch);
            let source = self.chain.action_tracker.lock().maybe_update_next_epoch(
                &head_state,
                fork,
                next_epoch,
            );
            debug!(self.log, "Refreshed next-epoch duties"; "source" => ?source, "epoch" => next_epoch);
        }

        // Pre-stage the next slot's state in the quiet tail of the slot.
        self.sleep_until_offset(slot, slot_duration.saturating_sub(Duration::from_secs(1)))
            .await;
        self.chain.advance_clearance_state(next_slot);

        self.chain.action_tracker.lock().update_slot(next_slot);

        let mut gossip = self.gossip.lock();
        gossip.update_sync_committee_topics(next_slot);
        gossip.update_gossip_status(next_slot);
    }

    /// The one-second loop: liveness metrics and the synced-epoch stop.
    pub async fn run_second_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();
        loop {
            interval.tick().await;
            // A tick that took much longer than a second means the event
            // loop was starved.
            metrics::observe(&metrics::TICKS_DELAY, last_tick.elapsed().as_secs_f64());
            last_tick = Instant::now();
            update_thread_gauge();

            if let Some(target) = self.stop_at_synced_epoch {
                let epoch = self.chain.wall_slot().epoch(T::EthSpec::slots_per_epoch());
                if self.sync_status.is_synced() && epoch >= target {
                    info!(self.log, "Synced to target epoch, stopping"; "epoch" => epoch);
                    self.executor
                        .shutdown(ShutdownReason::Success("--stop-at-synced-epoch reached"));
                    return;
                }
            }
        }
    }

    /// Abort with a diagnostic when finality lags beyond the configured
    /// bound under strict verification; otherwise nothing is enforced.
    fn check_finality_lag(&self, epoch: Epoch) {
        if !self.chain.config.strict_verification {
            return;
        }
        let finalized_epoch = self.chain.finalized_checkpoint().epoch;
        let lag = epoch.as_u64().saturating_sub(finalized_epoch.as_u64());
        assert!(
            lag <= self.chain.config.max_finality_lag_epochs,
            "finalization lag of {lag} epochs exceeds the configured bound"
        );
    }

    async fn sleep_until_offset(&self, slot: Slot, offset: Duration) {
        let Some(start) = self.chain.slot_clock.start_of(slot) else {
            return;
        };
        let Some(now) = self.chain.slot_clock.now_duration() else {
            return;
        };
        if let Some(remaining) = (start + offset).checked_sub(now) {
            tokio::time::sleep(remaining).await;
        }
    }
}

fn update_thread_gauge() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            if let Some(threads) = status
                .lines()
                .find_map(|line| line.strip_prefix("Threads:"))
                .and_then(|v| v.trim().parse::<i64>().ok())
            {
                metrics::set_gauge(&metrics::PROCESS_THREADS, threads);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duties::{MemorySlashingProtection, NullSigner, ValidatorStore};
    use beacon_chain::test_utils::{test_logger, TestHarness};
    use futures::StreamExt;
    use network::{GossipController, SyncState};
    use slot_clock::SlotClock;
    use tokio::sync::mpsc;

    fn test_executor() -> (
        TaskExecutor,
        exit_future::Signal,
        futures::channel::mpsc::Receiver<ShutdownReason>,
    ) {
        let (signal, exit) = exit_future::signal();
        let (shutdown_tx, shutdown_rx) = futures::channel::mpsc::channel(1);
        let executor = TaskExecutor::new(
            tokio::runtime::Handle::current(),
            exit,
            test_logger(),
            shutdown_tx,
        );
        (executor, signal, shutdown_rx)
    }

    fn scheduler_fixture(
        harness: &TestHarness,
        executor: TaskExecutor,
        stop_at_epoch: Option<Epoch>,
    ) -> Arc<SlotScheduler<beacon_chain::test_utils::TestTypes>> {
        let store = Arc::new(ValidatorStore::new(
            Arc::new(MemorySlashingProtection::default()),
            Arc::new(NullSigner),
        ));
        let (command_tx, _command_rx) = mpsc::unbounded_channel();
        let duties = Arc::new(DutyDispatcher::new(
            harness.chain.clone(),
            store,
            command_tx.clone(),
            false,
            test_logger(),
        ));
        let gossip = GossipController::new(
            harness.chain.clone(),
            command_tx,
            false,
            test_logger(),
        );
        let status = Arc::new(SyncStatus::new());
        status.set(SyncState::Synced);
        Arc::new(SlotScheduler::new(
            harness.chain.clone(),
            duties,
            gossip,
            status,
            executor,
            stop_at_epoch,
            None,
            test_logger(),
        ))
    }

    #[tokio::test]
    async fn slot_end_settles_gossip_for_the_next_slot() {
        let harness = TestHarness::deneb_with_anchor(Slot::new(100));
        let (executor, _signal, _shutdown_rx) = test_executor();
        let scheduler = scheduler_fixture(&harness, executor, None);

        // Position the clock past the end of slot 101 so the intra-slot
        // waits resolve immediately.
        let start_of_102 = harness.chain.slot_clock.start_of(Slot::new(102)).unwrap();
        harness.clock.set_current_time(start_of_102);

        let checkpoints_before = harness.chain.store.checkpoint_count();
        scheduler.on_slot_end(Slot::new(101)).await;

        // Synced and close to the head: gossip must be live for slot 102.
        assert!(!scheduler.gossip.lock().gossip_state().is_empty());
        // The write-ahead log was flushed exactly once for the slot.
        assert_eq!(harness.chain.store.checkpoint_count(), checkpoints_before + 1);

        // Running the same slot end again leaves gossip untouched.
        let state_before = scheduler.gossip.lock().gossip_state().clone();
        scheduler.on_slot_end(Slot::new(101)).await;
        assert_eq!(scheduler.gossip.lock().gossip_state(), &state_before);
    }

    #[tokio::test]
    async fn stop_at_epoch_requests_shutdown() {
        let harness = TestHarness::deneb_with_anchor(Slot::new(100));
        let (executor, _signal, mut shutdown_rx) = test_executor();
        // Slot 101 is inside epoch 3 (mainnet slots-per-epoch).
        let scheduler = scheduler_fixture(&harness, executor, Some(Epoch::new(3)));

        scheduler.on_slot_start(Slot::new(101), Slot::new(100)).await;
        match shutdown_rx.next().await {
            Some(ShutdownReason::Success(_)) => {}
            other => panic!("expected graceful shutdown, got {other:?}"),
        }
    }
}

