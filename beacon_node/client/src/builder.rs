use crate::config::ClientConfig;
use crate::duties::{DutyDispatcher, ValidatorStore};
use crate::scheduler::SlotScheduler;
use crate::{Client, NodeStatusFlag};
use beacon_chain::{
    BeaconChain, BeaconChainTypes, BlockProcessor, BlockProcessorHandle, QuarantineNotification,
};
use network::{
    BackfillVerifier, GossipController, NetworkCommand, RangeSync, RequestManager, SyncDirection,
    SyncNetwork, SyncStatus,
};
use slog::{info, Logger};
use std::sync::Arc;
use task_executor::TaskExecutor;
use tokio::sync::mpsc;
use types::Epoch;

/// Stage-by-stage construction of a running node.
///
/// Components with back-references are never wired by mutating a shared
/// slot after the fact: each stage hands the next one channels or handles,
/// so every dependency is explicit and present before use.
pub struct ClientBuilder<T: BeaconChainTypes> {
    executor: TaskExecutor,
    config: ClientConfig,
    log: Logger,
    chain: Option<Arc<BeaconChain<T>>>,
    processor_handle: Option<BlockProcessorHandle<T::EthSpec>>,
    quarantine_notifications: Option<mpsc::UnboundedReceiver<QuarantineNotification>>,
    command_tx: mpsc::UnboundedSender<NetworkCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<NetworkCommand>>,
    sync_status: Arc<SyncStatus>,
    duties: Option<Arc<DutyDispatcher<T>>>,
}

impl<T: BeaconChainTypes> ClientBuilder<T> {
    pub fn new(executor: TaskExecutor, config: ClientConfig, log: Logger) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            executor,
            config,
            log,
            chain: None,
            processor_handle: None,
            quarantine_notifications: None,
            command_tx,
            command_rx: Some(command_rx),
            sync_status: Arc::new(SyncStatus::new()),
            duties: None,
        }
    }

    /// Install the chain and start the block-processing queue.
    pub fn beacon_chain(mut self, chain: Arc<BeaconChain<T>>) -> Self {
        let (processor, handle, work_rx, notification_rx) = BlockProcessor::new(chain.clone());
        self.executor.spawn(processor.run(work_rx), "block_processor");
        self.chain = Some(chain);
        self.processor_handle = Some(handle);
        self.quarantine_notifications = Some(notification_rx);
        self
    }

    /// Start range sync (both directions) and the by-root request manager
    /// against the given peer-request provider.
    pub fn network<P: SyncNetwork<T::EthSpec>>(
        mut self,
        provider: Arc<P>,
    ) -> Result<Self, String> {
        let chain = self
            .chain
            .clone()
            .ok_or("network requires a beacon chain")?;
        let handle = self
            .processor_handle
            .clone()
            .ok_or("network requires the block processor")?;
        let notifications = self
            .quarantine_notifications
            .take()
            .ok_or("network may only be wired once")?;

        let forward = RangeSync::new(
            chain.clone(),
            provider.clone(),
            handle.clone(),
            self.sync_status.clone(),
            SyncDirection::Forward,
            self.log.clone(),
        );
        self.executor.spawn(forward.run(), "range_sync");

        let backfill = RangeSync::new(
            chain.clone(),
            provider.clone(),
            BackfillVerifier::new(chain.clone()),
            self.sync_status.clone(),
            SyncDirection::Backward,
            self.log.clone(),
        );
        self.executor.spawn(backfill.run(), "backfill_sync");

        let request_manager = RequestManager::new(
            chain,
            provider,
            handle,
            self.sync_status.clone(),
            self.log.clone(),
        );
        self.executor
            .spawn(request_manager.run(notifications), "request_manager");
        Ok(self)
    }

    /// Attach local validators and their duty dispatcher.
    pub fn validators(mut self, store: Arc<ValidatorStore>) -> Result<Self, String> {
        let chain = self
            .chain
            .clone()
            .ok_or("validators require a beacon chain")?;
        self.duties = Some(Arc::new(DutyDispatcher::new(
            chain,
            store,
            self.command_tx.clone(),
            self.config.doppelganger_detection,
            self.log.clone(),
        )));
        Ok(self)
    }

    /// Start the slot and second loops and hand back the assembled client.
    pub fn build(mut self) -> Result<Client<T>, String> {
        let chain = self.chain.ok_or("client requires a beacon chain")?;
        let duties = self.duties.ok_or("client requires a validator stage")?;
        let gossip = GossipController::new(
            chain.clone(),
            self.command_tx.clone(),
            self.config.subscribe_all_subnets,
            self.log.clone(),
        );
        let scheduler = Arc::new(SlotScheduler::new(
            chain.clone(),
            duties,
            gossip,
            self.sync_status.clone(),
            self.executor.clone(),
            self.config.stop_at_epoch.map(Epoch::new),
            self.config.stop_at_synced_epoch.map(Epoch::new),
            self.log.clone(),
        ));
        self.executor
            .spawn(scheduler.clone().run_slot_loop(), "slot_loop");
        self.executor
            .spawn(scheduler.run_second_loop(), "second_loop");

        info!(self.log, "Client initialized"; "network" => &self.config.network_name);
        Ok(Client {
            chain,
            network_commands: self.command_rx.take(),
            status: Arc::new(NodeStatusFlag::new()),
        })
    }
}
