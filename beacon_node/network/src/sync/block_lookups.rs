use crate::metrics;
use crate::service::{PeerAction, SyncNetwork};
use crate::sync::SyncStatus;
use beacon_chain::{
    BeaconChain, BeaconChainTypes, BlobFetchRecord, BlockError, BlockProcessorHandle, BlockSource,
    QuarantineNotification,
};
use slog::{debug, trace, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use types::{BlobIdentifier, Hash256};

/// Give up on a root after this many failed download/processing attempts.
pub const MAX_LOOKUP_ATTEMPTS: u8 = 3;
/// How many ancestors to chase before conceding the gap to range sync.
pub const PARENT_CHAIN_DEPTH_LIMIT: u64 = 32;

#[derive(Default)]
struct LookupAttempts {
    failed_downloading: u8,
    failed_processing: u8,
}

impl LookupAttempts {
    fn total(&self) -> u8 {
        self.failed_downloading + self.failed_processing
    }
}

/// Fetches individual blocks and blob gaps by root, driven by quarantine
/// notifications from the block processor.
///
/// Suspended while range sync is downloading: the same blocks would arrive
/// through the range anyway, and duplicate traffic wastes peer budget.
pub struct RequestManager<T: BeaconChainTypes, P> {
    chain: Arc<BeaconChain<T>>,
    network: Arc<P>,
    processor: BlockProcessorHandle<T::EthSpec>,
    status: Arc<SyncStatus>,
    attempts: HashMap<Hash256, LookupAttempts>,
    log: Logger,
}

impl<T, P> RequestManager<T, P>
where
    T: BeaconChainTypes,
    P: SyncNetwork<T::EthSpec>,
{
    pub fn new(
        chain: Arc<BeaconChain<T>>,
        network: Arc<P>,
        processor: BlockProcessorHandle<T::EthSpec>,
        status: Arc<SyncStatus>,
        log: Logger,
    ) -> Self {
        Self {
            chain,
            network,
            processor,
            status,
            attempts: HashMap::new(),
            log,
        }
    }

    pub async fn run(
        mut self,
        mut notifications: mpsc::UnboundedReceiver<QuarantineNotification>,
    ) {
        while let Some(notification) = notifications.recv().await {
            if self.status.is_syncing() {
                // Range sync owns the gap; the quarantined blocks will
                // resolve as the range catches up.
                trace!(self.log, "Lookup suppressed during range sync");
                continue;
            }
            match notification {
                QuarantineNotification::UnknownParent { parent_root, .. } => {
                    self.search_parent_chain(parent_root).await;
                }
                QuarantineNotification::MissingBlobs(record) => {
                    self.fetch_missing_blobs(record).await;
                }
                QuarantineNotification::BlockImported { block_root, .. } => {
                    self.attempts.remove(&block_root);
                }
            }
            metrics::set_gauge(&metrics::LOOKUPS_PENDING, self.attempts.len() as i64);
        }
    }

    /// Walk up a chain of unknown ancestors, fetching each by root, until a
    /// block connects or the chain proves deeper than lookups should chase.
    async fn search_parent_chain(&mut self, first_missing: Hash256) {
        let mut target = first_missing;
        for _ in 0..PARENT_CHAIN_DEPTH_LIMIT {
            if self.chain.block_known(&target) {
                return;
            }
            match self.lookup_block(target).await {
                LookupOutcome::NeedsParent(parent_root) => target = parent_root,
                LookupOutcome::Done => return,
            }
        }
        debug!(
            self.log,
            "Parent chain exceeds lookup depth";
            "first_missing" => ?first_missing,
        );
    }

    async fn lookup_block(&mut self, block_root: Hash256) -> LookupOutcome {
        if self
            .attempts
            .get(&block_root)
            .map_or(false, |a| a.total() >= MAX_LOOKUP_ATTEMPTS)
        {
            debug!(self.log, "Lookup abandoned after repeated failures"; "root" => ?block_root);
            self.attempts.remove(&block_root);
            return LookupOutcome::Done;
        }

        let rpc_block = match self.network.block_by_root(block_root).await {
            Ok(Some(rpc_block)) => rpc_block,
            Ok(None) => {
                self.attempts.entry(block_root).or_default().failed_downloading += 1;
                return LookupOutcome::Done;
            }
            Err(e) => {
                debug!(self.log, "Lookup request failed"; "root" => ?block_root, "error" => %e);
                self.attempts.entry(block_root).or_default().failed_downloading += 1;
                return LookupOutcome::Done;
            }
        };

        let received_root = rpc_block.block.canonical_root();
        if received_root != block_root {
            self.network.report_peer(
                rpc_block.peer,
                PeerAction::LowToleranceError,
                "block root mismatch",
            );
            self.attempts.entry(block_root).or_default().failed_downloading += 1;
            return LookupOutcome::Done;
        }

        match self
            .processor
            .process_block(BlockSource::Lookup, rpc_block.block, rpc_block.blobs, false)
            .await
        {
            Ok(_) | Err(BlockError::Duplicate) => {
                self.attempts.remove(&block_root);
                LookupOutcome::Done
            }
            // The fetched block was quarantined in turn: a missing-parent
            // result naming another root extends the ancestor chain, while
            // one naming this block means its blobs have not arrived (the
            // processor always defers, it never faults the block).
            Err(BlockError::MissingParent(parent_root)) if parent_root != block_root => {
                LookupOutcome::NeedsParent(parent_root)
            }
            Err(BlockError::MissingParent(_)) => LookupOutcome::Done,
            Err(e) => {
                if e.is_peer_fault() {
                    self.network.report_peer(
                        rpc_block.peer,
                        PeerAction::LowToleranceError,
                        "invalid looked-up block",
                    );
                }
                self.attempts.entry(block_root).or_default().failed_processing += 1;
                LookupOutcome::Done
            }
        }
    }

    /// Fill a blob gap and re-drive the waiting block.
    async fn fetch_missing_blobs(&mut self, record: BlobFetchRecord) {
        if record.indices.is_empty() {
            return;
        }
        let blob_ids: Vec<BlobIdentifier> = record
            .indices
            .iter()
            .map(|index| BlobIdentifier {
                block_root: record.block_root,
                index: *index,
            })
            .collect();

        let blobs = match self.network.blobs_by_root(blob_ids).await {
            Ok(blobs) => blobs,
            Err(e) => {
                debug!(
                    self.log,
                    "Blob lookup failed";
                    "root" => ?record.block_root,
                    "error" => %e,
                );
                return;
            }
        };

        {
            let mut quarantine = self.chain.blob_quarantine.lock();
            for blob in blobs {
                if blob.block_root() == record.block_root {
                    quarantine.put(blob);
                }
            }
        }

        let waiting = self
            .chain
            .block_quarantine
            .lock()
            .pop_blobless(&record.block_root);
        if let Some(block) = waiting {
            // If the set is still incomplete the block re-enters the
            // blobless quarantine and a fresh record is emitted.
            let _ = self
                .processor
                .process_block(BlockSource::Lookup, block, None, false)
                .await;
        }
    }
}

enum LookupOutcome {
    /// The fetched block is itself waiting on an ancestor.
    NeedsParent(Hash256),
    /// Nothing further to chase for this root.
    Done,
}
