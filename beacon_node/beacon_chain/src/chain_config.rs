use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use types::Epoch;

/// How much chain history the node retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum HistoryMode {
    /// Retain all blocks and states back to genesis.
    Archive,
    /// Prune blocks and blobs outside the retention window.
    Prune,
}

/// Which fork-choice attestation-timing behaviour to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ForkChoiceVersion {
    /// Attestations begin to influence head selection from the slot after
    /// the one they were produced in.
    Stable,
    /// Attestations for the current slot are applied as soon as they are
    /// received.
    Pr3431,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub history_mode: HistoryMode,
    /// Promote consistency violations that would normally only be logged
    /// into process aborts.
    pub strict_verification: bool,
    pub fork_choice_version: ForkChoiceVersion,
    /// Maximum number of blocks held back for a missing parent or missing
    /// blobs.
    pub block_quarantine_capacity: usize,
    /// Maximum number of queued, unprocessed blocks.
    pub block_queue_capacity: usize,
    /// Abort with a diagnostic if finalization lags the wall clock by more
    /// than this many epochs while `strict_verification` is set.
    pub max_finality_lag_epochs: u64,
    /// Stop the node after the chain reaches this epoch.
    pub stop_at_epoch: Option<Epoch>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            history_mode: HistoryMode::Prune,
            strict_verification: false,
            fork_choice_version: ForkChoiceVersion::Stable,
            block_quarantine_capacity: 64,
            block_queue_capacity: 1_024,
            max_finality_lag_epochs: 128,
            stop_at_epoch: None,
        }
    }
}
