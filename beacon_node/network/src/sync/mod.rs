pub mod block_lookups;
pub mod range_sync;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use types::Slot;

/// Where the node is in range sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Downloading a block range from `from` towards `to`.
    Syncing { from: Slot, to: Slot },
    /// The head is within tolerance of the wall clock.
    Synced,
    /// Filling in history behind the anchor.
    BackFilling { from: Slot },
    /// No peers can serve the range we need.
    Stalled,
}

/// Shared sync progress, written by the range-sync managers and read by the
/// request manager (which suspends itself while range sync is active) and
/// the gossip controller.
pub struct SyncStatus {
    state: RwLock<SyncState>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SyncState::Stalled),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    pub fn set(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Whether forward range sync is actively downloading.
    pub fn is_syncing(&self) -> bool {
        matches!(self.state(), SyncState::Syncing { .. })
    }

    pub fn is_synced(&self) -> bool {
        matches!(
            self.state(),
            SyncState::Synced | SyncState::BackFilling { .. }
        )
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}
