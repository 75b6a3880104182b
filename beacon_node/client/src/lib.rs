pub mod builder;
pub mod config;
pub mod duties;
pub mod metrics;
pub mod scheduler;

use beacon_chain::store::Store;
use beacon_chain::{BeaconChain, BeaconChainTypes};
use network::NetworkCommand;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use builder::ClientBuilder;
pub use config::{ClientConfig, MetricsConfig, RestConfig, DEFAULT_DATA_DIR};
pub use duties::{
    DutyDispatcher, MemorySlashingProtection, NullSigner, SlashingProtection, ValidatorSigner,
    ValidatorStore,
};
pub use scheduler::SlotScheduler;

/// Process-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeStatus {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// Atomic holder for [`NodeStatus`]. Signal handlers only ever
/// compare-and-swap `Running -> Stopping`.
pub struct NodeStatusFlag(AtomicU8);

impl NodeStatusFlag {
    pub fn new() -> Self {
        Self(AtomicU8::new(NodeStatus::Starting as u8))
    }

    pub fn get(&self) -> NodeStatus {
        match self.0.load(Ordering::SeqCst) {
            0 => NodeStatus::Starting,
            1 => NodeStatus::Running,
            2 => NodeStatus::Stopping,
            _ => NodeStatus::Stopped,
        }
    }

    pub fn set(&self, status: NodeStatus) {
        self.0.store(status as u8, Ordering::SeqCst);
    }

    /// Transition `from -> to`; `false` if another writer got there first.
    pub fn transition(&self, from: NodeStatus, to: NodeStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for NodeStatusFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled beacon node.
///
/// Holds the chain and the channel the network substrate drains for
/// subscription/publish commands; dropping the client flushes the store.
pub struct Client<T: BeaconChainTypes> {
    chain: Arc<BeaconChain<T>>,
    network_commands: Option<mpsc::UnboundedReceiver<NetworkCommand>>,
    status: Arc<NodeStatusFlag>,
}

impl<T: BeaconChainTypes> Client<T> {
    pub fn beacon_chain(&self) -> Arc<BeaconChain<T>> {
        self.chain.clone()
    }

    /// The command stream for the network substrate. Yields once.
    pub fn take_network_commands(&mut self) -> Option<mpsc::UnboundedReceiver<NetworkCommand>> {
        self.network_commands.take()
    }

    pub fn status(&self) -> Arc<NodeStatusFlag> {
        self.status.clone()
    }
}

impl<T: BeaconChainTypes> Drop for Client<T> {
    fn drop(&mut self) {
        self.status.set(NodeStatus::Stopped);
        // Best-effort flush; the store also checkpoints every slot.
        let _ = self.chain.store.checkpoint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_single_shot() {
        let flag = NodeStatusFlag::new();
        assert_eq!(flag.get(), NodeStatus::Starting);
        flag.set(NodeStatus::Running);
        assert!(flag.transition(NodeStatus::Running, NodeStatus::Stopping));
        // A second signal must not move the state again.
        assert!(!flag.transition(NodeStatus::Running, NodeStatus::Stopping));
        assert_eq!(flag.get(), NodeStatus::Stopping);
    }
}
