use strum::IntoStaticStr;
use types::Hash256;

/// The outcome of submitting a block for processing.
///
/// Of these, only `Invalid` indicates the sending peer is faulty.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum BlockError {
    /// The block failed state transition or carries a mismatched fork
    /// variant.
    ///
    /// ## Peer scoring
    ///
    /// The block is invalid and the peer is faulty.
    Invalid { reason: &'static str },

    /// The block's parent (or, post-Deneb, one of its blob sidecars) is not
    /// yet known; the block has been quarantined and will be retried when
    /// the missing dependency arrives.
    ///
    /// ## Peer scoring
    ///
    /// The peer is not necessarily faulty; we may simply not have the
    /// dependency yet.
    MissingParent(Hash256),

    /// The block is at or below the finalized slot and can never be part of
    /// the canonical chain.
    ///
    /// ## Peer scoring
    ///
    /// It's unclear if the block is valid, but it is useless to us.
    UnviableFork,

    /// The block is already known to the DAG.
    ///
    /// ## Peer scoring
    ///
    /// The peer is not faulty, but we do not re-process the block.
    Duplicate,

    /// The processing queue is full; the caller should back off and retry.
    ///
    /// ## Peer scoring
    ///
    /// The peer is not at fault.
    QueueFull,

    /// An internal error occurred while processing; validity was not
    /// determined.
    ///
    /// ## Peer scoring
    ///
    /// The peer is not at fault.
    Internal(String),
}

impl BlockError {
    /// Whether the error justifies down-scoring the sending peer.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, BlockError::Invalid { .. })
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for BlockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockError::Invalid { reason } => write!(f, "Invalid({reason})"),
            BlockError::MissingParent(root) => write!(f, "MissingParent({root:?})"),
            BlockError::Internal(e) => write!(f, "Internal({e})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invalid_is_peer_fault() {
        assert!(BlockError::Invalid { reason: "bad" }.is_peer_fault());
        for error in [
            BlockError::MissingParent(Hash256::zero()),
            BlockError::UnviableFork,
            BlockError::Duplicate,
            BlockError::QueueFull,
            BlockError::Internal("io".into()),
        ] {
            assert!(!error.is_peer_fault());
        }
    }
}
