use std::fmt;
use types::{EthSpec, ForkName, SubnetId, SyncSubnetId};

pub const TOPIC_PREFIX: &str = "eth2";
pub const SSZ_SNAPPY_ENCODING_POSTFIX: &str = "ssz_snappy";

/// The payload kind carried on a gossip topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GossipKind {
    BeaconBlock,
    BeaconAggregateAndProof,
    VoluntaryExit,
    ProposerSlashing,
    AttesterSlashing,
    Attestation(SubnetId),
    SyncCommitteeMessage(SyncSubnetId),
    SignedContributionAndProof,
    BlsToExecutionChange,
    BlobSidecar(u64),
}

impl fmt::Display for GossipKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GossipKind::BeaconBlock => write!(f, "beacon_block"),
            GossipKind::BeaconAggregateAndProof => write!(f, "beacon_aggregate_and_proof"),
            GossipKind::VoluntaryExit => write!(f, "voluntary_exit"),
            GossipKind::ProposerSlashing => write!(f, "proposer_slashing"),
            GossipKind::AttesterSlashing => write!(f, "attester_slashing"),
            GossipKind::Attestation(subnet) => write!(f, "beacon_attestation_{subnet}"),
            GossipKind::SyncCommitteeMessage(subnet) => write!(f, "sync_committee_{subnet}"),
            GossipKind::SignedContributionAndProof => {
                write!(f, "sync_committee_contribution_and_proof")
            }
            GossipKind::BlsToExecutionChange => write!(f, "bls_to_execution_change"),
            GossipKind::BlobSidecar(index) => write!(f, "blob_sidecar_{index}"),
        }
    }
}

/// A gossipsub topic: a fork digest qualifying a payload kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GossipTopic {
    pub fork_digest: [u8; 4],
    pub kind: GossipKind,
}

impl GossipTopic {
    pub fn new(fork_digest: [u8; 4], kind: GossipKind) -> Self {
        Self { fork_digest, kind }
    }
}

impl fmt::Display for GossipTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}",
            TOPIC_PREFIX,
            hex::encode(self.fork_digest),
            self.kind,
            SSZ_SNAPPY_ENCODING_POSTFIX
        )
    }
}

/// The always-on topics for a fork, excluding blocks (managed separately for
/// optimistic sync) and the dynamic attestation/sync-committee subnets.
pub fn core_topics_for_fork<E: EthSpec>(fork: ForkName, fork_digest: [u8; 4]) -> Vec<GossipTopic> {
    let mut kinds = vec![
        GossipKind::BeaconAggregateAndProof,
        GossipKind::VoluntaryExit,
        GossipKind::ProposerSlashing,
        GossipKind::AttesterSlashing,
    ];
    if fork.altair_enabled() {
        kinds.push(GossipKind::SignedContributionAndProof);
    }
    if fork.capella_enabled() {
        kinds.push(GossipKind::BlsToExecutionChange);
    }
    if fork.deneb_enabled() {
        for index in 0..E::max_blobs_per_block() as u64 {
            kinds.push(GossipKind::BlobSidecar(index));
        }
    }
    kinds
        .into_iter()
        .map(|kind| GossipTopic::new(fork_digest, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::MainnetEthSpec;

    #[test]
    fn topic_strings_follow_wire_format() {
        let topic = GossipTopic::new([0, 1, 2, 3], GossipKind::Attestation(SubnetId::new(9)));
        assert_eq!(topic.to_string(), "/eth2/00010203/beacon_attestation_9/ssz_snappy");
    }

    #[test]
    fn core_topics_grow_with_forks() {
        let digest = [0; 4];
        let base = core_topics_for_fork::<MainnetEthSpec>(ForkName::Base, digest);
        let altair = core_topics_for_fork::<MainnetEthSpec>(ForkName::Altair, digest);
        let capella = core_topics_for_fork::<MainnetEthSpec>(ForkName::Capella, digest);
        let deneb = core_topics_for_fork::<MainnetEthSpec>(ForkName::Deneb, digest);

        assert_eq!(base.len(), 4);
        assert_eq!(altair.len(), 5);
        assert_eq!(capella.len(), 6);
        // Deneb adds one blob subnet per possible sidecar.
        assert_eq!(
            deneb.len(),
            6 + MainnetEthSpec::max_blobs_per_block()
        );
        assert!(capella
            .iter()
            .any(|t| t.kind == GossipKind::BlsToExecutionChange));
        assert!(!altair
            .iter()
            .any(|t| t.kind == GossipKind::BlsToExecutionChange));
    }
}
