use crate::ChainSpec;
use serde::{Deserialize, Serialize};

pub const TIMELY_SOURCE_FLAG_INDEX: usize = 0;
pub const TIMELY_TARGET_FLAG_INDEX: usize = 1;
pub const TIMELY_HEAD_FLAG_INDEX: usize = 2;

/// Altair participation flags for a single validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipationFlags(u8);

impl ParticipationFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn add_flag(&mut self, flag_index: usize) {
        self.0 |= 1 << flag_index;
    }

    pub fn has_flag(&self, flag_index: usize) -> bool {
        self.0 & (1 << flag_index) != 0
    }

    pub fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for ParticipationFlags {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// The per-validator slice of the head state the orchestrator reads.
///
/// The full beacon state lives with the consensus-spec collaborator; this is
/// the projection needed for duty scheduling and the epoch fast path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    pub effective_balance: u64,
    pub balance: u64,
    pub inactivity_score: u64,
    pub participation: ParticipationFlags,
}

impl ValidatorSnapshot {
    /// Whether a balance change this epoch could move the effective balance.
    ///
    /// Mirrors the hysteresis rule of `process_effective_balance_updates`:
    /// the effective balance only moves when the balance leaves the
    /// `[eff - down, eff + up]` band.
    pub fn balance_within_hysteresis(&self, spec: &ChainSpec) -> bool {
        let hysteresis_increment = spec.effective_balance_increment / spec.hysteresis_quotient;
        let downward_threshold = hysteresis_increment * spec.hysteresis_downward_multiplier;
        let upward_threshold = hysteresis_increment * spec.hysteresis_upward_multiplier;

        self.balance + downward_threshold >= self.effective_balance
            && self.effective_balance + upward_threshold >= self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent() {
        let mut flags = ParticipationFlags::empty();
        flags.add_flag(TIMELY_SOURCE_FLAG_INDEX);
        assert!(flags.has_flag(TIMELY_SOURCE_FLAG_INDEX));
        assert!(!flags.has_flag(TIMELY_TARGET_FLAG_INDEX));
        flags.add_flag(TIMELY_TARGET_FLAG_INDEX);
        assert!(flags.has_flag(TIMELY_TARGET_FLAG_INDEX));
        assert!(!flags.has_flag(TIMELY_HEAD_FLAG_INDEX));
    }

    #[test]
    fn hysteresis_band() {
        let spec = ChainSpec::mainnet();
        let snapshot = |balance| ValidatorSnapshot {
            effective_balance: spec.max_effective_balance,
            balance,
            inactivity_score: 0,
            participation: ParticipationFlags::empty(),
        };
        // Down threshold is increment / 4 = 0.25 ETH.
        assert!(snapshot(spec.max_effective_balance).balance_within_hysteresis(&spec));
        assert!(snapshot(spec.max_effective_balance - 250_000_000).balance_within_hysteresis(&spec));
        assert!(!snapshot(spec.max_effective_balance - 250_000_001).balance_within_hysteresis(&spec));
        // Up threshold is increment * 5 / 4 = 1.25 ETH.
        assert!(snapshot(spec.max_effective_balance + 1_250_000_000).balance_within_hysteresis(&spec));
        assert!(
            !snapshot(spec.max_effective_balance + 1_250_000_001).balance_within_hysteresis(&spec)
        );
    }
}
