use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The name of a consensus fork, ordered by activation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    Base,
    Altair,
    Merge,
    Capella,
    Deneb,
}

impl ForkName {
    pub fn list_all() -> Vec<ForkName> {
        vec![
            ForkName::Base,
            ForkName::Altair,
            ForkName::Merge,
            ForkName::Capella,
            ForkName::Deneb,
        ]
    }

    /// The fork immediately after `self`, if any.
    pub fn next_fork(self) -> Option<ForkName> {
        match self {
            ForkName::Base => Some(ForkName::Altair),
            ForkName::Altair => Some(ForkName::Merge),
            ForkName::Merge => Some(ForkName::Capella),
            ForkName::Capella => Some(ForkName::Deneb),
            ForkName::Deneb => None,
        }
    }

    /// The fork immediately before `self`, if any.
    pub fn previous_fork(self) -> Option<ForkName> {
        match self {
            ForkName::Base => None,
            ForkName::Altair => Some(ForkName::Base),
            ForkName::Merge => Some(ForkName::Altair),
            ForkName::Capella => Some(ForkName::Merge),
            ForkName::Deneb => Some(ForkName::Capella),
        }
    }

    pub fn altair_enabled(self) -> bool {
        self >= ForkName::Altair
    }

    pub fn capella_enabled(self) -> bool {
        self >= ForkName::Capella
    }

    pub fn deneb_enabled(self) -> bool {
        self >= ForkName::Deneb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ordering_matches_activation() {
        let all = ForkName::list_all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next_fork(), Some(pair[1]));
            assert_eq!(pair[1].previous_fork(), Some(pair[0]));
        }
    }

    #[test]
    fn string_round_trip() {
        for fork in ForkName::list_all() {
            assert_eq!(ForkName::from_str(&fork.to_string()).unwrap(), fork);
        }
    }
}
