use crate::{Epoch, Hash256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An (epoch, root) pair used for justification and finalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{:?}", self.epoch, self.root)
    }
}
