use serde::{Deserialize, Serialize};
use std::fmt;

pub const SIGNATURE_BYTES_LEN: usize = 96;

/// An opaque BLS signature.
///
/// Generation and verification happen in the validator and consensus-spec
/// collaborators; the node only moves these bytes around.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(#[serde(with = "serde_sig")] [u8; SIGNATURE_BYTES_LEN]);

impl Signature {
    pub fn empty() -> Self {
        Self([0; SIGNATURE_BYTES_LEN])
    }

    pub fn from_bytes(bytes: [u8; SIGNATURE_BYTES_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES_LEN] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature(0x{}…)", hex::encode(&self.0[0..4]))
    }
}

mod serde_sig {
    use super::SIGNATURE_BYTES_LEN;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; SIGNATURE_BYTES_LEN],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; SIGNATURE_BYTES_LEN], D::Error> {
        let s = String::deserialize(deserializer)?;
        let decoded = hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)?;
        decoded
            .try_into()
            .map_err(|_| D::Error::custom("invalid signature length"))
    }
}
