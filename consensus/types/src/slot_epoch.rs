use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Rem, Sub, SubAssign};

/// A slot number on the beacon chain.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(u64);

/// An epoch number on the beacon chain.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u64);

macro_rules! impl_common {
    ($type: ident) => {
        impl $type {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            pub const fn as_usize(&self) -> usize {
                self.0 as usize
            }

            pub fn saturating_add<T: Into<u64>>(&self, other: T) -> Self {
                Self(self.0.saturating_add(other.into()))
            }

            pub fn saturating_sub<T: Into<u64>>(&self, other: T) -> Self {
                Self(self.0.saturating_sub(other.into()))
            }

            pub fn max_value() -> Self {
                Self(u64::MAX)
            }
        }

        impl From<u64> for $type {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$type> for u64 {
            fn from(value: $type) -> u64 {
                value.0
            }
        }

        impl Add<u64> for $type {
            type Output = Self;

            fn add(self, other: u64) -> Self {
                Self(self.0 + other)
            }
        }

        impl AddAssign<u64> for $type {
            fn add_assign(&mut self, other: u64) {
                self.0 += other;
            }
        }

        impl Sub<u64> for $type {
            type Output = Self;

            fn sub(self, other: u64) -> Self {
                Self(self.0 - other)
            }
        }

        impl SubAssign<u64> for $type {
            fn sub_assign(&mut self, other: u64) {
                self.0 -= other;
            }
        }

        impl Sub<$type> for $type {
            type Output = u64;

            fn sub(self, other: $type) -> u64 {
                self.0 - other.0
            }
        }

        impl Mul<u64> for $type {
            type Output = Self;

            fn mul(self, other: u64) -> Self {
                Self(self.0 * other)
            }
        }

        impl Div<u64> for $type {
            type Output = Self;

            fn div(self, other: u64) -> Self {
                Self(self.0 / other)
            }
        }

        impl Rem<u64> for $type {
            type Output = u64;

            fn rem(self, other: u64) -> u64 {
                self.0 % other
            }
        }

        impl PartialEq<u64> for $type {
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $type {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($type), self.0)
            }
        }

        impl slog::Value for $type {
            fn serialize(
                &self,
                _record: &slog::Record,
                key: slog::Key,
                serializer: &mut dyn slog::Serializer,
            ) -> slog::Result {
                serializer.emit_u64(key, self.0)
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);

impl Slot {
    pub fn epoch(&self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0 / slots_per_epoch)
    }
}

impl Epoch {
    pub fn start_slot(&self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0.saturating_mul(slots_per_epoch))
    }

    pub fn end_slot(&self, slots_per_epoch: u64) -> Slot {
        Slot::new(
            self.0
                .saturating_add(1)
                .saturating_mul(slots_per_epoch)
                .saturating_sub(1),
        )
    }

    /// Iterate over the slots of this epoch.
    pub fn slot_iter(&self, slots_per_epoch: u64) -> impl Iterator<Item = Slot> {
        let start = self.start_slot(slots_per_epoch);
        (0..slots_per_epoch).map(move |i| start + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_epoch_relation() {
        assert_eq!(Slot::new(0).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(32), Epoch::new(1));
        assert_eq!(Epoch::new(2).start_slot(32), Slot::new(64));
        assert_eq!(Epoch::new(2).end_slot(32), Slot::new(95));
    }

    #[test]
    fn saturating_math() {
        assert_eq!(Slot::new(1).saturating_sub(5u64), Slot::new(0));
        assert_eq!(Epoch::max_value().saturating_add(1u64), Epoch::max_value());
    }

    #[test]
    fn slot_iter_covers_epoch() {
        let slots: Vec<_> = Epoch::new(1).slot_iter(8).collect();
        assert_eq!(slots.first(), Some(&Slot::new(8)));
        assert_eq!(slots.last(), Some(&Slot::new(15)));
        assert_eq!(slots.len(), 8);
    }
}
