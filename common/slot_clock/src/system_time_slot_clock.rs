use crate::SlotClock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::Slot;

/// A slot clock based upon the system clock.
#[derive(Clone)]
pub struct SystemTimeSlotClock {
    genesis_slot: Slot,
    genesis_duration: Duration,
    slot_duration: Duration,
}

impl SlotClock for SystemTimeSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        assert!(!slot_duration.is_zero(), "slot duration must be non-zero");
        Self {
            genesis_slot,
            genesis_duration,
            slot_duration,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(self.now_duration()?)
    }

    fn now_duration(&self) -> Option<Duration> {
        SystemTime::now().duration_since(UNIX_EPOCH).ok()
    }

    fn slot_of(&self, duration: Duration) -> Option<Slot> {
        let since_genesis = duration.checked_sub(self.genesis_duration)?;
        let slots = since_genesis.as_secs() / self.slot_duration.as_secs();
        Some(self.genesis_slot + slots)
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let next_slot = self.now()? + 1;
        self.duration_to_slot(next_slot)
    }

    fn duration_to_next_epoch(&self, slots_per_epoch: u64) -> Option<Duration> {
        let next_epoch = self.now()?.epoch(slots_per_epoch) + 1;
        self.duration_to_slot(next_epoch.start_slot(slots_per_epoch))
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn start_of(&self, slot: Slot) -> Option<Duration> {
        let slots_since_genesis = slot.as_u64().checked_sub(self.genesis_slot.as_u64())?;
        self.genesis_duration
            .checked_add(Duration::from_secs(
                self.slot_duration.as_secs().checked_mul(slots_since_genesis)?,
            ))
    }

    fn genesis_slot(&self) -> Slot {
        self.genesis_slot
    }

    fn genesis_duration(&self) -> Duration {
        self.genesis_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_of_tracks_genesis() {
        let clock = SystemTimeSlotClock::new(
            Slot::new(0),
            Duration::from_secs(100),
            Duration::from_secs(12),
        );
        assert_eq!(clock.slot_of(Duration::from_secs(99)), None);
        assert_eq!(clock.slot_of(Duration::from_secs(100)), Some(Slot::new(0)));
        assert_eq!(clock.slot_of(Duration::from_secs(111)), Some(Slot::new(0)));
        assert_eq!(clock.slot_of(Duration::from_secs(112)), Some(Slot::new(1)));
        assert_eq!(clock.start_of(Slot::new(2)), Some(Duration::from_secs(124)));
    }
}
