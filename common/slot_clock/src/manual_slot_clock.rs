use crate::SlotClock;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use types::Slot;

/// A slot clock where time is frozen and advanced manually. Used in testing.
#[derive(Clone)]
pub struct ManualSlotClock {
    genesis_slot: Slot,
    genesis_duration: Duration,
    slot_duration: Duration,
    /// The fake "current" time as a duration since the UNIX epoch.
    current_time: Arc<RwLock<Duration>>,
}

impl ManualSlotClock {
    pub fn set_slot(&self, slot: u64) {
        let duration = self
            .start_of(Slot::new(slot))
            .expect("slot is not before genesis slot");
        *self.current_time.write() = duration;
    }

    pub fn advance_slot(&self) {
        let current = self.now().expect("clock is ahead of genesis");
        self.set_slot(current.as_u64() + 1)
    }

    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.current_time.write();
        *time += duration;
    }

    pub fn set_current_time(&self, duration: Duration) {
        *self.current_time.write() = duration;
    }
}

impl SlotClock for ManualSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        assert!(!slot_duration.is_zero(), "slot duration must be non-zero");
        Self {
            genesis_slot,
            genesis_duration,
            slot_duration,
            current_time: Arc::new(RwLock::new(genesis_duration)),
        }
    }

    fn now(&self) -> Option<Slot> {
        self.slot_of(self.now_duration()?)
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(*self.current_time.read())
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
