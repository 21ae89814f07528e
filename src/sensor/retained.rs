use crate::core::Result;

/// Slot holding the last sequence number
pub const SLOT_SEQUENCE: usize = 0;

/// Slot holding the battery estimate
pub const SLOT_BATTERY: usize = 1;

/// Memory that survives deep sleep but not a cold boot
pub trait RetainedMemory {
    /// Reads both slots, `None` if they hold nothing valid
    fn load(&self) -> Option<[u32; 2]>;

    /// Writes both slots
    fn store(&mut self, slots: [u32; 2]) -> Result<()>;
}

/// Retained memory for hosts and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryRetained {
    slots: Option<[u32; 2]>,
}

impl InMemoryRetained {
    pub fn new() -> Self {
        Self::default()
    }

    /// What a power loss does
    pub fn wipe(&mut self) {
        self.slots = None;
    }
}

impl RetainedMemory for InMemoryRetained {
    fn load(&self) -> Option<[u32; 2]> {
        self.slots
    }

    fn store(&mut self, slots: [u32; 2]) -> Result<()> {
        self.slots = Some(slots);
        Ok(())
    }
}
