//! Interrupt cause flags surfaced to the register front end

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Cause bits of the fused interrupt register.
pub mod causes {
    /// Out-of-order boundary marker ignored by the packet builder.
    pub const MALFORMED_BOUNDARY: u32 = 0x0001;
    /// Event dropped because neither the queue nor the skid buffer had room.
    pub const QUEUE_OVERFLOW: u32 = 0x0002;
    /// Lane withheld `ready` past the configured bound.
    pub const LANE_TIMEOUT: u32 = 0x0004;

    pub const ALL: u32 = MALFORMED_BOUNDARY | QUEUE_OVERFLOW | LANE_TIMEOUT;
}

/// Set of interrupt causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct InterruptFlags(pub u32);

impl InterruptFlags {
    pub const NONE: Self = Self(0);
    pub const MALFORMED_BOUNDARY: Self = Self(causes::MALFORMED_BOUNDARY);
    pub const QUEUE_OVERFLOW: Self = Self(causes::QUEUE_OVERFLOW);
    pub const LANE_TIMEOUT: Self = Self(causes::LANE_TIMEOUT);
    pub const ALL: Self = Self(causes::ALL);

    pub fn new(value: u32) -> Self {
        Self(value & causes::ALL)
    }

    /// Check if any bit of `flag` is set.
    pub fn has_flag(&self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    pub fn contains(&self, other: InterruptFlags) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: InterruptFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits in `mask`, returning the bits that were actually set.
    pub fn clear(&mut self, mask: InterruptFlags) -> InterruptFlags {
        let cleared = self.0 & mask.0;
        self.0 &= !mask.0;
        InterruptFlags(cleared)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl BitOr for InterruptFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for InterruptFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_only_touches_masked_bits() {
        let mut flags = InterruptFlags::MALFORMED_BOUNDARY | InterruptFlags::LANE_TIMEOUT;
        let cleared = flags.clear(InterruptFlags::LANE_TIMEOUT | InterruptFlags::QUEUE_OVERFLOW);

        assert_eq!(cleared, InterruptFlags::LANE_TIMEOUT);
        assert_eq!(flags, InterruptFlags::MALFORMED_BOUNDARY);
        assert!(flags.has_flag(causes::MALFORMED_BOUNDARY));
        assert!(!flags.contains(InterruptFlags::LANE_TIMEOUT));
    }

    #[test]
    fn new_masks_unknown_bits() {
        assert_eq!(InterruptFlags::new(0xFFFF_FFFF), InterruptFlags::ALL);
        assert!(InterruptFlags::default().is_empty());
    }
}
