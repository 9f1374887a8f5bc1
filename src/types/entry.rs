//! Queue entries: the 65-bit words that cross between the two contexts

use crate::{Result, TransmitError};

/// Tag bit distinguishing the two kinds of queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryTag {
    /// One 64-bit pixel payload word.
    Data,
    /// One 32-bit protocol word: short packet, long packet header or footer.
    Control,
}

/// A single queue word: 64 payload bits plus one tag bit.
///
/// The drain engine splits an entry into Transmission Units, least significant
/// byte first. Data entries produce eight units, control entries four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueEntry {
    payload: u64,
    tag: EntryTag,
}

impl QueueEntry {
    /// Total width of an entry in bits.
    pub const WIDTH_BITS: u32 = 65;

    /// Width of the protocol word carried by a control entry.
    pub const CONTROL_BITS: u32 = 32;

    /// Upper bound on Transmission Units per entry.
    pub const MAX_UNITS: usize = 8;

    /// Bit position of the tag in the packed representation.
    const TAG_BIT: u32 = 64;

    pub fn data(payload: u64) -> Self {
        Self { payload, tag: EntryTag::Data }
    }

    pub fn control(word: u32) -> Self {
        Self { payload: word as u64, tag: EntryTag::Control }
    }

    /// Decode a packed 65-bit value, rejecting anything wider and control
    /// entries whose word does not fit in 32 bits.
    pub fn from_bits(bits: u128) -> Result<Self> {
        let width = u128::BITS - bits.leading_zeros();
        if width > Self::WIDTH_BITS {
            return Err(TransmitError::width_exceeded("queue entry", width, Self::WIDTH_BITS));
        }

        let payload = bits as u64;
        if bits >> Self::TAG_BIT == 0 {
            return Ok(Self::data(payload));
        }

        let word_width = u64::BITS - payload.leading_zeros();
        if word_width > Self::CONTROL_BITS {
            return Err(TransmitError::width_exceeded(
                "control word",
                word_width,
                Self::CONTROL_BITS,
            ));
        }
        Ok(Self::control(payload as u32))
    }

    /// Packed 65-bit representation.
    pub fn to_bits(self) -> u128 {
        let tag = match self.tag {
            EntryTag::Data => 0u128,
            EntryTag::Control => 1u128,
        };
        (tag << Self::TAG_BIT) | self.payload as u128
    }

    pub fn tag(&self) -> EntryTag {
        self.tag
    }

    pub fn payload(&self) -> u64 {
        self.payload
    }

    pub fn is_control(&self) -> bool {
        self.tag == EntryTag::Control
    }

    /// Number of Transmission Units this entry serializes to.
    pub fn unit_count(&self) -> usize {
        match self.tag {
            EntryTag::Data => 8,
            EntryTag::Control => 4,
        }
    }

    /// The entry's Transmission Units in lane order.
    pub fn units(&self) -> impl Iterator<Item = u8> + use<> {
        let count = self.unit_count();
        self.payload.to_le_bytes().into_iter().take(count)
    }
}
