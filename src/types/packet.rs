//! Protocol packets and the reference packetizer
//!
//! Packet layout on the queue (and therefore on the lane):
//!
//! - Short packet: one control entry holding the configured 32-bit code.
//! - Long packet: a control header `(line << 16) | line_header`, one data entry
//!   per valid pixel, and a control footer `(word_count << 16) | checksum`.
//!
//! The checksum is CRC-16 with the reflected polynomial 0x8408, initial value
//! 0xFFFF and no final XOR, taken over the little-endian bytes of every payload
//! word in the line.

use super::entry::QueueEntry;
use super::pixel::{Boundary, PixelEvent};
use crate::config::PacketCodes;
use crate::{Result, TransmitError};

/// Which frame marker a short packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShortKind {
    FrameStart,
    FrameEnd,
}

/// One line of pixel payload with its header and trailing checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongPacket {
    pub header: u16,
    pub line: u16,
    pub payload: Vec<u64>,
    pub checksum: u16,
}

impl LongPacket {
    /// Build a long packet, computing the checksum over `payload`.
    pub fn new(header: u16, line: u16, payload: Vec<u64>) -> Self {
        let mut crc = LineChecksum::new();
        for word in &payload {
            crc.update_word(*word);
        }
        Self { header, line, payload, checksum: crc.value() }
    }

    /// Payload word count as carried in the footer.
    pub fn word_count(&self) -> u16 {
        u16::try_from(self.payload.len()).unwrap_or(u16::MAX)
    }

    pub fn header_word(&self) -> u32 {
        header_word(self.header, self.line)
    }

    pub fn footer_word(&self) -> u32 {
        footer_word(self.word_count(), self.checksum)
    }
}

/// An immutable protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Short { kind: ShortKind, code: u32 },
    Long(LongPacket),
}

impl Packet {
    /// Queue entries for this packet, in push order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        match self {
            Packet::Short { code, .. } => vec![QueueEntry::control(*code)],
            Packet::Long(long) => {
                let mut entries = Vec::with_capacity(long.payload.len() + 2);
                entries.push(QueueEntry::control(long.header_word()));
                entries.extend(long.payload.iter().copied().map(QueueEntry::data));
                entries.push(QueueEntry::control(long.footer_word()));
                entries
            }
        }
    }

    /// Bytes this packet puts on the lane.
    pub fn lane_bytes(&self) -> Vec<u8> {
        self.entries().iter().flat_map(QueueEntry::units).collect()
    }
}

/// Flatten packets into the byte order the lane must observe.
pub fn lane_bytes(packets: &[Packet]) -> Vec<u8> {
    packets.iter().flat_map(Packet::lane_bytes).collect()
}

pub(crate) fn header_word(header: u16, line: u16) -> u32 {
    ((line as u32) << 16) | header as u32
}

pub(crate) fn footer_word(word_count: u16, checksum: u16) -> u32 {
    ((word_count as u32) << 16) | checksum as u32
}

/// Incremental line checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineChecksum {
    crc: u16,
}

impl Default for LineChecksum {
    fn default() -> Self {
        Self::new()
    }
}

impl LineChecksum {
    const POLY: u16 = 0x8408;
    const INIT: u16 = 0xFFFF;

    pub fn new() -> Self {
        Self { crc: Self::INIT }
    }

    pub fn update_byte(&mut self, byte: u8) {
        let mut crc = self.crc ^ byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ Self::POLY } else { crc >> 1 };
        }
        self.crc = crc;
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.update_byte(*byte);
        }
    }

    pub fn update_word(&mut self, word: u64) {
        self.update_bytes(&word.to_le_bytes());
    }

    pub fn value(&self) -> u16 {
        self.crc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    Idle,
    Frame,
    Line,
}

/// Reference packetization of a well-formed event sequence.
///
/// Returns the packets the transmitter must deliver for `events`, or an error
/// naming the first event that breaks frame/line nesting. A frame may be left
/// open at the end of the sequence; a line may not.
pub fn packetize(events: &[PixelEvent], codes: &PacketCodes) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut nesting = Nesting::Idle;
    let mut line_number: u16 = 0;
    let mut payload = Vec::new();

    for (index, event) in events.iter().enumerate() {
        if event.is_blank() {
            continue;
        }
        if event.boundary_count() > 1 {
            return Err(TransmitError::malformed(index, "more than one boundary flag"));
        }

        match (nesting, event.boundary()) {
            (Nesting::Idle, Some(Boundary::FrameStart)) if !event.pixel_valid => {
                packets.push(Packet::Short { kind: ShortKind::FrameStart, code: codes.frame_start });
                line_number = 0;
                nesting = Nesting::Frame;
            }
            (Nesting::Frame, Some(Boundary::LineStart)) => {
                line_number = line_number.wrapping_add(1);
                payload.clear();
                if event.pixel_valid {
                    payload.push(event.payload);
                }
                nesting = Nesting::Line;
            }
            (Nesting::Frame, Some(Boundary::FrameEnd)) if !event.pixel_valid => {
                packets.push(Packet::Short { kind: ShortKind::FrameEnd, code: codes.frame_end });
                nesting = Nesting::Idle;
            }
            (Nesting::Line, None) => payload.push(event.payload),
            (Nesting::Line, Some(Boundary::LineEnd)) => {
                if event.pixel_valid {
                    payload.push(event.payload);
                }
                let words = std::mem::take(&mut payload);
                packets.push(Packet::Long(LongPacket::new(codes.line_header, line_number, words)));
                nesting = Nesting::Frame;
            }
            (state, _) => {
                return Err(TransmitError::malformed(
                    index,
                    format!("{:?} not allowed while {:?}", event, state),
                ));
            }
        }
    }

    if nesting == Nesting::Line {
        return Err(TransmitError::malformed(events.len(), "line still open at end of sequence"));
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_known_check_value() {
        let mut crc = LineChecksum::new();
        crc.update_bytes(b"123456789");
        assert_eq!(crc.value(), 0x6F91);
    }

    #[test]
    fn empty_line_checksum_is_initial_value() {
        let packet = LongPacket::new(0x2A, 1, Vec::new());
        assert_eq!(packet.checksum, 0xFFFF);
        assert_eq!(packet.footer_word(), 0x0000_FFFF);
    }

    #[test]
    fn long_packet_entries_frame_the_payload() {
        let packet = Packet::Long(LongPacket::new(0x2A, 3, vec![10, 20]));
        let entries = packet.entries();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0], QueueEntry::control(0x0003_002A));
        assert_eq!(entries[1], QueueEntry::data(10));
        assert_eq!(entries[2], QueueEntry::data(20));
        assert!(entries[3].is_control());
        assert_eq!(entries[3].payload() >> 16, 2);
        assert_eq!(packet.lane_bytes().len(), 4 + 8 + 8 + 4);
    }

    #[test]
    fn one_line_frame_packetizes_into_three_packets() {
        let codes = PacketCodes::default();
        let events = vec![
            PixelEvent::frame_start(),
            PixelEvent::first_pixel(1),
            PixelEvent::pixel(2),
            PixelEvent::pixel(3),
            PixelEvent::last_pixel(4),
            PixelEvent::frame_end(),
        ];

        let packets = packetize(&events, &codes).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], Packet::Short { kind: ShortKind::FrameStart, code: codes.frame_start });
        match &packets[1] {
            Packet::Long(long) => {
                assert_eq!(long.header, codes.line_header);
                assert_eq!(long.line, 1);
                assert_eq!(long.payload, vec![1, 2, 3, 4]);
            }
            other => panic!("expected long packet, got {:?}", other),
        }
        assert_eq!(packets[2], Packet::Short { kind: ShortKind::FrameEnd, code: codes.frame_end });
    }

    #[test]
    fn blank_cycles_are_skipped() {
        let codes = PacketCodes::default();
        let events = vec![
            PixelEvent::blank(),
            PixelEvent::frame_start(),
            PixelEvent::blank(),
            PixelEvent::line_start(),
            PixelEvent::blank(),
            PixelEvent::line_end(),
            PixelEvent::frame_end(),
        ];
        let packets = packetize(&events, &codes).unwrap();
        assert_eq!(packets.len(), 3);
        assert!(matches!(&packets[1], Packet::Long(long) if long.payload.is_empty()));
    }

    #[test]
    fn misplaced_markers_are_reported_with_their_index() {
        let codes = PacketCodes::default();
        let events = vec![PixelEvent::frame_start(), PixelEvent::line_end()];
        assert!(matches!(
            packetize(&events, &codes),
            Err(TransmitError::MalformedSequence { index: 1, .. })
        ));

        let open_line = vec![PixelEvent::frame_start(), PixelEvent::line_start()];
        assert!(matches!(
            packetize(&open_line, &codes),
            Err(TransmitError::MalformedSequence { index: 2, .. })
        ));
    }
}
