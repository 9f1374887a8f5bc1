//! Core value types shared by both execution contexts.
//!
//! ## Architecture
//!
//! - [`PixelEvent`] is one cycle's sample from the pixel source
//! - [`Packet`] is an immutable protocol packet, short (frame marker) or long (line)
//! - [`QueueEntry`] is the 65-bit word that crosses the queue
//! - [`InterruptFlags`] holds the sticky interrupt causes
//! - [`ClockRate`] paces an execution context
//!
//! ## Usage Example
//!
//! ```rust
//! use lanetx::config::PacketCodes;
//! use lanetx::types::{PixelEvent, lane_bytes, packetize};
//!
//! let events = vec![
//!     PixelEvent::frame_start(),
//!     PixelEvent::first_pixel(0x11),
//!     PixelEvent::last_pixel(0x22),
//!     PixelEvent::frame_end(),
//! ];
//!
//! let packets = packetize(&events, &PacketCodes::default()).unwrap();
//! assert_eq!(packets.len(), 3);
//!
//! // 4 (frame start) + 4 (header) + 2 * 8 (payload) + 4 (footer) + 4 (frame end)
//! assert_eq!(lane_bytes(&packets).len(), 32);
//! ```

mod clock_rate;
mod entry;
mod interrupt;
mod packet;
mod pixel;

pub use clock_rate::ClockRate;
pub use entry::{EntryTag, QueueEntry};
pub use interrupt::{InterruptFlags, causes};
pub use packet::{LineChecksum, LongPacket, Packet, ShortKind, lane_bytes, packetize};
pub(crate) use packet::{footer_word, header_word};
pub use pixel::{Boundary, PixelEvent};
