//! Test utilities for generating pixel streams and expected lane output
//!
//! Shared by the unit tests and the benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use crate::config::PacketCodes;
use crate::types::{PixelEvent, lane_bytes, packetize};

/// Payload for pixel `pixel` of line `line`, distinct across a frame.
pub fn pixel_payload(line: usize, pixel: usize) -> u64 {
    ((line as u64) << 32) | (pixel as u64).wrapping_mul(0x9E37_79B9)
}

/// One well-formed frame of `lines` lines with `pixels` pixels each.
///
/// Line boundaries are separate events from the pixels, so every line is
/// `pixels + 2` events long.
pub fn frame(lines: usize, pixels: usize) -> Vec<PixelEvent> {
    let mut events = Vec::with_capacity(2 + lines * (pixels + 2));
    events.push(PixelEvent::frame_start());
    for line in 0..lines {
        events.push(PixelEvent::line_start());
        events.extend((0..pixels).map(|pixel| PixelEvent::pixel(pixel_payload(line, pixel))));
        events.push(PixelEvent::line_end());
    }
    events.push(PixelEvent::frame_end());
    events
}

/// Like [`frame`], but the first and last pixel ride on the line markers.
pub fn compact_frame(lines: usize, pixels: usize) -> Vec<PixelEvent> {
    let mut events = vec![PixelEvent::frame_start()];
    for line in 0..lines {
        match pixels {
            0 => {
                events.push(PixelEvent::line_start());
                events.push(PixelEvent::line_end());
            }
            1 => {
                events.push(PixelEvent::first_pixel(pixel_payload(line, 0)));
                events.push(PixelEvent::line_end());
            }
            _ => {
                events.push(PixelEvent::first_pixel(pixel_payload(line, 0)));
                events.extend(
                    (1..pixels - 1).map(|pixel| PixelEvent::pixel(pixel_payload(line, pixel))),
                );
                events.push(PixelEvent::last_pixel(pixel_payload(line, pixels - 1)));
            }
        }
    }
    events.push(PixelEvent::frame_end());
    events
}

/// Insert `gap` blanking events after every event.
pub fn with_blanking(events: &[PixelEvent], gap: usize) -> Vec<PixelEvent> {
    events
        .iter()
        .flat_map(|event| std::iter::once(*event).chain(std::iter::repeat_n(PixelEvent::blank(), gap)))
        .collect()
}

/// Lane bytes the reference packetizer produces for a well-formed sequence.
pub fn expected_lane_bytes(events: &[PixelEvent], codes: &PacketCodes) -> Vec<u8> {
    match packetize(events, codes) {
        Ok(packets) => lane_bytes(&packets),
        Err(e) => panic!("test sequence is not well formed: {e}"),
    }
}

/// Install a test subscriber once; output is captured by the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
