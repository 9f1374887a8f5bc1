//! Pixel events sampled from the source stream

use serde::{Deserialize, Serialize};

/// One cycle's sample from the pixel source.
///
/// At most one boundary flag is expected per event. `pixel_valid` may coincide
/// with `line_start` or `line_end` to mark the first or last pixel of a line.
/// An event with every flag clear is a blanking cycle and carries nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelEvent {
    pub frame_start: bool,
    pub frame_end: bool,
    pub line_start: bool,
    pub line_end: bool,
    pub pixel_valid: bool,
    pub payload: u64,
}

/// Boundary marker carried by a pixel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    FrameStart,
    FrameEnd,
    LineStart,
    LineEnd,
}

impl PixelEvent {
    /// Blanking cycle.
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn frame_start() -> Self {
        Self { frame_start: true, ..Self::default() }
    }

    pub fn frame_end() -> Self {
        Self { frame_end: true, ..Self::default() }
    }

    /// Line opening without a pixel.
    pub fn line_start() -> Self {
        Self { line_start: true, ..Self::default() }
    }

    /// Line closing without a pixel.
    pub fn line_end() -> Self {
        Self { line_end: true, ..Self::default() }
    }

    /// A valid pixel inside an open line.
    pub fn pixel(payload: u64) -> Self {
        Self { pixel_valid: true, payload, ..Self::default() }
    }

    /// Line opening that also carries the line's first pixel.
    pub fn first_pixel(payload: u64) -> Self {
        Self { line_start: true, pixel_valid: true, payload, ..Self::default() }
    }

    /// Line closing that also carries the line's last pixel.
    pub fn last_pixel(payload: u64) -> Self {
        Self { line_end: true, pixel_valid: true, payload, ..Self::default() }
    }

    /// Number of boundary flags asserted.
    pub fn boundary_count(&self) -> u32 {
        [self.frame_start, self.frame_end, self.line_start, self.line_end]
            .iter()
            .filter(|flag| **flag)
            .count() as u32
    }

    /// The single boundary carried by this event, if exactly one is asserted.
    pub fn boundary(&self) -> Option<Boundary> {
        if self.boundary_count() != 1 {
            return None;
        }
        if self.frame_start {
            Some(Boundary::FrameStart)
        } else if self.frame_end {
            Some(Boundary::FrameEnd)
        } else if self.line_start {
            Some(Boundary::LineStart)
        } else {
            Some(Boundary::LineEnd)
        }
    }

    /// True when the event carries neither a boundary nor a pixel.
    pub fn is_blank(&self) -> bool {
        self.boundary_count() == 0 && !self.pixel_valid
    }
}
