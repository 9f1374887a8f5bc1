//! Packet builder: frames the pixel stream into queue entries.
//!
//! Runs in the control context, one [`PacketBuilder::tick`] per control cycle.
//! Entries produced by an event are staged in a four-deep skid buffer and
//! pushed to the queue one per cycle. Long packets stream: the header goes out
//! when the line opens, each pixel as it arrives, and the footer (word count
//! and checksum) when the line closes.

use std::collections::VecDeque;
use tracing::{debug, trace, warn};

use crate::config::PacketCodes;
use crate::queue::{PushError, QueueProducer};
use crate::types::{
    Boundary, InterruptFlags, LineChecksum, PixelEvent, QueueEntry, footer_word, header_word,
};

/// Entries the skid buffer can hold. Every event produces at most two.
pub const SKID_DEPTH: usize = 4;

/// Packet builder states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuilderState {
    #[default]
    Idle,
    FrameActive,
    LineActive,
}

/// Outputs of one builder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuilderOutput {
    /// Back-pressure to the pixel source for the next cycle.
    pub accept: bool,
    /// Interrupt causes raised this cycle.
    pub raised: InterruptFlags,
    /// Entry pushed to the queue this cycle.
    pub pushed: Option<QueueEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuilderStats {
    pub frames: u64,
    pub lines: u64,
    pub pixels: u64,
    pub malformed: u64,
    pub dropped: u64,
}

#[derive(Debug)]
pub struct PacketBuilder {
    state: BuilderState,
    codes: PacketCodes,
    staged_codes: Option<PacketCodes>,
    skid: VecDeque<QueueEntry>,
    line_number: u16,
    word_count: u16,
    checksum: LineChecksum,
    stats: BuilderStats,
}

impl PacketBuilder {
    pub fn new(codes: PacketCodes) -> Self {
        Self {
            state: BuilderState::Idle,
            codes,
            staged_codes: None,
            skid: VecDeque::with_capacity(SKID_DEPTH),
            line_number: 0,
            word_count: 0,
            checksum: LineChecksum::new(),
            stats: BuilderStats::default(),
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// True exactly when the state machine is `Idle`.
    pub fn is_idle(&self) -> bool {
        self.state == BuilderState::Idle
    }

    pub fn codes(&self) -> PacketCodes {
        self.codes
    }

    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    /// Entries waiting in the skid buffer.
    pub fn pending(&self) -> usize {
        self.skid.len()
    }

    /// Stage new packet codes; they take effect the next time the builder is idle.
    pub fn stage_codes(&mut self, codes: PacketCodes) {
        self.staged_codes = Some(codes);
        self.apply_staged_codes();
    }

    /// Return to `Idle`, discarding any partially built packet and staged entries.
    ///
    /// Entries already pushed to the queue are left alone.
    pub fn soft_reset(&mut self) {
        if self.state != BuilderState::Idle || !self.skid.is_empty() {
            debug!(
                "Packet builder soft reset in {:?}, discarding {} staged entries",
                self.state,
                self.skid.len()
            );
        }
        self.state = BuilderState::Idle;
        self.skid.clear();
        self.word_count = 0;
        self.checksum = LineChecksum::new();
        self.apply_staged_codes();
    }

    /// Advance one control cycle.
    pub fn tick(&mut self, event: Option<PixelEvent>, queue: &QueueProducer) -> BuilderOutput {
        let mut raised = InterruptFlags::NONE;

        if let Some(event) = event.filter(|e| !e.is_blank()) {
            raised |= self.accept_event(event);
        }

        let pushed = self.push_one(queue);
        let accept =
            self.skid.len() <= 1 && !queue.almost_full() && !queue.in_reset();

        BuilderOutput { accept, raised, pushed }
    }

    fn accept_event(&mut self, event: PixelEvent) -> InterruptFlags {
        let mut staged = [None; 2];

        let next = match self.classify(&event) {
            Some(next) => next,
            None => {
                self.stats.malformed += 1;
                warn!("Ignoring malformed pixel event {:?} while {:?}", event, self.state);
                return InterruptFlags::MALFORMED_BOUNDARY;
            }
        };

        match (self.state, event.boundary()) {
            (BuilderState::Idle, _) => {
                staged[0] = Some(QueueEntry::control(self.codes.frame_start));
            }
            (BuilderState::FrameActive, Some(Boundary::LineStart)) => {
                let line = self.line_number.wrapping_add(1);
                staged[0] = Some(QueueEntry::control(header_word(self.codes.line_header, line)));
                if event.pixel_valid {
                    staged[1] = Some(QueueEntry::data(event.payload));
                }
            }
            (BuilderState::FrameActive, _) => {
                staged[0] = Some(QueueEntry::control(self.codes.frame_end));
            }
            (BuilderState::LineActive, Some(Boundary::LineEnd)) => {
                let mut checksum = self.checksum;
                let mut words = self.word_count;
                if event.pixel_valid {
                    staged[0] = Some(QueueEntry::data(event.payload));
                    checksum.update_word(event.payload);
                    words = words.saturating_add(1);
                }
                staged[1] = Some(QueueEntry::control(footer_word(words, checksum.value())));
            }
            (BuilderState::LineActive, _) => {
                staged[0] = Some(QueueEntry::data(event.payload));
            }
        }

        let needed = staged.iter().flatten().count();
        if self.skid.len() + needed > SKID_DEPTH {
            self.stats.dropped += 1;
            warn!(
                "Dropping pixel event {:?}: skid buffer holds {} of {} entries",
                event,
                self.skid.len(),
                SKID_DEPTH
            );
            return InterruptFlags::QUEUE_OVERFLOW;
        }

        self.skid.extend(staged.into_iter().flatten());
        self.commit(event, next);
        InterruptFlags::NONE
    }

    /// Next state for a well-formed event, or `None` if the event is malformed here.
    fn classify(&self, event: &PixelEvent) -> Option<BuilderState> {
        if event.boundary_count() > 1 {
            return None;
        }
        match (self.state, event.boundary()) {
            (BuilderState::Idle, Some(Boundary::FrameStart)) if !event.pixel_valid => {
                Some(BuilderState::FrameActive)
            }
            (BuilderState::FrameActive, Some(Boundary::LineStart)) => {
                Some(BuilderState::LineActive)
            }
            (BuilderState::FrameActive, Some(Boundary::FrameEnd)) if !event.pixel_valid => {
                Some(BuilderState::Idle)
            }
            (BuilderState::LineActive, None) => Some(BuilderState::LineActive),
            (BuilderState::LineActive, Some(Boundary::LineEnd)) => Some(BuilderState::FrameActive),
            _ => None,
        }
    }

    fn commit(&mut self, event: PixelEvent, next: BuilderState) {
        match (self.state, next) {
            (BuilderState::Idle, BuilderState::FrameActive) => {
                self.stats.frames += 1;
                self.line_number = 0;
            }
            (BuilderState::FrameActive, BuilderState::LineActive) => {
                self.line_number = self.line_number.wrapping_add(1);
                self.word_count = 0;
                self.checksum = LineChecksum::new();
            }
            (BuilderState::LineActive, BuilderState::FrameActive) => {
                self.stats.lines += 1;
            }
            _ => {}
        }

        if event.pixel_valid {
            self.stats.pixels += 1;
            self.word_count = self.word_count.saturating_add(1);
            self.checksum.update_word(event.payload);
        }

        trace!("Packet builder {:?} -> {:?}", self.state, next);
        self.state = next;
        if next == BuilderState::Idle {
            self.apply_staged_codes();
        }
    }

    fn push_one(&mut self, queue: &QueueProducer) -> Option<QueueEntry> {
        let entry = *self.skid.front()?;
        // Only this half pushes, so a queue that is not full now stays not full
        // until our push lands.
        if queue.is_full() {
            return None;
        }
        match queue.push(entry) {
            Ok(()) => {
                self.skid.pop_front();
                Some(entry)
            }
            Err(PushError::Full(_)) | Err(PushError::Reset(_)) => None,
        }
    }

    fn apply_staged_codes(&mut self) {
        if self.state != BuilderState::Idle {
            return;
        }
        if let Some(codes) = self.staged_codes.take() {
            debug!("Packet builder applying codes {:?}", codes);
            self.codes = codes;
        }
    }
}
