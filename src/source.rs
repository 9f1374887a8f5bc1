//! Pixel sources feeding the control context

use std::collections::VecDeque;
use tokio::sync::mpsc;

use crate::Result;
use crate::types::PixelEvent;

/// Trait for pixel stream producers
///
/// A source is sampled once per control cycle and handed the `accept` level
/// the packet builder asserted at the end of the previous cycle. Sources that
/// respect back-pressure present nothing while `accept` is low; the builder
/// tolerates one further event after it drops `accept`.
#[async_trait::async_trait]
pub trait PixelSource: Send + 'static {
    /// Event for this control cycle
    ///
    /// Returns:
    /// - `Ok(Some(event))` - Event presented this cycle
    /// - `Ok(None)` - Nothing presented this cycle
    /// - `Err(e)` - Source failure; the control task counts consecutive failures
    async fn next_event(&mut self, accept: bool) -> Result<Option<PixelEvent>>;

    /// True once the source will never present another event
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Replays a fixed list of events.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    events: VecDeque<PixelEvent>,
    honour_accept: bool,
}

impl ScriptedSource {
    /// Source that waits while `accept` is low.
    pub fn new(events: impl IntoIterator<Item = PixelEvent>) -> Self {
        Self { events: events.into_iter().collect(), honour_accept: true }
    }

    /// Source that presents one event every cycle regardless of `accept`.
    pub fn ignoring_accept(events: impl IntoIterator<Item = PixelEvent>) -> Self {
        Self { events: events.into_iter().collect(), honour_accept: false }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Poll without the async machinery, for lockstep stepping.
    pub fn poll(&mut self, accept: bool) -> Option<PixelEvent> {
        if self.honour_accept && !accept {
            return None;
        }
        self.events.pop_front()
    }
}

#[async_trait::async_trait]
impl PixelSource for ScriptedSource {
    async fn next_event(&mut self, accept: bool) -> Result<Option<PixelEvent>> {
        Ok(self.poll(accept))
    }

    fn is_exhausted(&self) -> bool {
        self.events.is_empty()
    }
}

/// Source fed from a channel; an event is taken only while `accept` is high.
#[derive(Debug)]
pub struct ChannelSource {
    events: mpsc::Receiver<PixelEvent>,
    closed: bool,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<PixelEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { events: rx, closed: false })
    }
}

#[async_trait::async_trait]
impl PixelSource for ChannelSource {
    async fn next_event(&mut self, accept: bool) -> Result<Option<PixelEvent>> {
        if !accept {
            return Ok(None);
        }
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.closed
    }
}
