//! Latest-wins stream sampling

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add fixed-interval sampling to any Stream
pub trait SampleExt: Stream {
    /// Emit at most once per `period`
    ///
    /// If several items arrive within one period only the latest is emitted.
    /// Periods with no new item emit nothing.
    fn sample_every(self, period: Duration) -> Sampled<Self>
    where
        Self: Sized,
    {
        Sampled::new(self, period)
    }
}

impl<T: Stream> SampleExt for T {}

pin_project! {
    /// A stream combinator that samples its inner stream at a fixed rate
    pub struct Sampled<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Sampled<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, latest: None, done: false }
    }
}

impl<S: Stream> Stream for Sampled<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything ready, keeping only the latest
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if this.latest.is_none() {
            return if *this.done { Poll::Ready(None) } else { Poll::Pending };
        }

        ready!(this.interval.poll_tick(cx));
        Poll::Ready(this.latest.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_latest() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sampled = tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
            .sample_every(Duration::from_millis(10));

        tx.send(1).unwrap();
        assert_eq!(sampled.next().await, Some(1));

        for value in 2..=5 {
            tx.send(value).unwrap();
        }
        assert_eq!(sampled.next().await, Some(5));

        drop(tx);
        assert_eq!(sampled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn final_item_is_not_lost_when_stream_ends() {
        let sampled = futures::stream::iter(vec![1, 2, 3]).sample_every(Duration::from_millis(5));
        let items: Vec<i32> = sampled.collect().await;
        assert_eq!(items, vec![3]);
    }
}
