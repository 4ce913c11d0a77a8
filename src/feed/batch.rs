use std::collections::VecDeque;

use crate::{
    error::SimResult,
    feed::{FeedCounters, FeedEvent, TickFeed},
};

/// Strictly-forwarding adapter that pulls the underlying feed in groups of
/// `batch_size`. Consumers can drain whole batches via
/// [`BatchFeed::next_batch`] or keep using the one-at-a-time [`TickFeed`]
/// contract, which drains an internal buffer refilled batch-wise.
pub struct BatchFeed<F: TickFeed> {
    inner: F,
    batch_size: usize,
    buffer: VecDeque<FeedEvent>,
}

impl<F: TickFeed> BatchFeed<F> {
    pub fn new(inner: F, batch_size: usize) -> Self {
        Self {
            inner,
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Pulls up to `batch_size` events from the source, in source order.
    /// Stops early at end-of-stream; an empty batch means the source is
    /// exhausted.
    pub fn next_batch(&mut self) -> Vec<FeedEvent> {
        let mut batch = Vec::with_capacity(self.batch_size);
        // Anything buffered by the TickFeed facade goes out first.
        while batch.len() < self.batch_size {
            if let Some(event) = self.buffer.pop_front() {
                batch.push(event);
                continue;
            }
            if !self.inner.has_next() {
                break;
            }
            match self.inner.next() {
                FeedEvent::EndOfStream => break,
                event => batch.push(event),
            }
        }
        batch
    }
}

impl<F: TickFeed> TickFeed for BatchFeed<F> {
    fn has_next(&mut self) -> bool {
        !self.buffer.is_empty() || self.inner.has_next()
    }

    fn next(&mut self) -> FeedEvent {
        if let Some(event) = self.buffer.pop_front() {
            return event;
        }
        let batch = self.next_batch();
        if batch.is_empty() {
            return FeedEvent::EndOfStream;
        }
        self.buffer.extend(batch);
        self.buffer.pop_front().unwrap_or(FeedEvent::EndOfStream)
    }

    fn reset(&mut self) -> SimResult<()> {
        self.buffer.clear();
        self.inner.reset()
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.inner.close();
    }

    fn counters(&self) -> FeedCounters {
        self.inner.counters()
    }
}
