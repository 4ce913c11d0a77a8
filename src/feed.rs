use serde::{Deserialize, Serialize};

use crate::{domain::Tick, error::SimResult};

pub mod batch;
pub mod csv;
pub mod stream;
pub mod timestamp;

pub use batch::BatchFeed;
pub use csv::{ColumnMap, CsvFeed};
pub use stream::{StreamingFeed, STREAM_QUEUE_CAPACITY};
pub use timestamp::TimestampParser;

/// One pull from a feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick(Tick),
    /// The backing store is exhausted.
    EndOfStream,
    /// One record could not be parsed. The stream is still alive: the next
    /// call advances past the bad record.
    ParseError { line: u64, reason: String },
}

/// Cumulative ingest counters, carried across the life of a feed and zeroed
/// by `reset()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCounters {
    /// Ticks emitted to the consumer.
    pub ticks_read: u64,
    /// Data lines consumed from the backing store.
    pub lines_processed: u64,
    /// Ticks that passed emit-time validation.
    pub valid_ticks: u64,
    /// Rows that parsed but failed validation; skipped silently.
    pub invalid_ticks: u64,
    /// Rows that failed to parse; surfaced as [`FeedEvent::ParseError`].
    pub parse_errors: u64,
}

/// A lazy, finite, restartable sequence of validated quotes.
///
/// Guarantees:
/// - Ticks are emitted in source order, with 0-based gap-free sequence
///   numbers assigned here at ingest.
/// - `next()` is synchronous and blocks only on the backing store.
/// - Parse errors are per-record and recoverable; validation failures are
///   counted and skipped.
/// - `reset()` restores the state immediately after construction, counters
///   included, and fails only after `close()`.
pub trait TickFeed: Send {
    fn has_next(&mut self) -> bool;

    fn next(&mut self) -> FeedEvent;

    fn reset(&mut self) -> SimResult<()>;

    fn close(&mut self);

    fn counters(&self) -> FeedCounters;
}

/// An in-memory feed over a fixed set of ticks. Sequence numbers are
/// reassigned at emit so slices can be handed in unnumbered.
#[derive(Debug, Clone, Default)]
pub struct VecFeed {
    ticks: Vec<Tick>,
    cursor: usize,
    counters: FeedCounters,
    closed: bool,
}

impl VecFeed {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks,
            cursor: 0,
            counters: FeedCounters::default(),
            closed: false,
        }
    }
}

impl TickFeed for VecFeed {
    fn has_next(&mut self) -> bool {
        !self.closed && self.cursor < self.ticks.len()
    }

    fn next(&mut self) -> FeedEvent {
        if !self.has_next() {
            return FeedEvent::EndOfStream;
        }
        let mut tick = self.ticks[self.cursor];
        tick.sequence = self.cursor as u64;
        self.cursor += 1;
        self.counters.lines_processed += 1;
        self.counters.ticks_read += 1;
        self.counters.valid_ticks += 1;
        FeedEvent::Tick(tick)
    }

    fn reset(&mut self) -> SimResult<()> {
        if self.closed {
            return Err(crate::error::DataError::FeedClosed.into());
        }
        self.cursor = 0;
        self.counters = FeedCounters::default();
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn counters(&self) -> FeedCounters {
        self.counters
    }
}
