use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam::channel::{bounded, unbounded, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{
    domain::Tick,
    error::{DataError, SimResult},
    feed::{FeedCounters, FeedEvent, TickFeed},
};

/// Capacity of the tick queue between the producer thread and the consumer.
/// The queue never discards: a full queue blocks the producer (backpressure)
/// and order is preserved end to end.
pub const STREAM_QUEUE_CAPACITY: usize = 100;

/// How often a blocked producer re-checks the stop flag.
const SEND_POLL: Duration = Duration::from_millis(25);

/// Asynchronous adapter: a producer thread drains the wrapped feed and
/// pushes ticks through a bounded queue; parse errors are surfaced on a side
/// channel instead of interleaving with the tick stream.
///
/// This is the only cross-thread boundary in the simulation core. The
/// consumer side stays a plain synchronous [`TickFeed`]: `next()` blocks on
/// the queue the way a file-backed feed blocks on the disk.
pub struct StreamingFeed<F: TickFeed + 'static> {
    worker: Worker<F>,
    data_rx: Option<Receiver<Tick>>,
    error_rx: Option<Receiver<(u64, String)>>,
    peeked: Option<Tick>,
    counters: Arc<Mutex<FeedCounters>>,
}

enum Worker<F> {
    /// Not yet spawned (or re-armed after reset); the feed is held here.
    Idle(Option<F>),
    Running {
        handle: JoinHandle<F>,
        stop: Arc<AtomicBool>,
    },
    Closed,
}

impl<F: TickFeed + 'static> StreamingFeed<F> {
    pub fn new(inner: F) -> Self {
        Self {
            worker: Worker::Idle(Some(inner)),
            data_rx: None,
            error_rx: None,
            peeked: None,
            counters: Arc::new(Mutex::new(FeedCounters::default())),
        }
    }

    /// Drains every parse error reported so far, in source order.
    pub fn take_errors(&mut self) -> Vec<(u64, String)> {
        self.error_rx
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default()
    }

    fn ensure_started(&mut self) {
        if let Worker::Idle(feed_slot) = &mut self.worker {
            let Some(feed) = feed_slot.take() else {
                return;
            };
            let (data_tx, data_rx) = bounded(STREAM_QUEUE_CAPACITY);
            let (error_tx, error_rx) = unbounded();
            let stop = Arc::new(AtomicBool::new(false));
            let counters = Arc::clone(&self.counters);
            let worker_stop = Arc::clone(&stop);

            let handle = std::thread::spawn(move || {
                produce(feed, data_tx, error_tx, worker_stop, counters)
            });

            self.data_rx = Some(data_rx);
            self.error_rx = Some(error_rx);
            self.worker = Worker::Running { handle, stop };
        }
    }

    /// Stops the producer and takes the feed back, leaving the worker idle.
    fn recall(&mut self) -> Option<F> {
        match std::mem::replace(&mut self.worker, Worker::Closed) {
            Worker::Running { handle, stop } => {
                stop.store(true, Ordering::Relaxed);
                // Unblock a producer stuck on a full queue.
                self.data_rx = None;
                self.peeked = None;
                match handle.join() {
                    Ok(feed) => Some(feed),
                    Err(_) => {
                        tracing::error!("streaming feed producer panicked");
                        None
                    }
                }
            }
            Worker::Idle(feed) => feed,
            Worker::Closed => None,
        }
    }
}

impl<F: TickFeed + 'static> TickFeed for StreamingFeed<F> {
    fn has_next(&mut self) -> bool {
        self.ensure_started();
        if self.peeked.is_some() {
            return true;
        }
        let Some(rx) = &self.data_rx else {
            return false;
        };
        match rx.recv() {
            Ok(tick) => {
                self.peeked = Some(tick);
                true
            }
            Err(_) => false,
        }
    }

    fn next(&mut self) -> FeedEvent {
        self.ensure_started();
        if let Some(tick) = self.peeked.take() {
            return FeedEvent::Tick(tick);
        }
        let Some(rx) = &self.data_rx else {
            return FeedEvent::EndOfStream;
        };
        match rx.recv() {
            Ok(tick) => FeedEvent::Tick(tick),
            Err(_) => FeedEvent::EndOfStream,
        }
    }

    fn reset(&mut self) -> SimResult<()> {
        if matches!(self.worker, Worker::Closed) && self.data_rx.is_none() {
            // recall() parks the worker as Closed while it runs; a true
            // close() clears the receivers too, which is what we detect.
            return Err(DataError::FeedClosed.into());
        }
        let Some(mut feed) = self.recall() else {
            return Err(DataError::FeedWorker("producer thread lost".to_string()).into());
        };
        feed.reset()?;
        *self.counters.lock() = FeedCounters::default();
        self.error_rx = None;
        self.worker = Worker::Idle(Some(feed));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut feed) = self.recall() {
            feed.close();
        }
        self.data_rx = None;
        self.error_rx = None;
        self.peeked = None;
        self.worker = Worker::Closed;
    }

    fn counters(&self) -> FeedCounters {
        *self.counters.lock()
    }
}

impl<F: TickFeed + 'static> Drop for StreamingFeed<F> {
    fn drop(&mut self) {
        if matches!(self.worker, Worker::Running { .. }) {
            self.close();
        }
    }
}

/// Producer loop: drains the feed into the bounded queue until the source
/// ends, the consumer goes away, or a stop is requested. Returns the feed so
/// reset can restart it.
fn produce<F: TickFeed>(
    mut feed: F,
    data_tx: Sender<Tick>,
    error_tx: Sender<(u64, String)>,
    stop: Arc<AtomicBool>,
    counters: Arc<Mutex<FeedCounters>>,
) -> F {
    while !stop.load(Ordering::Relaxed) {
        if !feed.has_next() {
            break;
        }
        let event = feed.next();
        *counters.lock() = feed.counters();

        match event {
            FeedEvent::Tick(mut tick) => loop {
                match data_tx.send_timeout(tick, SEND_POLL) {
                    Ok(()) => break,
                    Err(SendTimeoutError::Timeout(t)) => {
                        tick = t;
                        if stop.load(Ordering::Relaxed) {
                            return feed;
                        }
                    }
                    Err(SendTimeoutError::Disconnected(_)) => return feed,
                }
            },
            FeedEvent::ParseError { line, reason } => {
                let _ = error_tx.send((line, reason));
            }
            FeedEvent::EndOfStream => break,
        }
    }
    feed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Price, Qty},
        feed::VecFeed,
    };
    use chrono::{DateTime, Duration as ChronoDuration, Utc};

    fn ticks(n: usize) -> Vec<Tick> {
        let start = DateTime::parse_from_rfc3339("2025-06-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        (0..n)
            .map(|i| Tick {
                timestamp: start + ChronoDuration::seconds(i as i64),
                bid: Price(1.1),
                ask: Price(1.1001),
                bid_qty: Qty(1.0),
                ask_qty: Qty(1.0),
                last_price: Price(1.1),
                volume: Qty(1.0),
                sequence: 0,
            })
            .collect()
    }

    #[test]
    fn test_streams_all_ticks_in_order() {
        let mut feed = StreamingFeed::new(VecFeed::new(ticks(250)));
        let mut sequences = Vec::new();
        while feed.has_next() {
            if let FeedEvent::Tick(t) = feed.next() {
                sequences.push(t.sequence);
            }
        }
        assert_eq!(sequences.len(), 250);
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(feed.counters().ticks_read, 250);
    }

    #[test]
    fn test_backpressure_does_not_drop_ticks() {
        // Far more ticks than the queue holds; the consumer drains slowly.
        let total = STREAM_QUEUE_CAPACITY * 3;
        let mut feed = StreamingFeed::new(VecFeed::new(ticks(total)));
        let mut seen = 0;
        while feed.has_next() {
            if let FeedEvent::Tick(_) = feed.next() {
                seen += 1;
            }
            if seen % 50 == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        assert_eq!(seen, total);
    }

    #[test]
    fn test_reset_restarts_the_stream() {
        let mut feed = StreamingFeed::new(VecFeed::new(ticks(10)));
        let mut first = Vec::new();
        while feed.has_next() {
            if let FeedEvent::Tick(t) = feed.next() {
                first.push(t.timestamp);
            }
        }
        feed.reset().unwrap();
        assert_eq!(feed.counters(), FeedCounters::default());

        let mut second = Vec::new();
        while feed.has_next() {
            if let FeedEvent::Tick(t) = feed.next() {
                second.push(t.timestamp);
            }
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_close_terminates_producer() {
        let mut feed = StreamingFeed::new(VecFeed::new(ticks(STREAM_QUEUE_CAPACITY * 5)));
        assert!(feed.has_next());
        feed.close();
        assert!(!feed.has_next());
        assert_eq!(feed.next(), FeedEvent::EndOfStream);
        assert!(feed.reset().is_err());
    }
}
