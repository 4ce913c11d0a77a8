use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Price, Qty, Tick, TickValidator},
    error::{DataError, IoError, SimResult},
    feed::{timestamp::TimestampParser, FeedCounters, FeedEvent, TickFeed},
};

// ================================================================================================
// Column Layout
// ================================================================================================

/// Zero-based column indices for the tick schema. The default matches
/// `timestamp, bid, ask, bid_qty, ask_qty, last_price, volume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub timestamp: usize,
    pub bid: usize,
    pub ask: usize,
    pub bid_qty: usize,
    pub ask_qty: usize,
    pub last_price: usize,
    pub volume: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            timestamp: 0,
            bid: 1,
            ask: 2,
            bid_qty: 3,
            ask_qty: 4,
            last_price: 5,
            volume: 6,
        }
    }
}

impl ColumnMap {
    /// Name-based detection from a header row, using the recognized alias
    /// table. Returns a map only when at least timestamp, bid, and ask were
    /// identified; unmatched optional columns keep their configured index.
    fn from_header(header: &str, fallback: ColumnMap) -> Option<ColumnMap> {
        let mut map = fallback;
        let mut found_ts = false;
        let mut found_bid = false;
        let mut found_ask = false;

        for (idx, raw) in header.split(',').enumerate() {
            let name = raw.trim().to_ascii_lowercase();
            match name.as_str() {
                "timestamp" | "time" | "ts" | "date" | "datetime" => {
                    map.timestamp = idx;
                    found_ts = true;
                }
                "bid" | "bid_price" => {
                    map.bid = idx;
                    found_bid = true;
                }
                "ask" | "ask_price" | "offer" => {
                    map.ask = idx;
                    found_ask = true;
                }
                "bid_qty" | "bid_size" | "bid_quantity" => map.bid_qty = idx,
                "ask_qty" | "ask_size" | "ask_quantity" => map.ask_qty = idx,
                "last" | "last_price" | "price" | "close" => map.last_price = idx,
                "volume" | "vol" | "qty" | "size" => map.volume = idx,
                _ => {}
            }
        }

        (found_ts && found_bid && found_ask).then_some(map)
    }
}

// ================================================================================================
// CSV Feed
// ================================================================================================

/// Streaming CSV quote source: one tick per row, parsed lazily with per-row
/// error recovery. A malformed row becomes a [`FeedEvent::ParseError`] and
/// the stream keeps going; a row that parses but fails validation is counted
/// and skipped silently.
pub struct CsvFeed {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    configured_columns: ColumnMap,
    active_columns: ColumnMap,
    skip_header: bool,
    header_pending: bool,
    validator: TickValidator,
    timestamps: TimestampParser,
    counters: FeedCounters,
    next_sequence: u64,
    line_no: u64,
    peeked: Option<Peeked>,
    closed: bool,
}

/// A buffered lookahead: either a data line or an I/O failure pinned to its
/// line number.
enum Peeked {
    Line(u64, String),
    ReadError(u64, String),
}

impl CsvFeed {
    pub fn open(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open_reader(&path)?;
        Ok(Self {
            path,
            reader: Some(reader),
            configured_columns: ColumnMap::default(),
            active_columns: ColumnMap::default(),
            skip_header: true,
            header_pending: true,
            validator: TickValidator::default(),
            timestamps: TimestampParser::auto(),
            counters: FeedCounters::default(),
            next_sequence: 0,
            line_no: 0,
            peeked: None,
            closed: false,
        })
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.configured_columns = columns;
        self.active_columns = columns;
        self
    }

    pub fn with_skip_header(mut self, skip_header: bool) -> Self {
        self.skip_header = skip_header;
        self.header_pending = skip_header;
        self
    }

    pub fn with_validator(mut self, validator: TickValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_timestamps(mut self, timestamps: TimestampParser) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Reads the next physical line, consuming the header first if one is
    /// still due.
    fn take_line(&mut self) -> Option<Peeked> {
        if let Some(line) = self.peeked.take() {
            return Some(line);
        }
        self.fill_peek();
        self.peeked.take()
    }

    fn fill_peek(&mut self) {
        if self.peeked.is_some() || self.closed {
            return;
        }
        let Some(reader) = self.reader.as_mut() else {
            return;
        };

        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return,
                Ok(_) => {
                    self.line_no += 1;
                    if self.header_pending {
                        self.header_pending = false;
                        if let Some(map) =
                            ColumnMap::from_header(&line, self.configured_columns)
                        {
                            tracing::debug!(?map, "column layout detected from header");
                            self.active_columns = map;
                        }
                        continue;
                    }
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.trim().is_empty() {
                        continue;
                    }
                    self.peeked = Some(Peeked::Line(self.line_no, trimmed.to_string()));
                    return;
                }
                Err(e) => {
                    // Treat an unreadable chunk like a bad record: surface it
                    // once and keep the stream alive.
                    self.line_no += 1;
                    self.peeked = Some(Peeked::ReadError(self.line_no, e.to_string()));
                    return;
                }
            }
        }
    }

    fn parse_row(&mut self, line: &str) -> Result<Tick, DataError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let columns = self.active_columns;

        let required = |idx: usize| -> Result<&str, DataError> {
            fields.get(idx).copied().ok_or_else(|| {
                DataError::InvalidQuote(format!(
                    "expected at least {} columns, got {}",
                    idx + 1,
                    fields.len()
                ))
            })
        };
        // Trailing optional columns default to zero when the row is short.
        let optional = |idx: usize| -> Result<f64, DataError> {
            match fields.get(idx) {
                Some(raw) if !raw.is_empty() => Ok(raw.parse::<f64>()?),
                _ => Ok(0.0),
            }
        };

        let timestamp = self.timestamps.parse(required(columns.timestamp)?)?;
        let bid: f64 = required(columns.bid)?.parse()?;
        let ask: f64 = required(columns.ask)?.parse()?;

        Ok(Tick {
            timestamp,
            bid: Price(bid),
            ask: Price(ask),
            bid_qty: Qty(optional(columns.bid_qty)?),
            ask_qty: Qty(optional(columns.ask_qty)?),
            last_price: Price(optional(columns.last_price)?),
            volume: Qty(optional(columns.volume)?),
            sequence: 0,
        })
    }
}

impl TickFeed for CsvFeed {
    fn has_next(&mut self) -> bool {
        self.fill_peek();
        self.peeked.is_some()
    }

    fn next(&mut self) -> FeedEvent {
        loop {
            let (line_no, line) = match self.take_line() {
                None => return FeedEvent::EndOfStream,
                Some(Peeked::ReadError(line, reason)) => {
                    self.counters.lines_processed += 1;
                    self.counters.parse_errors += 1;
                    return FeedEvent::ParseError { line, reason };
                }
                Some(Peeked::Line(line_no, line)) => (line_no, line),
            };
            self.counters.lines_processed += 1;

            match self.parse_row(&line) {
                Ok(mut tick) => {
                    if let Err(e) = self.validator.validate(&tick) {
                        self.counters.invalid_ticks += 1;
                        tracing::debug!(line = line_no, reason = %e, "quote failed validation");
                        continue;
                    }
                    tick.sequence = self.next_sequence;
                    self.next_sequence += 1;
                    self.counters.ticks_read += 1;
                    self.counters.valid_ticks += 1;
                    return FeedEvent::Tick(tick);
                }
                Err(e) => {
                    self.counters.parse_errors += 1;
                    return FeedEvent::ParseError {
                        line: line_no,
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    fn reset(&mut self) -> SimResult<()> {
        if self.closed {
            return Err(DataError::FeedClosed.into());
        }
        self.reader = Some(open_reader(&self.path)?);
        self.active_columns = self.configured_columns;
        self.header_pending = self.skip_header;
        self.timestamps.rewind();
        self.counters = FeedCounters::default();
        self.next_sequence = 0;
        self.line_no = 0;
        self.peeked = None;
        Ok(())
    }

    fn close(&mut self) {
        self.reader = None;
        self.peeked = None;
        self.closed = true;
    }

    fn counters(&self) -> FeedCounters {
        self.counters
    }
}

fn open_reader(path: &Path) -> SimResult<BufReader<File>> {
    let file = File::open(path).map_err(|e| IoError::OpenFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(BufReader::new(file))
}
