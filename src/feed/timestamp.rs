use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::DataError;

/// The recognized timestamp shapes, probed in order. Zone-less formats are
/// interpreted as UTC; date-only rows land on midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// RFC3339, with or without fractional seconds down to nanos.
    Rfc3339,
    /// A zone-less date-time pattern.
    NaiveDateTime(&'static str),
    /// A bare date pattern.
    NaiveDate(&'static str),
}

const SHAPES: &[Shape] = &[
    Shape::Rfc3339,
    // ISO-8601 with milliseconds but no zone designator.
    Shape::NaiveDateTime("%Y-%m-%dT%H:%M:%S%.f"),
    // Space-separated date-time, fractional seconds optional.
    Shape::NaiveDateTime("%Y-%m-%d %H:%M:%S%.f"),
    Shape::NaiveDate("%Y-%m-%d"),
    // US month-first, with and without a time part.
    Shape::NaiveDateTime("%m/%d/%Y %H:%M:%S"),
    Shape::NaiveDate("%m/%d/%Y"),
];

/// Parses record timestamps, auto-detecting the format from the recognized
/// list unless an explicit chrono pattern is pinned.
///
/// The first shape that matches is cached and tried first on subsequent
/// rows; a miss falls back to a full rescan so one odd row cannot poison the
/// rest of the file.
#[derive(Debug, Clone, Default)]
pub struct TimestampParser {
    explicit: Option<String>,
    detected: Option<usize>,
}

impl TimestampParser {
    /// Auto-detecting parser.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Parser pinned to one chrono format string.
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            explicit: Some(format.into()),
            detected: None,
        }
    }

    pub fn parse(&mut self, raw: &str) -> Result<DateTime<Utc>, DataError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DataError::Timestamp(raw.to_string()));
        }

        if let Some(format) = &self.explicit {
            return parse_pinned(raw, format);
        }

        if let Some(idx) = self.detected
            && let Some(ts) = try_shape(raw, SHAPES[idx])
        {
            return Ok(ts);
        }

        for (idx, shape) in SHAPES.iter().enumerate() {
            if let Some(ts) = try_shape(raw, *shape) {
                self.detected = Some(idx);
                return Ok(ts);
            }
        }

        Err(DataError::Timestamp(raw.to_string()))
    }

    /// Back to the freshly-constructed state, forgetting any detection.
    pub fn rewind(&mut self) {
        self.detected = None;
    }
}

fn try_shape(raw: &str, shape: Shape) -> Option<DateTime<Utc>> {
    match shape {
        Shape::Rfc3339 => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Shape::NaiveDateTime(format) => NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .map(|naive| naive.and_utc()),
        Shape::NaiveDate(format) => NaiveDate::parse_from_str(raw, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc()),
    }
}

fn parse_pinned(raw: &str, format: &str) -> Result<DateTime<Utc>, DataError> {
    if let Ok(ts) = DateTime::parse_from_str(raw, format) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, format)
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(naive.and_utc());
    }
    Err(DataError::Timestamp(raw.to_string()))
}
