//! Core types for OntoAgg

use crate::{AggregationError, Result};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp in milliseconds since Unix epoch
pub type Timestamp = i64;

/// Offset date-time as carried by `xsd:dateTime` literals
pub type DateTimeOffset = DateTime<FixedOffset>;

/// Ontology resource IRI identifying a discrete state value (ON, OFF, OPEN, ...)
pub type ResourceId = String;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Parse an ISO-8601 offset date-time
pub fn parse_timestamp(s: &str) -> Result<DateTimeOffset> {
    DateTime::parse_from_rfc3339(s.trim())
        .map_err(|_| AggregationError::InvalidTimestamp(s.to_string()))
}

/// Render a date-time the way it is stored in the ontology
pub fn format_timestamp(dt: &DateTimeOffset) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Parse a finite 64-bit float; `INF` and `NaN` are rejected
pub fn parse_finite(lexical: &str) -> Result<f64> {
    let invalid = |reason: String| AggregationError::InvalidNumber {
        value: lexical.to_string(),
        reason,
    };
    let value = lexical.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if !value.is_finite() {
        return Err(invalid("not a finite number".to_string()));
    }
    Ok(value)
}

/// Half-open time interval `[start, end)` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Start timestamp (inclusive)
    start: Timestamp,
    /// End timestamp (exclusive)
    end: Timestamp,
}

impl Interval {
    /// Create a new interval, rejecting `start > end`
    pub fn new(start: Timestamp, end: Timestamp) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Interval between two date-times
    pub fn between(start: &DateTimeOffset, end: &DateTimeOffset) -> Option<Self> {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Intersection of two intervals, `None` when they do not share any time
    pub fn overlap(&self, other: &Interval) -> Option<Interval> {
        if self.end <= other.start || other.end <= self.start {
            return None;
        }
        Some(Interval {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Duration in milliseconds
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// Total time covered by a set of intervals, overlapping parts counted once
    pub fn union_duration(intervals: &mut [Interval]) -> i64 {
        intervals.sort_by_key(|i| i.start);
        let mut total = 0;
        let mut current: Option<Interval> = None;
        for next in intervals.iter() {
            current = match current {
                Some(cur) if next.start <= cur.end => Some(Interval {
                    start: cur.start,
                    end: cur.end.max(next.end),
                }),
                Some(cur) => {
                    total += cur.duration();
                    Some(*next)
                }
                None => Some(*next),
            };
        }
        total + current.map_or(0, |c| c.duration())
    }
}

/// Aggregation granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::Year];

    /// Window length in days; each period is a whole multiple of its child
    pub fn days(&self) -> i64 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 28,
            Period::Year => 364,
        }
    }

    /// Window length in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.days() * MILLIS_PER_DAY
    }

    /// Period whose aggregates this period re-aggregates
    pub fn child(&self) -> Option<Period> {
        match self {
            Period::Day => None,
            Period::Week => Some(Period::Day),
            Period::Month => Some(Period::Week),
            Period::Year => Some(Period::Month),
        }
    }

    /// Name used for the ontology individual (`NS:Day`, ...)
    pub fn ontology_name(&self) -> &'static str {
        match self {
            Period::Day => "Day",
            Period::Week => "Week",
            Period::Month => "Month",
            Period::Year => "Year",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "DAY",
            Period::Week => "WEEK",
            Period::Month => "MONTH",
            Period::Year => "YEAR",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAY" => Ok(Period::Day),
            "WEEK" => Ok(Period::Week),
            "MONTH" => Ok(Period::Month),
            "YEAR" => Ok(Period::Year),
            _ => Err(AggregationError::Config(format!("unsupported period '{}'", s))),
        }
    }
}

/// Time window of one aggregation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationWindow {
    pub from: DateTimeOffset,
    pub until: DateTimeOffset,
    pub period: Period,
}

impl AggregationWindow {
    /// Window of `period` closing at `boundary`
    pub fn ending_at(period: Period, boundary: DateTimeOffset) -> Self {
        Self {
            from: boundary - Duration::days(period.days()),
            until: boundary,
            period,
        }
    }

    pub fn from_millis(&self) -> Timestamp {
        self.from.timestamp_millis()
    }

    pub fn until_millis(&self) -> Timestamp {
        self.until.timestamp_millis()
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.from_millis(),
            end: self.until_millis().max(self.from_millis()),
        }
    }

    /// Window length in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.interval().duration()
    }
}

impl fmt::Display for AggregationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {})",
            self.period,
            format_timestamp(&self.from),
            format_timestamp(&self.until)
        )
    }
}

/// Typed RDF literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// Lexical form
    pub lexical: String,
    /// Datatype IRI
    pub datatype: String,
}

impl Literal {
    pub fn new(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: datatype.into(),
        }
    }

    /// Parse the lexical form as a finite 64-bit float
    pub fn as_f64(&self) -> Result<f64> {
        parse_finite(&self.lexical)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"^^<{}>", self.lexical, self.datatype)
    }
}
