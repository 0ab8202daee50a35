//! Time values that know how they read in each time domain.
//!
//! A fixture source and a calendar sink may disagree on what "now" is: the
//! source can be replayed from a past season, or the sink can be shifted
//! forward to preview a schedule. [`TimeSource`] holds the two fixed offsets
//! for a run and every instant in the system is a [`Time`] built by it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// An instant adjusted for the runtime, source and sink time domains.
///
/// Ordering, equality and hashing only look at `at_runtime`, so values
/// anchored in different domains share a single timeline.
#[derive(Debug, Clone, Copy)]
pub struct Time {
    /// The value as it was received, in whatever domain it was anchored.
    pub raw: DateTime<Utc>,
    pub at_runtime: DateTime<Utc>,
    pub at_source: DateTime<Utc>,
    pub at_sink: DateTime<Utc>,
}

impl Time {
    pub fn to_full_string(&self) -> String {
        format!(
            "raw={},atSource={},atRuntime={},atSink={}",
            self.raw, self.at_source, self.at_runtime, self.at_sink
        )
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.at_runtime == other.at_runtime
    }
}

impl Eq for Time {}

impl Hash for Time {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.at_runtime.hash(state);
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at_runtime.cmp(&other.at_runtime)
    }
}

impl Add<TimeDelta> for Time {
    type Output = Time;

    fn add(self, rhs: TimeDelta) -> Time {
        Time {
            raw: self.raw + rhs,
            at_runtime: self.at_runtime + rhs,
            at_source: self.at_source + rhs,
            at_sink: self.at_sink + rhs,
        }
    }
}

impl Sub<TimeDelta> for Time {
    type Output = Time;

    fn sub(self, rhs: TimeDelta) -> Time {
        Time {
            raw: self.raw - rhs,
            at_runtime: self.at_runtime - rhs,
            at_source: self.at_source - rhs,
            at_sink: self.at_sink - rhs,
        }
    }
}

/// Builds [`Time`] values from instants anchored in one of the three domains.
///
/// `source_offset` shifts runtime instants into the source domain and
/// `sink_offset` shifts them into the sink domain. Both stay fixed for the
/// lifetime of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSource {
    source_offset: TimeDelta,
    sink_offset: TimeDelta,
}

impl TimeSource {
    pub fn new(source_offset: TimeDelta, sink_offset: TimeDelta) -> Self {
        TimeSource {
            source_offset,
            sink_offset,
        }
    }

    pub fn source_offset(&self) -> TimeDelta {
        self.source_offset
    }

    pub fn sink_offset(&self) -> TimeDelta {
        self.sink_offset
    }

    /// The current wall clock, anchored in the runtime domain.
    pub fn now(&self) -> Time {
        self.from_runtime(Utc::now())
    }

    pub fn from_runtime(&self, real: DateTime<Utc>) -> Time {
        Time {
            raw: real,
            at_runtime: real,
            at_source: real + self.source_offset,
            at_sink: real + self.sink_offset,
        }
    }

    pub fn from_source(&self, real: DateTime<Utc>) -> Time {
        let at_runtime = real - self.source_offset;
        Time {
            raw: real,
            at_runtime,
            at_source: real,
            at_sink: at_runtime + self.sink_offset,
        }
    }

    pub fn from_sink(&self, real: DateTime<Utc>) -> Time {
        let at_runtime = real - self.sink_offset;
        Time {
            raw: real,
            at_runtime,
            at_source: at_runtime + self.source_offset,
            at_sink: real,
        }
    }
}
