//! Timestomping heuristics.
//!
//! A file is flagged when its timestamps look implausible or deliberately
//! overwritten. Flags only annotate; they never exclude a file from copying.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::timestamps::TimestampSet;

/// Allowed clock skew before a timestamp counts as "in the future".
pub const CLOCK_SKEW_TOLERANCE_MINUTES: i64 = 5;

/// Earliest year considered plausible for a file timestamp.
pub const MIN_PLAUSIBLE_YEAR: i32 = 2000;

/// One independent reason a file's timestamps look tampered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SuspicionReason {
    /// Resolved timestamp lies beyond now plus the skew tolerance
    FutureTimestamp,
    /// Every available timestamp field holds the exact same instant
    IdenticalTimestamps,
    /// Year before 2000 or more than one year past the current year
    ImplausibleYear,
}

impl fmt::Display for SuspicionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspicionReason::FutureTimestamp => write!(f, "future timestamp"),
            SuspicionReason::IdenticalTimestamps => write!(f, "identical timestamps"),
            SuspicionReason::ImplausibleYear => write!(f, "implausible year"),
        }
    }
}

/// Collect every reason `resolved` (taken from `timestamps`) looks suspicious
/// relative to `now`. An empty result means nothing was flagged.
pub fn detect_suspicion(
    resolved: DateTime<Utc>,
    timestamps: &TimestampSet,
    now: DateTime<Utc>,
) -> Vec<SuspicionReason> {
    let mut reasons = Vec::new();

    if resolved > now + Duration::minutes(CLOCK_SKEW_TOLERANCE_MINUTES) {
        reasons.push(SuspicionReason::FutureTimestamp);
    }

    // A lone field is trivially "identical" to itself and proves nothing.
    let times = timestamps.available();
    if times.len() > 1 && times.iter().all(|t| *t == times[0]) {
        reasons.push(SuspicionReason::IdenticalTimestamps);
    }

    if resolved.year() < MIN_PLAUSIBLE_YEAR || resolved.year() > now.year() + 1 {
        reasons.push(SuspicionReason::ImplausibleYear);
    }

    reasons
}

/// True when any heuristic fires.
pub fn is_suspicious(resolved: DateTime<Utc>, timestamps: &TimestampSet, now: DateTime<Utc>) -> bool {
    !detect_suspicion(resolved, timestamps, now).is_empty()
}
