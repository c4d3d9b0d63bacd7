//! Half-open time periods used for demand buckets and forecast horizons.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A half-open interval `[start, end)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Period {
    /// Build a period; `end` must be strictly after `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DomainResult<Self> {
        if end <= start {
            return Err(DomainError::validation(format!(
                "period end ({end}) must be after start ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// A period of `days` whole days starting at `start` (`days` must be > 0).
    pub fn days_from(start: DateTime<Utc>, days: i64) -> DomainResult<Self> {
        if days <= 0 {
            return Err(DomainError::validation("period length must be positive"));
        }
        let length = Duration::try_days(days)
            .ok_or_else(|| DomainError::validation(format!("{days} days is out of range")))?;
        Self::starting_at(start, length)
    }

    /// A period of `length` starting at `start`; fails instead of overflowing.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> DomainResult<Self> {
        let end = start.checked_add_signed(length).ok_or_else(|| {
            DomainError::validation(format!("period of {length} from {start} is out of range"))
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Period length in (possibly fractional) days; an hour is `1/24`.
    pub fn length_days(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / MILLIS_PER_DAY
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Period) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The span of `count` back-to-back periods of this length starting at `end`.
    pub fn following(&self, count: u32) -> DomainResult<Period> {
        if count == 0 {
            return Err(DomainError::validation("period count must be positive"));
        }
        let out_of_range = || {
            DomainError::validation(format!("{count} periods after {self} are out of range"))
        };
        let millis = self
            .duration()
            .num_milliseconds()
            .checked_mul(i64::from(count))
            .ok_or_else(out_of_range)?;
        let length = Duration::try_milliseconds(millis).ok_or_else(out_of_range)?;
        Self::starting_at(self.end, length).map_err(|_| out_of_range())
    }
}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}
