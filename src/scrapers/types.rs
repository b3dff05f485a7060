use crate::error::RowError;
use std::time::Duration;

/// Number of text fields every listing row carries before its action cell
pub const LISTING_FIELD_COUNT: usize = 5;

/// Delay growth between fetch attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles the delay after each failed attempt, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// How many times a fetch is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// No waiting between attempts; used by tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Wait before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

/// One `<tr>` of the listing table, as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListingRow {
    /// Text of every cell except the last
    pub fields: Vec<String>,
    /// Print page URL resolved from the last cell's action link
    pub detail_url: Option<String>,
}

/// The fixed leading fields of a listing row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFields {
    pub date_range: String,
    pub place: String,
    pub department: String,
    pub event: String,
    pub approval: String,
}

impl TryFrom<&RawListingRow> for ListingFields {
    type Error = RowError;

    fn try_from(row: &RawListingRow) -> Result<Self, Self::Error> {
        match row.fields.as_slice() {
            [date_range, place, department, event, approval, ..] => Ok(Self {
                date_range: date_range.clone(),
                place: place.clone(),
                department: department.clone(),
                event: event.clone(),
                approval: approval.clone(),
            }),
            short => Err(RowError::TooFewFields {
                found: short.len(),
                expected: LISTING_FIELD_COUNT,
            }),
        }
    }
}
