//! Billing-period arithmetic.

use chrono::{DateTime, Months};

const FALLBACK_PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

/// End of a one-calendar-month period starting at `start` (Unix seconds).
///
/// Day-of-month overflow clamps to the last day of the target month
/// (Jan 31 -> Feb 28/29).
pub fn one_month_after(start: i64) -> i64 {
    DateTime::from_timestamp(start, 0)
        .and_then(|dt| dt.checked_add_months(Months::new(1)))
        .map_or(start + FALLBACK_PERIOD_SECS, |dt| dt.timestamp())
}
