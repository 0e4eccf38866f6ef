// ── Accounting windows ──
//
// A window is a bounded accounting period: the local calendar day, or
// a billing month starting on a configured day-of-month. Windows are
// identified by a date-string key; a key change is a rollover.

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Accounting window kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Daily,
    BillingMonth,
}

/// Compute the window key for a sample timestamp.
///
/// Daily windows roll at local midnight; billing windows roll at the
/// configured day-of-month (clamped to the month's length). The key is
/// the window's start date as `YYYY-MM-DD`.
pub fn window_key(window: Window, billing_reset_day: u8, at: DateTime<Utc>) -> String {
    let local_date = at.with_timezone(&Local).date_naive();
    let start = match window {
        Window::Daily => local_date,
        Window::BillingMonth => billing_period_start(local_date, billing_reset_day),
    };
    start.format("%Y-%m-%d").to_string()
}

/// Start date of the billing period containing `date`.
pub(crate) fn billing_period_start(date: NaiveDate, reset_day: u8) -> NaiveDate {
    let reset_day = u32::from(reset_day.clamp(1, 31));
    let this_month = clamped_date(date.year(), date.month(), reset_day);
    if date >= this_month {
        this_month
    } else {
        let (year, month) = if date.month() == 1 {
            (date.year() - 1, 12)
        } else {
            (date.year(), date.month() - 1)
        };
        clamped_date(year, month, reset_day)
    }
}

/// Build a date, pulling the day inward to the month's last day when
/// needed (reset day 31 in February, etc.).
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .unwrap_or_default()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn billing_period_starts_this_month_on_or_after_reset_day() {
        assert_eq!(
            billing_period_start(date(2024, 5, 20), 15),
            date(2024, 5, 15)
        );
        assert_eq!(
            billing_period_start(date(2024, 5, 15), 15),
            date(2024, 5, 15)
        );
    }

    #[test]
    fn billing_period_starts_previous_month_before_reset_day() {
        assert_eq!(
            billing_period_start(date(2024, 5, 10), 15),
            date(2024, 4, 15)
        );
    }

    #[test]
    fn billing_period_wraps_year_boundary() {
        assert_eq!(
            billing_period_start(date(2024, 1, 5), 15),
            date(2023, 12, 15)
        );
    }

    #[test]
    fn reset_day_is_clamped_to_month_length() {
        // Reset day 31 in a leap-year February pulls in to the 29th.
        assert_eq!(
            billing_period_start(date(2024, 2, 29), 31),
            date(2024, 2, 29)
        );
        assert_eq!(
            billing_period_start(date(2024, 3, 5), 31),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn first_of_month_reset_covers_whole_month() {
        assert_eq!(billing_period_start(date(2024, 5, 1), 1), date(2024, 5, 1));
        assert_eq!(
            billing_period_start(date(2024, 5, 31), 1),
            date(2024, 5, 1)
        );
    }

    #[test]
    fn daily_keys_differ_across_days() {
        let early = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // 72 hours later is a different local date in any timezone.
        let late = early + chrono::Duration::hours(72);
        assert_ne!(
            window_key(Window::Daily, 1, early),
            window_key(Window::Daily, 1, late)
        );
    }
}
