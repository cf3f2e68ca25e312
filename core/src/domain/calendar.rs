//! Date arithmetic for payment schedules and recurring templates.
//!
//! Every month-based step clamps the day to the last day of the target
//! month, so a schedule anchored on the 31st falls on Feb 28 (or 29) and
//! returns to the 31st in March.

use chrono::{Datelike, Duration, NaiveDate};
use shared::{Frequency, Recurrence};

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

/// The date of `day` in the given month, clamped to the month's last day
pub fn clamp_to_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Move `months` calendar months from (`year`, `month`); `None` past the
/// representable range
pub fn shift_month(year: i32, month: u32, months: i32) -> Option<(i32, u32)> {
    let index = year
        .checked_mul(12)?
        .checked_add(i32::try_from(month).ok()? - 1)?
        .checked_add(months)?;
    Some((index.div_euclid(12), index.rem_euclid(12) as u32 + 1))
}

/// Add months to a date, anchoring on `anchor_day` rather than the date's own day
pub fn add_months_clamped(date: NaiveDate, months: i32, anchor_day: u32) -> Option<NaiveDate> {
    let (year, month) = shift_month(date.year(), date.month(), months)?;
    clamp_to_month(year, month, anchor_day)
}

/// Payment date for `payment_day` in the month containing `date`
pub fn payment_date_in_month(date: NaiveDate, payment_day: u32) -> Option<NaiveDate> {
    clamp_to_month(date.year(), date.month(), payment_day)
}

/// First payment date on or after `from`
pub fn next_payment_date(from: NaiveDate, payment_day: u32) -> Option<NaiveDate> {
    let this_month = payment_date_in_month(from, payment_day)?;
    if this_month >= from {
        Some(this_month)
    } else {
        add_months_clamped(from, 1, payment_day)
    }
}

/// Occurrence that follows `current` in a recurring template
///
/// `anchor` is the template's original date; its day of month is kept for
/// monthly and yearly schedules.
pub fn next_occurrence(current: NaiveDate, anchor: NaiveDate, recurrence: &Recurrence) -> Option<NaiveDate> {
    let interval = recurrence.interval.max(1);
    match recurrence.frequency {
        Frequency::Daily => current.checked_add_signed(Duration::days(interval as i64)),
        Frequency::Weekly => current.checked_add_signed(Duration::weeks(interval as i64)),
        Frequency::Monthly => add_months_clamped(current, i32::try_from(interval).ok()?, anchor.day()),
        Frequency::Yearly => {
            let months = i32::try_from(interval).ok()?.checked_mul(12)?;
            let (year, month) = shift_month(current.year(), anchor.month(), months)?;
            clamp_to_month(year, month, anchor.day())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }

    #[test]
    fn test_payment_day_is_clamped_for_every_month() {
        for year in [2023, 2024] {
            for month in 1..=12 {
                for payment_day in 1..=31 {
                    let due = clamp_to_month(year, month, payment_day).unwrap();
                    assert_eq!(due.day(), payment_day.min(days_in_month(year, month)));
                    assert_eq!(due.month(), month);
                }
            }
        }
    }

    #[test]
    fn test_add_months_returns_to_anchor_day() {
        let feb = add_months_clamped(date(2023, 1, 31), 1, 31).unwrap();
        assert_eq!(feb, date(2023, 2, 28));
        let mar = add_months_clamped(feb, 1, 31).unwrap();
        assert_eq!(mar, date(2023, 3, 31));
    }

    #[test]
    fn test_shift_month_crosses_years() {
        assert_eq!(shift_month(2023, 12, 1), Some((2024, 1)));
        assert_eq!(shift_month(2024, 1, -1), Some((2023, 12)));
        assert_eq!(shift_month(2024, 3, 24), Some((2026, 3)));
        assert_eq!(shift_month(2024, 3, i32::MAX), None);
    }

    #[test]
    fn test_next_payment_date() {
        assert_eq!(next_payment_date(date(2024, 2, 10), 15), Some(date(2024, 2, 15)));
        assert_eq!(next_payment_date(date(2024, 2, 20), 15), Some(date(2024, 3, 15)));
        assert_eq!(next_payment_date(date(2023, 2, 1), 31), Some(date(2023, 2, 28)));
    }

    #[test]
    fn test_next_occurrence_per_frequency() {
        let anchor = date(2024, 1, 31);
        let monthly = Recurrence {
            frequency: Frequency::Monthly,
            interval: 1,
            next_date: None,
            end_date: None,
        };
        assert_eq!(next_occurrence(anchor, anchor, &monthly), Some(date(2024, 2, 29)));
        assert_eq!(next_occurrence(date(2024, 2, 29), anchor, &monthly), Some(date(2024, 3, 31)));

        let weekly = Recurrence { frequency: Frequency::Weekly, interval: 2, ..monthly.clone() };
        assert_eq!(next_occurrence(anchor, anchor, &weekly), Some(date(2024, 2, 14)));

        let leap = date(2024, 2, 29);
        let yearly = Recurrence { frequency: Frequency::Yearly, ..monthly };
        assert_eq!(next_occurrence(leap, leap, &yearly), Some(date(2025, 2, 28)));
    }

    #[test]
    fn test_next_occurrence_with_huge_interval_is_none() {
        let anchor = date(2024, 1, 1);
        for frequency in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly, Frequency::Yearly] {
            let recurrence = Recurrence {
                frequency,
                interval: 200_000_000,
                next_date: None,
                end_date: None,
            };
            assert_eq!(next_occurrence(anchor, anchor, &recurrence), None);
        }
    }
}
