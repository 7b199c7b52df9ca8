//! Civil-date editorial rules: next-issue dates with weekend skipping and
//! per-slot freshness windows. All arithmetic happens in the configured
//! civil timezone, never UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::types::NewsletterVariant;

/// Base freshness windows in hours for Pivot 5 slots.
const PIVOT5_BASE_FRESHNESS_HOURS: [(u8, u32); 5] =
    [(1, 24), (2, 48), (3, 168), (4, 48), (5, 168)];

/// Freshness windows in hours for Signal slots. No weekend extension.
const SIGNAL_FRESHNESS_HOURS: [(u8, u32); 5] = [(1, 24), (2, 72), (3, 72), (4, 72), (5, 72)];

/// On Sunday/Monday runs, Pivot 5 slots with a base window of 48h or less
/// stretch to 72h to cover the weekend gap.
const WEEKEND_EXTENSION_HOURS: u32 = 72;

/// The date the next issue publishes for, given the civil time of the run.
/// Publishing days are Mon-Fri: Friday and Saturday runs skip to Monday.
pub fn next_issue_date(now: DateTime<Tz>) -> NaiveDate {
    let days_ahead = match now.weekday() {
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        _ => 1,
    };
    (now + Duration::days(days_ahead)).date_naive()
}

/// Human issue label, e.g. "Pivot 5 - Jan 02" or "Signal - Jan 12".
pub fn issue_label(variant: NewsletterVariant, date: NaiveDate) -> String {
    format!("{} - {}", variant.display_name(), date.format("%b %d"))
}

/// Freshness window in hours for a slot, given the run's civil weekday.
pub fn slot_freshness_hours(variant: NewsletterVariant, slot: u8, weekday: Weekday) -> u32 {
    match variant {
        NewsletterVariant::Pivot5 => {
            let base = lookup(&PIVOT5_BASE_FRESHNESS_HOURS, slot);
            let weekend_run = matches!(weekday, Weekday::Sun | Weekday::Mon);
            if weekend_run && base <= 48 {
                WEEKEND_EXTENSION_HOURS
            } else {
                base
            }
        }
        NewsletterVariant::Signal => lookup(&SIGNAL_FRESHNESS_HOURS, slot),
    }
}

fn lookup(table: &[(u8, u32)], slot: u8) -> u32 {
    table
        .iter()
        .find(|(s, _)| *s == slot)
        .map(|(_, hours)| *hours)
        .unwrap_or(168)
}

/// Convert a UTC instant to the configured civil timezone.
pub fn civil_now(tz: Tz, now_utc: DateTime<Utc>) -> DateTime<Tz> {
    now_utc.with_timezone(&tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn civil(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        New_York.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn friday_evening_run_targets_monday() {
        // Friday 2026-01-09 at 21:25 ET -> Monday 2026-01-12.
        let now = civil(2026, 1, 9, 21, 25);
        assert_eq!(now.weekday(), Weekday::Fri);
        assert_eq!(next_issue_date(now), NaiveDate::from_ymd_opt(2026, 1, 12).unwrap());
    }

    #[test]
    fn saturday_run_targets_monday() {
        let now = civil(2026, 1, 10, 9, 0);
        assert_eq!(now.weekday(), Weekday::Sat);
        assert_eq!(next_issue_date(now), NaiveDate::from_ymd_opt(2026, 1, 12).unwrap());
    }

    #[test]
    fn midweek_run_targets_next_day() {
        let now = civil(2026, 1, 13, 23, 55);
        assert_eq!(now.weekday(), Weekday::Tue);
        assert_eq!(next_issue_date(now), NaiveDate::from_ymd_opt(2026, 1, 14).unwrap());
    }

    #[test]
    fn civil_timezone_matters_near_midnight() {
        // 02:25 UTC Friday is still 21:25 Thursday in New York; the issue is
        // for Friday, not Monday.
        let utc = Utc.with_ymd_and_hms(2026, 1, 9, 2, 25, 0).unwrap();
        let civil = civil_now(New_York, utc);
        assert_eq!(civil.weekday(), Weekday::Thu);
        assert_eq!(
            next_issue_date(civil),
            NaiveDate::from_ymd_opt(2026, 1, 9).unwrap()
        );
    }

    #[test]
    fn pivot5_weekend_extension() {
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Pivot5, 1, Weekday::Sun),
            72
        );
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Pivot5, 1, Weekday::Mon),
            72
        );
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Pivot5, 1, Weekday::Wed),
            24
        );
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Pivot5, 2, Weekday::Sun),
            72
        );
        // 7-day slots never extend.
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Pivot5, 3, Weekday::Sun),
            168
        );
    }

    #[test]
    fn signal_freshness_has_no_weekend_extension() {
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Signal, 1, Weekday::Sun),
            24
        );
        assert_eq!(
            slot_freshness_hours(NewsletterVariant::Signal, 4, Weekday::Wed),
            72
        );
    }

    #[test]
    fn issue_labels() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(
            issue_label(NewsletterVariant::Pivot5, date),
            "Pivot 5 - Jan 02"
        );
        assert_eq!(issue_label(NewsletterVariant::Signal, date), "Signal - Jan 02");
    }
}
