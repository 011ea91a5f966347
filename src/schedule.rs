//! Elapsed-day and route-day arithmetic.
//!
//! Everything here is pure. Day counts are whole days with a floor of one so
//! they can always be used as divisors.

use chrono::{DateTime, Duration, Utc, Weekday};

/// Lookahead used when a customer has no route days at all.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 7;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Absolute distance between two instants in days, rounded up, never below 1.
pub fn elapsed_days(t1: DateTime<Utc>, t2: DateTime<Utc>) -> i64 {
    let millis = (t2 - t1).num_milliseconds().unsigned_abs() as f64;
    let days = (millis / 1000.0 / SECONDS_PER_DAY).ceil() as i64;
    days.max(1)
}

/// Days until the next occurrence of any route weekday, in `1..=7`.
///
/// Today being a route day means the *next* visit, a week away.
pub fn days_until_next_route(route_weekdays: &[Weekday], today: Weekday) -> i64 {
    if route_weekdays.is_empty() {
        return DEFAULT_LOOKAHEAD_DAYS;
    }

    let mut day = today;
    for offset in 1..=7 {
        day = day.succ();
        if route_weekdays.contains(&day) {
            return offset;
        }
    }
    DEFAULT_LOOKAHEAD_DAYS
}

/// `at` shifted by a fractional number of days, saturating at the
/// representable range.
pub fn add_days(at: DateTime<Utc>, days: f64) -> DateTime<Utc> {
    let secs = (days * SECONDS_PER_DAY).round();
    if !secs.is_finite() {
        return at;
    }
    Duration::try_seconds(secs as i64)
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(day: i64, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap() + Duration::days(day)
    }

    #[test]
    fn elapsed_days_rounds_up_and_floors_at_one() {
        assert_eq!(elapsed_days(at(0, 8), at(0, 8)), 1);
        assert_eq!(elapsed_days(at(0, 8), at(0, 9)), 1);
        assert_eq!(elapsed_days(at(0, 8), at(3, 8)), 3);
        assert_eq!(elapsed_days(at(0, 8), at(3, 9)), 4);
    }

    #[test]
    fn elapsed_days_is_symmetric() {
        assert_eq!(elapsed_days(at(5, 0), at(0, 12)), elapsed_days(at(0, 12), at(5, 0)));
    }

    #[rstest]
    #[case(&[Weekday::Mon, Weekday::Fri], Weekday::Wed, 2)]
    #[case(&[Weekday::Mon, Weekday::Fri], Weekday::Fri, 3)]
    #[case(&[Weekday::Mon], Weekday::Mon, 7)]
    #[case(&[Weekday::Sun], Weekday::Mon, 6)]
    #[case(&[Weekday::Tue, Weekday::Wed], Weekday::Tue, 1)]
    #[case(&[], Weekday::Thu, 7)]
    fn next_route_day_lookahead(
        #[case] route: &[Weekday],
        #[case] today: Weekday,
        #[case] expected: i64,
    ) {
        assert_eq!(days_until_next_route(route, today), expected);
    }

    #[test]
    fn add_days_handles_fractions() {
        let start = at(0, 0);
        assert_eq!(add_days(start, 1.5), start + Duration::hours(36));
        assert_eq!(add_days(start, 999.0), start + Duration::days(999));
    }
}
