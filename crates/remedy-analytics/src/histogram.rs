//! Adaptive bucket-size selection for histograms. The returned
//! string is a ClickHouse `INTERVAL` literal built entirely from a table of
//! constants — never from user input — so it is safe to interpolate
//! directly into SQL text (the one documented exception to parameterized
//! binding).

use chrono::Duration;

const SECOND: i64 = 1;
const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// `(range upper bound in seconds, bucket literal)`, first match wins.
const TABLE: &[(i64, &str)] = &[
    (30 * SECOND, "1 SECOND"),
    (2 * MINUTE, "5 SECOND"),
    (5 * MINUTE, "10 SECOND"),
    (15 * MINUTE, "30 SECOND"),
    (1 * HOUR, "1 MINUTE"),
    (6 * HOUR, "5 MINUTE"),
    (24 * HOUR, "15 MINUTE"),
    (7 * DAY, "1 HOUR"),
];

/// Falls back to this when the range exceeds every bound in [`TABLE`].
const FALLBACK: &str = "6 HOUR";

pub fn bucket_interval_sql(range: Duration) -> &'static str {
    let seconds = range.num_seconds().max(0);
    TABLE
        .iter()
        .find(|(bound, _)| seconds <= *bound)
        .map(|(_, literal)| *literal)
        .unwrap_or(FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_five_second_buckets_for_a_two_minute_range() {
        assert_eq!(bucket_interval_sql(Duration::minutes(2)), "5 SECOND");
    }

    #[test]
    fn picks_one_second_buckets_for_very_short_ranges() {
        assert_eq!(bucket_interval_sql(Duration::seconds(10)), "1 SECOND");
    }

    #[test]
    fn picks_one_hour_buckets_at_the_week_boundary() {
        assert_eq!(bucket_interval_sql(Duration::days(7)), "1 HOUR");
    }

    #[test]
    fn falls_back_to_six_hour_buckets_beyond_a_week() {
        assert_eq!(bucket_interval_sql(Duration::days(30)), "6 HOUR");
    }

    #[test]
    fn boundaries_match_the_adaptive_table_exactly() {
        assert_eq!(bucket_interval_sql(Duration::seconds(30)), "1 SECOND");
        assert_eq!(bucket_interval_sql(Duration::seconds(31)), "5 SECOND");
        assert_eq!(bucket_interval_sql(Duration::minutes(15)), "30 SECOND");
        assert_eq!(bucket_interval_sql(Duration::hours(1)), "1 MINUTE");
        assert_eq!(bucket_interval_sql(Duration::hours(6)), "5 MINUTE");
        assert_eq!(bucket_interval_sql(Duration::hours(24)), "15 MINUTE");
    }
}
