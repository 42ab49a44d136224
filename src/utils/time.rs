use chrono::{DateTime, Duration, NaiveTime, TimeZone};


/// Returns start of the next day. Used as the exclusive upper bound when a
/// whole day should be included in a range.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}
