//! Order processing time: whole days between two month/day/year dates

use chrono::NaiveDate;

/// Month/day/year with optional zero padding, e.g. `1/6/2015` or `01/06/2015`
pub const DATE_FORMAT: &str = "%m/%d/%Y";

const MILLIS_PER_DAY: i64 = 86_400_000;

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Days from `start` to `end`, truncated toward zero. Negative when `end`
/// precedes `start`. Any missing or malformed date yields 0.
pub fn processing_days(start: Option<&str>, end: Option<&str>) -> i64 {
    let (Some(start), Some(end)) = (start.and_then(parse_date), end.and_then(parse_date)) else {
        return 0;
    };
    end.signed_duration_since(start).num_milliseconds() / MILLIS_PER_DAY
}
