//! Business-day arithmetic and serde helpers for chrono date types (use data types, not raw strings).
//!
//! Day boundaries are computed in a fixed UTC offset (the shop's local time), never in UTC.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar of the business: a fixed offset from UTC.
#[derive(Clone, Copy, Debug)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    /// `None` when the offset is out of range (more than a day).
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar day of an instant.
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Local midnight at the start of `day`, as a UTC instant.
    pub fn start_of(&self, day: NaiveDate) -> DateTime<Utc> {
        let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
        // Fixed offsets have no gaps or folds, so the local time always maps to one instant.
        self.offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
    }

    /// [day 00:00, day+1 00:00) in local time.
    pub fn day_bounds(&self, day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_of(day);
        (start, start + Duration::days(1))
    }

    pub fn start_of_today(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start_of(self.day_of(now))
    }

    /// (year, month, day) bucket key of an instant in local time.
    pub fn day_key(&self, at: DateTime<Utc>) -> (i32, u32, u32) {
        let day = self.day_of(at);
        (day.year(), day.month(), day.day())
    }
}

/// Deserialize Option<NaiveDate> from null or "YYYY-MM-DD" string.
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn art() -> BusinessCalendar {
        BusinessCalendar::from_offset_minutes(-180).unwrap()
    }

    #[test]
    fn local_midnight_is_three_hours_after_utc_midnight() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let (start, end) = art().day_bounds(day);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 11, 3, 0, 0).unwrap());
    }

    #[test]
    fn late_evening_local_sale_belongs_to_local_day() {
        // 01:30 UTC on the 11th is 22:30 on the 10th in UTC-3.
        let at = Utc.with_ymd_and_hms(2024, 5, 11, 1, 30, 0).unwrap();
        assert_eq!(art().day_key(at), (2024, 5, 10));
        assert_eq!(
            art().start_of_today(at),
            Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_offsets_beyond_a_day() {
        assert!(BusinessCalendar::from_offset_minutes(24 * 60).is_none());
    }
}
