use chrono::{DateTime, Duration, Months, NaiveTime, TimeZone};

/// This is the standard way of printing a calendar date in tracklog exports.
pub fn format_day<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%d/%m/%Y").to_string()
}

/// Suffix used for exported file names.
pub fn file_stamp<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%Y-%m-%d_%H%M%S").to_string()
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> Option<DateTime<Tz>> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).single()
}

/// Steps back whole calendar months. Days that don't exist in the target month are clamped to
/// the month's last day, so 31 May minus 3 months is 28/29 February.
pub fn months_before<Tz: TimeZone>(date: DateTime<Tz>, months: u32) -> DateTime<Tz> {
    date.clone()
        .checked_sub_months(Months::new(months))
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_day, months_before, next_day_start};

    #[test]
    fn test_format_day_pads_components() {
        let date = Utc.with_ymd_and_hms(2024, 1, 5, 23, 0, 0).unwrap();
        assert_eq!(format_day(&date), "05/01/2024");
    }

    #[test]
    fn test_months_before_clamps_to_month_end() {
        let date = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
        assert_eq!(
            months_before(date, 3),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_day_start() {
        let date = Utc.with_ymd_and_hms(2024, 12, 31, 17, 45, 3).unwrap();
        assert_eq!(
            next_day_start(date),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }
}
