//! Date/datetime parsing against the reference implementation's fixed,
//! ordered format lists. Unparseable input is returned unchanged — callers
//! should not treat a `parse_date` result as proof the input was a date.

use chrono::{NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

pub fn parse_date(value: &str) -> String {
    let trimmed = value.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    value.to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

pub fn parse_datetime(value: &str) -> String {
    let trimmed = value.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_date_unchanged() {
        assert_eq!(parse_date("2024-03-05"), "2024-03-05");
    }

    #[test]
    fn parses_dotted_european_date() {
        assert_eq!(parse_date("05.03.2024"), "2024-03-05");
    }

    #[test]
    fn parses_long_month_name() {
        assert_eq!(parse_date("March 5, 2024"), "2024-03-05");
    }

    #[test]
    fn returns_input_unchanged_when_no_format_matches() {
        assert_eq!(parse_date("not a date"), "not a date");
    }

    #[test]
    fn parses_iso_datetime_with_trailing_z() {
        assert_eq!(
            parse_datetime("2024-03-05T10:30:00Z"),
            "2024-03-05T10:30:00"
        );
    }

    #[test]
    fn parses_dotted_datetime_without_seconds() {
        assert_eq!(parse_datetime("05.03.2024 10:30"), "2024-03-05T10:30:00");
    }
}
