pub mod driver;
pub mod rider;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use crate::error::{AppError, AppResult};

/// RFC 3339 timestamp from a request body.
pub(crate) fn parse_timestamp(raw: Option<&str>) -> AppResult<DateTime<Utc>> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::missing("TIMESTAMP_REQUIRED"))?;

    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| AppError::invalid("INVALID_TIMESTAMP"))
}

pub(crate) fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| AppError::invalid("INVALID_DATE"))
}

/// Accepts `HH:MM` or `HH:MM:SS`.
pub(crate) fn parse_time(raw: &str) -> AppResult<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::invalid("INVALID_TIME"))
}

/// `±HH:MM` offset that local dates and times are given in. UTC if absent.
pub(crate) fn parse_utc_offset(raw: Option<&str>) -> AppResult<FixedOffset> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Utc.fix()),
        Some(raw) => raw
            .parse::<FixedOffset>()
            .map_err(|_| AppError::invalid("INVALID_UTC_OFFSET")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(Some("2026-09-01T08:30:00-04:00")).unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-09-01T12:30:00+00:00");

        assert_eq!(parse_timestamp(None).unwrap_err().code(), "TIMESTAMP_REQUIRED");
        assert_eq!(parse_timestamp(Some(" ")).unwrap_err().code(), "TIMESTAMP_REQUIRED");
        assert_eq!(
            parse_timestamp(Some("tomorrow at 8")).unwrap_err().code(),
            "INVALID_TIMESTAMP"
        );
    }

    #[test]
    fn test_parse_date_and_time() {
        assert_eq!(
            parse_date("2026-09-01").unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
        );
        assert_eq!(parse_date("01/09/2026").unwrap_err().code(), "INVALID_DATE");

        assert_eq!(parse_time("07:45").unwrap(), NaiveTime::from_hms_opt(7, 45, 0).unwrap());
        assert_eq!(parse_time("07:45:30").unwrap(), NaiveTime::from_hms_opt(7, 45, 30).unwrap());
        assert_eq!(parse_time("25:00").unwrap_err().code(), "INVALID_TIME");
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset(None).unwrap(), Utc.fix());
        assert_eq!(parse_utc_offset(Some("")).unwrap(), Utc.fix());
        assert_eq!(
            parse_utc_offset(Some("-04:00")).unwrap(),
            FixedOffset::west_opt(4 * 3600).unwrap()
        );
        assert_eq!(
            parse_utc_offset(Some("+05:30")).unwrap(),
            FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
        );
        assert_eq!(
            parse_utc_offset(Some("Montreal")).unwrap_err().code(),
            "INVALID_UTC_OFFSET"
        );
    }
}
