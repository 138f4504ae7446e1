use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use mas_core::enums::ErrorCategory;
use mas_core::errors::MasError;

/// A user-facing validation error for a bad command-line value.
pub fn invalid_argument(field: &str, raw: &str, reason: impl std::fmt::Display) -> anyhow::Error {
    MasError::new(format!("invalid {field} '{raw}': {reason}"))
        .with_category(ErrorCategory::Validation)
        .with_code("CLI_INVALID_ARGUMENT")
        .with_component("cli")
        .with_context("field", field)
        .into()
}

/// Parse through `FromStr`, routing the error through [`MasError`].
pub fn parse_value<T>(raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    MasError: From<T::Err>,
{
    raw.parse::<T>().map_err(|error| MasError::from(error).into())
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` date at midnight UTC.
pub fn parse_timestamp(raw: &str, field: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| invalid_argument(field, raw, "expected RFC 3339 or YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mas_core::enums::Severity;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("2026-03-01", Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())]
    #[case("2026-03-01T12:30:00Z", Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap())]
    #[case("2026-03-01T14:30:00+02:00", Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap())]
    fn timestamps_parse(#[case] raw: &str, #[case] expected: DateTime<Utc>) {
        assert_eq!(parse_timestamp(raw, "from").unwrap(), expected);
    }

    #[test]
    fn bad_timestamp_is_user_facing() {
        let error = parse_timestamp("yesterday", "from").unwrap_err();
        let mas = error.downcast_ref::<MasError>().unwrap();
        assert!(mas.is_user_facing());
        assert!(mas.message().contains("invalid from 'yesterday'"));
    }

    #[test]
    fn enums_parse_through_core_errors() {
        assert_eq!(parse_value::<Severity>("high").unwrap(), Severity::High);
        let error = parse_value::<Severity>("loud").unwrap_err();
        assert!(error.downcast_ref::<MasError>().unwrap().is_user_facing());
    }
}
