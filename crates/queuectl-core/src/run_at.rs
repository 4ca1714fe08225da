use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::error::QueueError;

/// Parse the `run_at` enqueue field.
///
/// Accepts either an ISO-8601 timestamp or the shorthand `"in <N>"` meaning
/// "N minutes from now". Anything else is a validation error.
pub fn parse_run_at(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, QueueError> {
    let trimmed = raw.trim();

    if trimmed.len() >= 3 && trimmed[..3].eq_ignore_ascii_case("in ") {
        let rest = trimmed[3..].trim();
        let minutes: i64 = rest.parse().map_err(|_| {
            QueueError::Validation(
                "invalid 'run_at' format (expected 'in <minutes>' or ISO timestamp)".to_string(),
            )
        })?;
        return Ok((now + Duration::minutes(minutes)).trunc_subsecs(0));
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|_| {
            QueueError::Validation(
                "invalid 'run_at' format (expected 'in <minutes>' or ISO timestamp)".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_in_minutes_shorthand() {
        let now = Utc::now().trunc_subsecs(0);
        let got = parse_run_at("in 5", now).unwrap();
        assert_eq!(got, now + Duration::minutes(5));
    }

    #[test]
    fn parses_iso8601_timestamp() {
        let now = Utc::now().trunc_subsecs(0);
        let got = parse_run_at("2030-01-01T00:00:00Z", now).unwrap();
        assert_eq!(got.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_unparsable_values() {
        let now = Utc::now();
        assert!(parse_run_at("whenever", now).is_err());
        assert!(parse_run_at("in soon", now).is_err());
    }
}
