use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Compute the next run time after a failed attempt.
///
/// `base` is `config.backoff_base` (default 2); `attempts` is the
/// post-increment attempt count. `delay_seconds = base ^ max(1, attempts)`,
/// truncated to whole-second precision as the store's timestamp format
/// requires.
pub fn next_run_at(base: i64, attempts: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let exponent = attempts.max(1) as u32;
    let delay_seconds = base.pow(exponent);
    (now + Duration::seconds(delay_seconds)).trunc_subsecs(0)
}
