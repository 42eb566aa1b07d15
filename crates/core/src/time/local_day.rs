use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

const OFFSET_ENV: &str = "TAMIO_RULES_UTC_OFFSET_MINUTES";

// Offsets beyond +/-18h are not valid UTC offsets.
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// Offset used to decide which calendar day "today" is for rule filters.
/// Defaults to UTC, where a day comparison equals the `YYYY-MM-DD` prefix of an
/// RFC 3339 UTC timestamp.
pub fn offset_from_env() -> anyhow::Result<FixedOffset> {
    let Ok(raw) = std::env::var(OFFSET_ENV) else {
        return Ok(utc());
    };
    parse_offset_minutes(&raw)
}

pub fn parse_offset_minutes(raw: &str) -> anyhow::Result<FixedOffset> {
    let minutes: i32 = raw
        .trim()
        .parse()
        .with_context(|| format!("{OFFSET_ENV} must be an integer (got {raw:?})"))?;
    anyhow::ensure!(
        minutes.abs() <= MAX_OFFSET_MINUTES,
        "{OFFSET_ENV} must be within +/-{MAX_OFFSET_MINUTES} (got {minutes})"
    );
    FixedOffset::east_opt(minutes * 60).context("invalid UTC offset")
}

pub fn resolve_today(
    today_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    offset: FixedOffset,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = today_arg {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date {s:?}, expected YYYY-MM-DD"));
    }
    Ok(now_utc.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        let d = resolve_today(Some("2024-02-01"), now, utc()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(resolve_today(Some("01/02/2024"), now, utc()).is_err());
    }

    #[test]
    fn utc_day_by_default() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        let d = resolve_today(None, now, utc()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn positive_offset_rolls_into_next_day() {
        // 23:30 UTC is 08:30 the next morning at UTC+9.
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap();
        let offset = parse_offset_minutes("540").unwrap();
        let d = resolve_today(None, now, offset).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }

    #[test]
    fn rejects_out_of_range_offsets() {
        assert!(parse_offset_minutes("1200").is_err());
        assert!(parse_offset_minutes("abc").is_err());
        assert_eq!(parse_offset_minutes(" -300 ").unwrap().local_minus_utc(), -300 * 60);
    }
}
