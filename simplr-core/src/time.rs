//! Wall-clock input and output for due and reminder times.
//!
//! Callers resolve the zone once (from config or a flag) and pass the `Tz`.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const WALL_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A date without a time means the end of that day.
const END_OF_DAY: (u32, u32) = (23, 59);

pub fn resolve_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse()
        .map_err(|_| anyhow!("unknown timezone: {name}"))
}

/// Read "YYYY-MM-DD HH:MM" or "YYYY-MM-DD" as wall time in `zone`.
///
/// A repeated hour (DST fall-back) resolves to its first occurrence; a
/// skipped hour (spring-forward) is rejected.
pub fn parse_local_due_to_utc(input: &str, zone: Tz) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let wall = match NaiveDateTime::parse_from_str(input, WALL_FORMAT) {
        Ok(wall) => wall,
        Err(_) => {
            let day = NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map_err(|_| anyhow!("expected YYYY-MM-DD [HH:MM], got '{input}'"))?;
            let (h, m) = END_OF_DAY;
            day.and_hms_opt(h, m, 0)
                .ok_or_else(|| anyhow!("bad end-of-day time"))?
        }
    };

    match zone.from_local_datetime(&wall) {
        LocalResult::Single(at) => Ok(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Ok(first.with_timezone(&Utc)),
        LocalResult::None => bail!("{input} does not exist in {zone} (DST gap)"),
    }
}

pub fn format_local(at: DateTime<Utc>, zone: Tz) -> String {
    at.with_timezone(&zone).format(WALL_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chicago() -> Tz {
        resolve_zone("America/Chicago").unwrap()
    }

    #[test]
    fn winter_evening_in_chicago() {
        let utc = parse_local_due_to_utc("2026-02-20 23:59", chicago()).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-02-21T05:59:00+00:00");
    }

    #[test]
    fn bare_date_means_end_of_day() {
        let utc = parse_local_due_to_utc(" 2026-02-20 ", chicago()).unwrap();
        assert_eq!(format_local(utc, chicago()), "2026-02-20 23:59");
    }

    #[test]
    fn fall_back_hour_takes_first_occurrence() {
        // 01:30 happens twice on 2026-11-01; the first is still CDT (UTC-5).
        let utc = parse_local_due_to_utc("2026-11-01 01:30", chicago()).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-11-01T06:30:00+00:00");
    }

    #[test]
    fn spring_forward_gap_is_rejected() {
        assert!(parse_local_due_to_utc("2026-03-08 02:30", chicago()).is_err());
    }

    #[test]
    fn rejects_unknown_zone_and_garbage() {
        assert!(resolve_zone("Mars/Olympus").is_err());
        assert!(parse_local_due_to_utc("next tuesday", chicago()).is_err());
    }

    #[test]
    fn format_follows_the_zone() {
        let berlin = resolve_zone("Europe/Berlin").unwrap();
        let utc = parse_local_due_to_utc("2026-07-04 09:30", berlin).unwrap();
        assert_eq!(format_local(utc, berlin), "2026-07-04 09:30");
        assert_eq!(format_local(utc, Tz::UTC), "2026-07-04 07:30");
    }
}
