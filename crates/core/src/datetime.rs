//! Calendar conversions for `DateTime` values.
//!
//! Timestamps are milliseconds since the Unix epoch, UTC, proleptic
//! Gregorian calendar. Only the invariant textual forms are understood:
//! `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.fff]` (a `T` separator is accepted)
//! and `M/D/YYYY [HH:MM:SS]`.

use alloc::format;
use alloc::string::String;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_DAY: i64 = 86_400_000;

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
    }
}

fn parse_num(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_time(s: &str) -> Option<i64> {
    let mut parts = s.split(':');
    let hour = parse_num(parts.next()?)?;
    let minute = parse_num(parts.next()?)?;
    let (second, millis) = match parts.next() {
        None => (0, 0),
        Some(sec) => match sec.split_once('.') {
            Some((whole, frac)) => {
                let frac = frac.get(..frac.len().min(3))?;
                let mut ms = parse_num(frac)?;
                for _ in frac.len()..3 {
                    ms *= 10;
                }
                (parse_num(whole)?, ms)
            }
            None => (parse_num(sec)?, 0),
        },
    };
    if parts.next().is_some() || hour > 23 || minute > 59 || second > 59 {
        return None;
    }
    Some(((hour * 60 + minute) * 60 + second) * MS_PER_SECOND + millis)
}

/// Parses an invariant date or date-time string into epoch milliseconds.
pub fn parse_datetime(text: &str) -> Option<i64> {
    let text = text.trim();
    let (date, time) = match text.find(|c: char| c == ' ' || c == 'T') {
        Some(i) => (&text[..i], Some(text[i + 1..].trim())),
        None => (text, None),
    };

    let (year, month, day) = if date.contains('-') {
        let mut parts = date.split('-');
        let y = parse_num(parts.next()?)?;
        let m = parse_num(parts.next()?)?;
        let d = parse_num(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        (y, m, d)
    } else {
        let mut parts = date.split('/');
        let m = parse_num(parts.next()?)?;
        let d = parse_num(parts.next()?)?;
        let y = parse_num(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        (y, m, d)
    };

    if !(1..=12).contains(&month) {
        return None;
    }
    let (month, day) = (month as u32, day as u32);
    if day == 0 || day > days_in_month(year, month) {
        return None;
    }

    let time_ms = match time {
        Some(t) if !t.is_empty() => parse_time(t)?,
        _ => 0,
    };
    Some(days_from_civil(year, month, day) * MS_PER_DAY + time_ms)
}

/// Formats epoch milliseconds as `YYYY-MM-DD HH:MM:SS[.fff]`.
pub fn format_datetime(millis: i64) -> String {
    let days = millis.div_euclid(MS_PER_DAY);
    let rem = millis.rem_euclid(MS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    let secs = rem / MS_PER_SECOND;
    let ms = rem % MS_PER_SECOND;
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if ms == 0 {
        format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", year, month, day, h, m, s)
    } else {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            year, month, day, h, m, s, ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(parse_datetime("1970-01-01"), Some(0));
        assert_eq!(format_datetime(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_parse_forms() {
        let iso = parse_datetime("2000-02-29 12:30:15").unwrap();
        assert_eq!(parse_datetime("2000-02-29T12:30:15"), Some(iso));
        assert_eq!(parse_datetime("2/29/2000 12:30:15"), Some(iso));
        assert_eq!(format_datetime(iso), "2000-02-29 12:30:15");
    }

    #[test]
    fn test_rejects_invalid_dates() {
        assert_eq!(parse_datetime("1999-02-29"), None);
        assert_eq!(parse_datetime("2000-13-01"), None);
        assert_eq!(parse_datetime("2000-01-01 25:00"), None);
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_pre_epoch_round_trip() {
        let ts = parse_datetime("1969-12-31 23:59:59.5").unwrap();
        assert_eq!(ts, -500);
        assert_eq!(format_datetime(ts), "1969-12-31 23:59:59.500");
    }
}
