//! Timestamps, durations, and parsing them from the loose strings people type.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::{Error, Result};

/// All timestamps are UTC.
pub type Time = DateTime<Utc>;

/// Parses durations like "10 min", "1s", "10 minutes", "1h30m", "2 days", "00:10:00" or a bare
/// number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::parse("empty duration"));
    }
    if s.contains(':') {
        return parse_clock_duration(s);
    }
    if let Ok(secs) = s.parse::<f64>() {
        return Ok(from_seconds(secs));
    }

    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    let mut total = 0.0;
    let mut any = false;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(Error::parse(format!("bad duration {input:?}")));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| Error::parse(format!("bad number in duration {input:?}")))?;
        rest = rest[number_len..].trim_start();

        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = rest[unit_len..].trim_start();
        // "1 min, 30 s"
        rest = rest.trim_start_matches(',').trim_start();

        let scale = if unit.is_empty() {
            1.0
        } else {
            unit_seconds(unit)
                .ok_or_else(|| Error::parse(format!("unknown unit {unit:?} in {input:?}")))?
        };
        total += value * scale;
        any = true;
    }
    if !any {
        return Err(Error::parse(format!("bad duration {input:?}")));
    }
    Ok(from_seconds(if negative { -total } else { total }))
}

/// numpy-style durations: `duration_from_unit(10, "m")` is 10 minutes.
pub fn duration_from_unit(value: i64, unit: &str) -> Result<Duration> {
    let out_of_range = || Error::invalid(format!("{value} {unit} is out of range"));
    let scale = match unit {
        "ms" => return Duration::try_milliseconds(value).ok_or_else(out_of_range),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "D" => 86400,
        "W" => 7 * 86400,
        _ => {
            return Err(Error::invalid(format!(
                "unit should be one of ms, s, m, h, D, W, not {unit:?}"
            )))
        }
    };
    value
        .checked_mul(scale)
        .and_then(Duration::try_seconds)
        .ok_or_else(out_of_range)
}

fn unit_seconds(unit: &str) -> Option<f64> {
    // Upper-case aliases follow the usual frequency strings
    let scale = match unit {
        "ms" | "milli" | "millis" | "millisecond" | "milliseconds" | "L" => 0.001,
        "s" | "sec" | "secs" | "second" | "seconds" | "S" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" | "T" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" | "H" => 3600.0,
        "d" | "day" | "days" | "D" => 86400.0,
        "w" | "week" | "weeks" | "W" => 7.0 * 86400.0,
        _ => return None,
    };
    Some(scale)
}

fn parse_clock_duration(s: &str) -> Result<Duration> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(Error::parse(format!("bad duration {s:?}")));
    }
    let mut total = 0.0;
    for part in parts {
        let value: f64 = part
            .trim()
            .parse()
            .map_err(|_| Error::parse(format!("bad duration {s:?}")))?;
        total = total * 60.0 + value;
    }
    // "10:00" is hours and minutes
    if s.matches(':').count() == 1 {
        total *= 60.0;
    }
    Ok(from_seconds(total))
}

/// Parses timestamps like "2018-05-30 19:00", "2018-05-30T19:00:00Z", RFC 3339, or epoch
/// seconds. Timestamps without an offset are UTC.
pub fn parse_time(input: &str) -> Result<Time> {
    let s = input.trim();
    if let Ok(epoch) = s.parse::<f64>() {
        return from_epoch_seconds(epoch)
            .ok_or_else(|| Error::parse(format!("epoch {s} out of range")));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Ok(t.with_timezone(&Utc));
        }
    }
    let naive = s.trim_end_matches('Z').trim_end_matches(" UTC");
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%d/%m/%Y %H:%M:%S",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        if let Some(t) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    Err(Error::parse(format!("can't understand timestamp {input:?}")))
}

pub fn from_epoch_seconds(epoch: f64) -> Option<Time> {
    from_micros((epoch * 1e6).round() as i64)
}

fn from_micros(us: i64) -> Option<Time> {
    DateTime::from_timestamp(
        us.div_euclid(1_000_000),
        (us.rem_euclid(1_000_000) * 1000) as u32,
    )
}

pub fn epoch_seconds(t: Time) -> f64 {
    t.timestamp_micros() as f64 / 1e6
}

/// Fractional seconds. Microsecond precision is plenty for surveillance data.
pub fn seconds(d: Duration) -> f64 {
    match d.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

pub fn from_seconds(secs: f64) -> Duration {
    Duration::microseconds((secs * 1e6).round() as i64)
}

/// `t + d`, clamped to the earliest or latest representable time instead of overflowing.
pub fn saturating_add(t: Time, d: Duration) -> Time {
    match t.checked_add_signed(d) {
        Some(t) => t,
        None if d < Duration::zero() => DateTime::<Utc>::MIN_UTC,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

pub fn saturating_sub(t: Time, d: Duration) -> Time {
    match t.checked_sub_signed(d) {
        Some(t) => t,
        None if d < Duration::zero() => DateTime::<Utc>::MAX_UTC,
        None => DateTime::<Utc>::MIN_UTC,
    }
}

/// `t1 + pct * (t2 - t1)`
pub fn lerp(t1: Time, t2: Time, pct: f64) -> Time {
    t1 + from_seconds(pct * seconds(t2 - t1))
}

/// Floors a timestamp onto a grid of `step`, anchored at midnight of `origin`'s day.
pub fn floor_to(t: Time, step: Duration, origin: Time) -> Time {
    let anchor = start_of_day(origin);
    let step_us = step.num_microseconds().unwrap_or(i64::MAX).max(1);
    let offset = (t - anchor).num_microseconds().unwrap_or(0);
    anchor + Duration::microseconds(offset.div_euclid(step_us) * step_us)
}

/// Rounds a timestamp to the nearest multiple of `step` since the epoch. Ties go to the even
/// multiple.
pub fn round_to(t: Time, step: Duration) -> Time {
    let step_us = step.num_microseconds().unwrap_or(i64::MAX).max(1);
    let us = t.timestamp_micros();
    let mut q = us.div_euclid(step_us);
    let r = us.rem_euclid(step_us);
    if 2 * r > step_us || (2 * r == step_us && q % 2 != 0) {
        q += 1;
    }
    from_micros(q * step_us).unwrap_or(t)
}

pub fn start_of_day(t: Time) -> Time {
    match t.date_naive().and_hms_opt(0, 0, 0) {
        Some(midnight) => Utc.from_utc_datetime(&midnight),
        None => t,
    }
}

/// Like "0 days 00:10:00"
pub fn format_duration(d: Duration) -> String {
    let sign = if d < Duration::zero() { "-" } else { "" };
    let total_us = d.num_microseconds().unwrap_or(i64::MAX).unsigned_abs();
    let whole = total_us / 1_000_000;
    let micros = total_us % 1_000_000;
    let (days, rest) = (whole / 86400, whole % 86400);
    let (hours, minutes, secs) = (rest / 3600, (rest % 3600) / 60, rest % 60);
    if micros == 0 {
        format!("{sign}{days} days {hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{sign}{days} days {hours:02}:{minutes:02}:{secs:02}.{micros:06}")
    }
}

pub fn format_time(t: Time) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.fZ").to_string()
}
