//! Duration text encoding used on the platform boundary.
//!
//! Format: `[-][d.]hh:mm:ss[.fffffff]`, with seven fractional digits
//! (100ns ticks) printed only when the fraction is non-zero. Examples:
//! `00:00:00`, `00:00:01.5000000`, `1.02:03:04`.

use std::time::Duration;

const NANOS_PER_TICK: u32 = 100;
const TICKS_PER_SECOND: u32 = 10_000_000;
const SECONDS_PER_DAY: u64 = 86_400;

/// Format a duration. Sub-tick precision is truncated.
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / SECONDS_PER_DAY;
    let hours = (total_secs % SECONDS_PER_DAY) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let ticks = d.subsec_nanos() / NANOS_PER_TICK;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if ticks > 0 {
        out.push_str(&format!(".{ticks:07}"));
    }
    out
}

/// Parse a duration, returning `None` for anything malformed.
///
/// Accepts `d`, `hh:mm`, `hh:mm:ss`, each optionally prefixed with `d.` and
/// with a 1–7 digit fraction on the seconds. Negative values clamp to zero.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if text.is_empty() {
        return None;
    }

    let parsed = if text.contains(':') {
        parse_clock(text)?
    } else {
        Duration::from_secs(parse_digits(text)?.checked_mul(SECONDS_PER_DAY)?)
    };

    Some(if negative { Duration::ZERO } else { parsed })
}

/// Lenient form for latency fields: malformed or empty text means "no
/// latency observed" and decodes to zero.
pub fn parse_latency(text: &str) -> Duration {
    parse_duration(text).unwrap_or(Duration::ZERO)
}

fn parse_clock(text: &str) -> Option<Duration> {
    let first_colon = text.find(':')?;
    let (days, clock) = match text[..first_colon].find('.') {
        Some(dot) => (parse_digits(&text[..dot])?, &text[dot + 1..]),
        None => (0, text),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds_part) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    let hours = parse_digits(hours)?;
    let minutes = parse_digits(minutes)?;
    let (seconds, ticks) = match seconds_part.split_once('.') {
        Some((s, frac)) => (parse_digits(s)?, parse_fraction(frac)?),
        None => (parse_digits(seconds_part)?, 0),
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let secs = days
        .checked_mul(SECONDS_PER_DAY)?
        .checked_add(hours * 3600 + minutes * 60 + seconds)?;
    Some(Duration::new(secs, ticks * NANOS_PER_TICK))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 18 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Fractional seconds as 100ns ticks; up to seven digits, right-padded.
fn parse_fraction(frac: &str) -> Option<u32> {
    if frac.is_empty() || frac.len() > 7 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = frac.parse().ok()?;
    let scale = 10u32.pow(7 - frac.len() as u32);
    let ticks = value * scale;
    debug_assert!(ticks < TICKS_PER_SECOND);
    Some(ticks)
}
