//! Timestamp cleaning and parsing.
//!
//! Vendor PM exports carry timestamps in inconsistent shapes: parenthetical
//! timezone tags (`"2025-06-10 00:15 (GMT)"`), slash date separators, and
//! clock fields written with dots instead of colons (`"00.15.30"`). The
//! cleaner canonicalizes those into a form the strict parser accepts; rows
//! whose timestamp still fails to parse are dropped by the caller.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const YMD_HMS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const YMD_HM: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const YMD_T_HMS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DMY_HMS: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month]-[year] [hour]:[minute]:[second]");
const DMY_HM: &[BorrowedFormatItem<'static>] =
    format_description!("[day]-[month]-[year] [hour]:[minute]");
const DOTTED_DMY_HMS: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");
const DOTTED_DMY_HM: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]");
const YMD: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const DATETIME_FORMATS: [&[BorrowedFormatItem<'static>]; 7] = [
    YMD_HMS,
    YMD_HM,
    YMD_T_HMS,
    DMY_HMS,
    DMY_HM,
    DOTTED_DMY_HMS,
    DOTTED_DMY_HM,
];

/// Best-effort canonicalization of a raw timestamp string. Pure; never fails.
///
/// Strips `(...)` and `[...]` annotation spans, maps `/` to `-`, rewrites
/// dot-separated clock triples to colons, and trims surrounding whitespace.
pub fn clean_time(raw: &str) -> String {
    let s = strip_spans(raw, b'(', b')');
    let s = strip_spans(&s, b'[', b']');
    let s = s.replace('/', "-");
    let s = rewrite_dotted_clock(&s);
    s.trim().to_string()
}

/// Strict parse of a cleaned timestamp. `None` means the row is malformed.
pub fn parse_timestamp(s: &str) -> Option<PrimitiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(dt) = PrimitiveDateTime::parse(s, format) {
            return Some(dt);
        }
    }
    Date::parse(s, YMD).ok().map(|d| d.midnight())
}

/// Microseconds since the unix epoch; the store's native `Time` unit.
pub fn to_unix_micros(dt: PrimitiveDateTime) -> i64 {
    (dt.assume_utc().unix_timestamp_nanos() / 1_000) as i64
}

pub fn from_unix_micros(micros: i64) -> Option<PrimitiveDateTime> {
    let odt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000).ok()?;
    Some(PrimitiveDateTime::new(odt.date(), odt.time()))
}

/// Partition date string (`YYYY-MM-DD`) for a parsed sample time.
pub fn partition_date(dt: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day()
    )
}

/// Remove `open...close` spans, shortest-match, left to right. An unmatched
/// opener is left in place.
fn strip_spans(s: &str, open: u8, close: u8) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find(open as char) {
        let Some(rel) = rest[start + 1..].find(close as char) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + 1 + rel + 1..];
    }
    out.push_str(rest);
    out
}

/// Rewrite `D.D.D` clock triples (one or two digits per group) to `D:D:D`.
///
/// A triple only matches when it is not part of a longer dotted digit run,
/// so the clock `00.15.30` becomes `00:15:30` while the dotted date
/// `10.06.2025` is left intact for the dotted-date parse formats.
fn rewrite_dotted_clock(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if let Some((end, dot1, dot2)) = match_clock_triple(bytes, i) {
            for j in i..end {
                out.push(if j == dot1 || j == dot2 { b':' } else { bytes[j] });
            }
            i = end;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    // Input was valid UTF-8 and only ASCII dots were replaced by colons.
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

/// Match `\d{1,2}\.\d{1,2}\.\d{1,2}` at `start`, bounded on both sides by
/// non-digit, non-dot characters (or the string ends). Returns the end index
/// and the positions of the two dots.
fn match_clock_triple(bytes: &[u8], start: usize) -> Option<(usize, usize, usize)> {
    if start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
        return None;
    }
    let digits = |mut i: usize| -> Option<usize> {
        let from = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() && i - from < 2 {
            i += 1;
        }
        (i > from).then_some(i)
    };
    // Groups are greedy; only the final group needs the trailing boundary
    // check, since a longer run after group one or two fails the dot match.
    let g1 = digits(start)?;
    if bytes.get(g1) != Some(&b'.') {
        return None;
    }
    let g2 = digits(g1 + 1)?;
    if bytes.get(g2) != Some(&b'.') {
        return None;
    }
    let g3 = digits(g2 + 1)?;
    match bytes.get(g3) {
        Some(b) if b.is_ascii_digit() || *b == b'.' => None,
        _ => Some((g3, g1, g2)),
    }
}
