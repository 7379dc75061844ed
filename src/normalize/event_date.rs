// src/normalize/event_date.rs
//! Best-effort parser for human-written event dates.
//!
//! Supported families (case-insensitive, weekday prefix optional):
//! - ISO: `2026-10-20`, `2026-10-20 18:00`, `2026-10-20T18:00:00`
//! - month first: `Fri, Oct 3, 8:00 PM`, `Oct 3, 8 PM`, `October 3, 2026`, `Oct 3`
//! - day first: `3 Oct`, `Sat, 3 October 2026, 19:30`
//! - relative: `Today, 8 PM`, `Tomorrow`
//! - ranges (`Oct 3 – Sun, Oct 5`, `Fri, Oct 3, 8 – 10 PM`): the start wins
//!
//! Without a year the reference year is used, rolled forward when the result
//! would sit more than 60 days before the reference date.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EventItem;

const MONTH: &str = r"(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?";
const TIME: &str = r"(?:,?\s*(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*([ap])?\.?m?\.?\b)?";

static RE_ISO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2}))?").unwrap()
});
static RE_MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:[a-z]{{3,9}},?\s+)?{MONTH}\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?{TIME}"
    ))
    .unwrap()
});
static RE_DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:[a-z]{{3,9}},?\s+)?(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH}(?:,?\s+(\d{{4}}))?{TIME}"
    ))
    .unwrap()
});
static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^(today|tonight|tomorrow){TIME}")).unwrap()
});
static RE_MERIDIEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b([ap])\.?m\b").unwrap());
static RE_OWN_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:{MONTH}\s+\d|\d{{1,2}}\s+{MONTH}|(?:mon|tues?|wed|thu|thurs?|fri|sat|sun)(?:[a-z]*day)?\b|today|tonight|tomorrow)"
    ))
    .unwrap()
});

fn month_number(s: &str) -> Option<u32> {
    let m = match s.get(..3)?.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

/// Start segment of a range. Hyphens only count when spaced, so ISO dates survive.
fn range_start(raw: &str) -> &str {
    let cut = [" – ", " — ", " - ", "–", "—"]
        .iter()
        .filter_map(|sep| raw.find(sep))
        .min();
    match cut {
        Some(i) => raw[..i].trim(),
        None => raw.trim(),
    }
}

fn to_time(hour: Option<&str>, minute: Option<&str>, meridiem: Option<char>) -> Option<NaiveTime> {
    let Some(h) = hour else {
        return NaiveTime::from_hms_opt(0, 0, 0);
    };
    let mut h: u32 = h.parse().ok()?;
    let m: u32 = minute.map(str::parse).transpose().ok()?.unwrap_or(0);
    match meridiem {
        Some('p') if h < 12 => h += 12,
        Some('a') if h == 12 => h = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

fn meridiem_of(m: Option<regex::Match<'_>>, fallback: Option<char>) -> Option<char> {
    m.and_then(|m| m.as_str().to_ascii_lowercase().chars().next())
        .or(fallback)
}

fn infer_year(month: u32, day: u32, year: Option<i32>, reference: NaiveDate) -> Option<NaiveDate> {
    if let Some(y) = year {
        return NaiveDate::from_ymd_opt(y, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
    if this_year < reference - Duration::days(60) {
        NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
    } else {
        Some(this_year)
    }
}

/// Parse `raw` relative to `reference` (the day the content is for).
pub fn parse_event_date(raw: &str, reference: NaiveDate) -> Option<NaiveDateTime> {
    let full = raw.trim();
    if full.is_empty() {
        return None;
    }

    if let Some(c) = RE_ISO.captures(full) {
        let d = NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)?;
        let t = to_time(c.get(4).map(|m| m.as_str()), c.get(5).map(|m| m.as_str()), None)?;
        return Some(d.and_time(t));
    }

    let start = range_start(full);
    let end = &full[start.len()..];
    // "8 – 10 PM": the meridiem sits after the range separator. An end that
    // names its own day ("9 – Sun, Oct 25, 5 PM") keeps its meridiem to itself.
    let trailing_meridiem = if RE_OWN_DAY.is_match(end) {
        None
    } else {
        RE_MERIDIEM
            .captures_iter(end)
            .last()
            .and_then(|c| c[1].to_ascii_lowercase().chars().next())
    };

    if let Some(c) = RE_RELATIVE.captures(start) {
        let day = if c[1].eq_ignore_ascii_case("tomorrow") {
            reference + Duration::days(1)
        } else {
            reference
        };
        let t = to_time(c.get(2).map(|m| m.as_str()), c.get(3).map(|m| m.as_str()), meridiem_of(c.get(4), trailing_meridiem))?;
        return Some(day.and_time(t));
    }

    let (month, day, year, hour, minute, mer) = if let Some(c) = RE_MONTH_FIRST.captures(start) {
        (
            month_number(&c[1])?,
            c[2].parse::<u32>().ok()?,
            c.get(3).and_then(|m| m.as_str().parse::<i32>().ok()),
            c.get(4).map(|m| m.as_str()),
            c.get(5).map(|m| m.as_str()),
            meridiem_of(c.get(6), trailing_meridiem),
        )
    } else if let Some(c) = RE_DAY_FIRST.captures(start) {
        (
            month_number(&c[2])?,
            c[1].parse::<u32>().ok()?,
            c.get(3).and_then(|m| m.as_str().parse::<i32>().ok()),
            c.get(4).map(|m| m.as_str()),
            c.get(5).map(|m| m.as_str()),
            meridiem_of(c.get(6), trailing_meridiem),
        )
    } else {
        return None;
    };

    let date = infer_year(month, day, year, reference)?;
    let time = to_time(hour, minute, mer)?;
    Some(date.and_time(time))
}

/// Chronological order; unparsed dates go last, otherwise input order is kept.
pub fn sort_by_start(items: &mut [EventItem]) {
    items.sort_by_key(|e| (e.starts_at.is_none(), e.starts_at));
}
