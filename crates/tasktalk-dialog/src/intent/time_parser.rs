//! Deadline expressions: relative phrases and absolute dates to calendar days.
//!
//! Supports English and Vietnamese phrasing. Absolute dates are ISO
//! (`2026-12-01`) or day-first (`1/12/2026`).

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use regex::{Captures, Regex};

/// A date expression located inside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub span: Range<usize>,
}

type Resolver = fn(&Captures<'_>, NaiveDate) -> Option<NaiveDate>;

static DATE_RULES: LazyLock<Vec<(Regex, Resolver)>> = LazyLock::new(|| {
    let rules: Vec<(&str, Resolver)> = vec![
        (r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b", resolve_iso),
        (r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b", resolve_day_first),
        (
            r"(?i)\b(?:the\s+)?day\s+after\s+tomorrow\b|\bngày\s+(?:kia|mốt)\b",
            |_, today| today.checked_add_days(Days::new(2)),
        ),
        (r"(?i)\btomorrow\b|\bngày\s+mai\b|^\s*mai\s*$", |_, today| {
            today.checked_add_days(Days::new(1))
        }),
        (
            r"(?i)\b(?:today|tonight|end\s+of\s+(?:the\s+)?day|hôm\s+nay|tối\s+nay)\b",
            |_, today| Some(today),
        ),
        (
            r"(?i)\bin\s+(\d{1,3}|a|an|one)\s+(days?|weeks?|months?)\b",
            resolve_offset,
        ),
        (r"(?i)\b(\d{1,3})\s+(ngày|tuần|tháng)\s+(?:nữa|tới)\b", resolve_offset),
        (r"(?i)\bnext\s+week\b|\btuần\s+(?:sau|tới)\b", |_, today| {
            today.checked_add_days(Days::new(7))
        }),
        (r"(?i)\bnext\s+month\b|\btháng\s+(?:sau|tới)\b", |_, today| {
            today.checked_add_months(Months::new(1))
        }),
        (
            r"(?i)\b(?:end\s+of\s+(?:the\s+)?week|this\s+weekend|cuối\s+tuần)\b",
            |_, today| next_weekday(today, Weekday::Sun, true),
        ),
        (
            r"(?i)\b(?:(?:next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
            resolve_weekday,
        ),
        (
            r"(?i)\bthứ\s+(hai|ba|tư|năm|sáu|bảy|2|3|4|5|6|7)\b|\b(chủ\s+nhật)\b",
            resolve_vietnamese_weekday,
        ),
    ];
    rules
        .into_iter()
        .map(|(pattern, resolver)| (Regex::new(pattern).expect("Invalid date regex"), resolver))
        .collect()
});

/// Find the first date expression in `text`, resolved against `today`.
pub fn find_deadline(text: &str, today: NaiveDate) -> Option<DateMatch> {
    DATE_RULES.iter().find_map(|(regex, resolve)| {
        let caps = regex.captures(text)?;
        let whole = caps.get(0)?;
        let date = resolve(&caps, today)?;
        Some(DateMatch {
            date,
            span: whole.range(),
        })
    })
}

/// Resolve a deadline expression in `text` to a calendar date.
pub fn parse_deadline(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    find_deadline(text, today).map(|m| m.date)
}

fn resolve_iso(caps: &Captures<'_>, _: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )
}

fn resolve_day_first(caps: &Captures<'_>, _: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[2].parse().ok()?,
        caps[1].parse().ok()?,
    )
}

fn resolve_offset(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let amount: u32 = match caps[1].to_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        n => n.parse().ok()?,
    };
    let unit = caps[2].to_lowercase();
    if unit.starts_with("day") || unit == "ngày" {
        today.checked_add_days(Days::new(amount as u64))
    } else if unit.starts_with("week") || unit == "tuần" {
        today.checked_add_days(Days::new(amount as u64 * 7))
    } else {
        today.checked_add_months(Months::new(amount))
    }
}

fn resolve_weekday(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let target = caps[1].to_lowercase().parse::<Weekday>().ok()?;
    next_weekday(today, target, false)
}

fn resolve_vietnamese_weekday(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    if caps.get(2).is_some() {
        return next_weekday(today, Weekday::Sun, false);
    }
    let target = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "hai" | "2" => Weekday::Mon,
        "ba" | "3" => Weekday::Tue,
        "tư" | "4" => Weekday::Wed,
        "năm" | "5" => Weekday::Thu,
        "sáu" | "6" => Weekday::Fri,
        "bảy" | "7" => Weekday::Sat,
        _ => return None,
    };
    next_weekday(today, target, false)
}

/// Next `target` after `today`. With `allow_today`, today itself qualifies.
fn next_weekday(today: NaiveDate, target: Weekday, allow_today: bool) -> Option<NaiveDate> {
    let current = today.weekday().num_days_from_monday();
    let wanted = target.num_days_from_monday();
    let mut ahead = (wanted + 7 - current) % 7;
    if ahead == 0 && !allow_today {
        ahead = 7;
    }
    today.checked_add_days(Days::new(u64::from(ahead)))
}
