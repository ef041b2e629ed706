//! Helpers shared by the HTML source adapters: text cleanup, selector
//! lookups, and listing times on the Denver calendar.

use crate::domain::{Event, EventDraft};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::America::Denver;
use rand::Rng;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use tracing::warn;

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(inner_text).filter(|text| !text.is_empty())
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// First selector in `candidates` whose text passes `accept`.
pub fn first_matching_text(
    element: &ElementRef<'_>,
    candidates: &[Selector],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    candidates
        .iter()
        .filter_map(|selector| first_text(element, selector))
        .find(|text| accept(text))
}

/// Compiles a table of literal selectors; only used from `Lazy` statics.
pub fn compile_selectors(css: &[&str]) -> Vec<Selector> {
    css.iter().map(|s| Selector::parse(s).expect("valid selector")).collect()
}

pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

pub fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

/// Wall-clock time on the Denver calendar as a UTC instant.
///
/// Ambiguous times take the earlier offset; times inside a spring-forward
/// gap move one hour later.
pub fn local_at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let naive = NaiveDateTime::new(date, time);
    let local = match Denver.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => Denver.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    };
    local
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

pub fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Denver).date_naive()
}

/// `days` after today (Denver) at `hour:minute` local time.
pub fn days_ahead_at(now: DateTime<Utc>, days: i64, hour: u32, minute: u32) -> DateTime<Utc> {
    local_at(local_date(now) + Duration::days(days), hour, minute)
}

/// Random slot 1 to 30 days out, starting on the hour between 09:00 and 17:00.
pub fn random_upcoming(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut rng = rand::thread_rng();
    let days = rng.gen_range(1..=30);
    let hour = rng.gen_range(9..=17);
    days_ahead_at(now, days, hour, 0)
}

/// Next occurrence of a fixed yearly date that has not started yet.
pub fn next_annual(now: DateTime<Utc>, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let this_year = local_date(now).year();
    (this_year..this_year + 8)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .map(|date| local_at(date, hour, minute))
        .find(|start| *start > now)
        .unwrap_or_else(|| now + Duration::days(365))
}

/// Finishes a draft, dropping it with a warning when it breaks the schema.
pub fn finish_draft(draft: EventDraft, source: &str) -> Option<Event> {
    match draft.into_event() {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("⚠️ {} dropped a candidate: {}", source, e);
            None
        }
    }
}

/// Keeps the first event for each title.
pub fn dedup_by_title(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events.into_iter().filter(|e| seen.insert(e.title.clone())).collect()
}

/// Keeps the first event for each source URL.
pub fn dedup_by_url(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events.into_iter().filter(|e| seen.insert(e.source_url.clone())).collect()
}
