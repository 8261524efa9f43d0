use std::collections::HashSet;

use chrono::{Datelike, Duration, Months, NaiveDate, Utc, Weekday};
use tracing::{debug, warn};

use crate::models::{DateRangeQuery, FlexibleSearchParams, PreferredDaysInput, SchedulingError};

/// Hard ceiling on how many days a single search may cover. Longer ranges
/// are truncated from the start.
pub const MAX_SEARCH_DAYS: i64 = 21;

/// Which preferred-day fallback applies when the caller named none.
/// Convenience queries ("next week", "next month") default to midweek;
/// explicit-range and fully flexible queries search every day. The
/// asymmetry is inherited behavior, kept as documented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayFallback {
    Midweek,
    AllDays,
}

/// Resolves a flexible query descriptor into a concrete, bounded range
/// plus a preferred-weekday set. `today` is the practice-local date, always
/// injected by the caller so resolution stays a pure function of its
/// inputs.
pub struct DateRangeResolver;

impl DateRangeResolver {
    pub fn resolve(
        params: &FlexibleSearchParams,
        today: NaiveDate,
    ) -> Result<DateRangeQuery, SchedulingError> {
        let preferred = parse_preferred_days(params.preferred_days.as_ref());

        // Priority 1: an explicit range beats every relative form.
        if params.date_range_start.is_some() || params.date_range_end.is_some() {
            return Self::resolve_explicit(params, today, preferred);
        }

        // Priority 2: a 7-day block N weeks out.
        if let Some(weeks) = params.weeks_from_now {
            if weeks < 0 {
                return Err(SchedulingError::InvalidRange(
                    "weeks_from_now cannot be negative".to_string(),
                ));
            }
            let start = today + Duration::weeks(weeks);
            let end = start + Duration::days(6);
            let description = format!("the week of {}", start.format("%B %-d"));
            return finalize(start, end, today, preferred, DayFallback::Midweek, description);
        }

        // Priority 3: the W-th 7-day block of a month.
        if let Some(week) = params.specific_week_of_month {
            let offset = params.target_month_offset.unwrap_or(0);
            return Self::resolve_week_of_month(week, offset, today, preferred);
        }

        // Priority 4: a whole calendar month.
        if let Some(offset) = params.target_month_offset {
            let month_start = month_start(today, offset)?;
            let end = end_of_month(month_start);
            let description = month_start.format("%B %Y").to_string();
            return finalize(month_start, end, today, preferred, DayFallback::Midweek, description);
        }

        // Priority 5: nothing set, search the coming week.
        let end = today + Duration::days(6);
        finalize(
            today,
            end,
            today,
            preferred,
            DayFallback::AllDays,
            "the next 7 days".to_string(),
        )
    }

    fn resolve_explicit(
        params: &FlexibleSearchParams,
        today: NaiveDate,
        preferred: HashSet<Weekday>,
    ) -> Result<DateRangeQuery, SchedulingError> {
        let parse = |raw: &str| {
            parse_flexible_date(raw, today).ok_or_else(|| {
                SchedulingError::InvalidRange(format!("could not understand the date '{}'", raw))
            })
        };

        let start = params.date_range_start.as_deref().map(parse).transpose()?;
        let end = params.date_range_end.as_deref().map(parse).transpose()?;

        let (start, end) = match (start, end) {
            (Some(s), Some(e)) => (s, e),
            // A lone start means "the week starting then".
            (Some(s), None) => (s, s + Duration::days(6)),
            // A lone end means "anything between now and then".
            (None, Some(e)) => (today, e),
            (None, None) => unreachable!("explicit branch requires at least one endpoint"),
        };

        if end < start {
            return Err(SchedulingError::InvalidRange(format!(
                "range ends ({}) before it starts ({})",
                end, start
            )));
        }

        let description = format!(
            "{} through {}",
            start.format("%B %-d"),
            end.format("%B %-d, %Y")
        );
        finalize(start, end, today, preferred, DayFallback::AllDays, description)
    }

    fn resolve_week_of_month(
        week: u32,
        month_offset: u32,
        today: NaiveDate,
        preferred: HashSet<Weekday>,
    ) -> Result<DateRangeQuery, SchedulingError> {
        let first = month_start(today, month_offset)?;
        let month_name = first.format("%B %Y").to_string();
        let days_in_month = (end_of_month(first) - first).num_days() + 1;

        let first_day_of_block = match week {
            0 => {
                return Err(SchedulingError::InvalidWeek { week, month: month_name });
            }
            w => (w as i64 - 1) * 7 + 1,
        };
        if first_day_of_block > days_in_month {
            return Err(SchedulingError::InvalidWeek { week, month: month_name });
        }

        let start = first + Duration::days(first_day_of_block - 1);
        let end = (start + Duration::days(6)).min(end_of_month(first));
        let description = format!("the {} week of {}", ordinal(week), month_name);
        finalize(start, end, today, preferred, DayFallback::Midweek, description)
    }
}

fn finalize(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    preferred: HashSet<Weekday>,
    fallback: DayFallback,
    mut description: String,
) -> Result<DateRangeQuery, SchedulingError> {
    if end < today {
        return Err(SchedulingError::InvalidRange(
            "that range is entirely in the past".to_string(),
        ));
    }

    // Never search days that have already gone by.
    let start = start.max(today);
    let mut end = end;
    let mut truncated = false;

    if (end - start).num_days() + 1 > MAX_SEARCH_DAYS {
        end = start + Duration::days(MAX_SEARCH_DAYS - 1);
        truncated = true;
        description.push_str(" (first 21 days)");
    }

    let preferred_weekdays = if preferred.is_empty() {
        match fallback {
            DayFallback::Midweek => HashSet::from([Weekday::Tue, Weekday::Wed]),
            DayFallback::AllDays => HashSet::from([
                Weekday::Sun,
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ]),
        }
    } else {
        preferred
    };

    debug!(
        "Resolved search range {} .. {} ({})",
        start, end, description
    );

    Ok(DateRangeQuery {
        start_date: start,
        end_date: end,
        preferred_weekdays,
        range_description: description,
        truncated,
    })
}

/// Accepts the concrete shapes the external language parser emits:
/// ISO dates, US dates, today/tomorrow, and bare day offsets.
pub fn parse_flexible_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = raw.trim();

    match trimmed.to_lowercase().as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(date);
    }

    // Bare numbers are day offsets from today.
    if let Ok(offset) = trimmed.trim_start_matches('+').parse::<i64>() {
        if (0..=365).contains(&offset) {
            return Some(today + Duration::days(offset));
        }
    }

    None
}

/// Normalize day-preference input into a weekday set. Unrecognized tokens
/// are dropped rather than failing the request.
pub fn parse_preferred_days(input: Option<&PreferredDaysInput>) -> HashSet<Weekday> {
    let tokens: Vec<String> = match input {
        None => vec![],
        Some(PreferredDaysInput::List(values)) => values.clone(),
        Some(PreferredDaysInput::Delimited(raw)) => raw
            .split([',', ';', '|', '/'])
            .map(str::to_string)
            .collect(),
    };

    let mut days = HashSet::new();
    for token in tokens {
        match weekday_from_token(&token) {
            Some(day) => {
                days.insert(day);
            }
            None if token.trim().is_empty() => {}
            None => warn!("Dropping unrecognized preferred day '{}'", token.trim()),
        }
    }
    days
}

fn weekday_from_token(token: &str) -> Option<Weekday> {
    match token.trim().to_lowercase().as_str() {
        "sun" | "sunday" => Some(Weekday::Sun),
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "weds" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        _ => None,
    }
}

fn month_start(today: NaiveDate, offset: u32) -> Result<NaiveDate, SchedulingError> {
    let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
        .expect("first of current month is always valid");

    this_month
        .checked_add_months(Months::new(offset))
        .ok_or_else(|| SchedulingError::InvalidRange("month offset too large".to_string()))
}

fn end_of_month(month_start: NaiveDate) -> NaiveDate {
    month_start
        .checked_add_months(Months::new(1))
        .map(|next| next - Duration::days(1))
        .unwrap_or(month_start)
}

fn ordinal(n: u32) -> String {
    let suffix = match n {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Practice-local today, the anchor for every relative form.
pub fn local_today(tz: &chrono_tz::Tz) -> NaiveDate {
    Utc::now().with_timezone(tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // A Friday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params() -> FlexibleSearchParams {
        FlexibleSearchParams::default()
    }

    #[test]
    fn nothing_set_defaults_to_the_coming_week_all_days() {
        let range = DateRangeResolver::resolve(&params(), today()).unwrap();

        assert_eq!(range.start_date, today());
        assert_eq!(range.end_date, date(2026, 8, 13));
        assert_eq!(range.preferred_weekdays.len(), 7);
        assert!(!range.truncated);
    }

    #[test]
    fn weeks_from_now_resolves_a_seven_day_block() {
        let mut p = params();
        p.weeks_from_now = Some(3);

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, date(2026, 8, 28));
        assert_eq!(range.end_date, date(2026, 9, 3));
        // Convenience query: midweek default.
        assert_eq!(
            range.preferred_weekdays,
            HashSet::from([Weekday::Tue, Weekday::Wed])
        );
    }

    #[test]
    fn explicit_range_wins_over_weeks_from_now() {
        let mut p = params();
        p.weeks_from_now = Some(3);
        p.date_range_start = Some("2026-08-10".to_string());
        p.date_range_end = Some("2026-08-14".to_string());

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, date(2026, 8, 10));
        assert_eq!(range.end_date, date(2026, 8, 14));
    }

    #[test]
    fn malformed_explicit_range_is_rejected() {
        let mut p = params();
        p.date_range_start = Some("not a date".to_string());
        p.date_range_end = Some("2026-08-14".to_string());

        assert_matches!(
            DateRangeResolver::resolve(&p, today()),
            Err(SchedulingError::InvalidRange(_))
        );
    }

    #[test]
    fn reversed_explicit_range_is_rejected() {
        let mut p = params();
        p.date_range_start = Some("2026-08-14".to_string());
        p.date_range_end = Some("2026-08-10".to_string());

        assert_matches!(
            DateRangeResolver::resolve(&p, today()),
            Err(SchedulingError::InvalidRange(_))
        );
    }

    #[test]
    fn lone_start_becomes_a_week_block() {
        let mut p = params();
        p.date_range_start = Some("2026-08-10".to_string());

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, date(2026, 8, 10));
        assert_eq!(range.end_date, date(2026, 8, 16));
    }

    #[test]
    fn fifth_week_of_a_four_week_month_is_invalid() {
        // February 2027 has 28 days.
        let feb_today = date(2027, 2, 1);
        let mut p = params();
        p.specific_week_of_month = Some(5);
        p.target_month_offset = Some(0);

        assert_matches!(
            DateRangeResolver::resolve(&p, feb_today),
            Err(SchedulingError::InvalidWeek { week: 5, .. })
        );
    }

    #[test]
    fn fifth_week_of_a_long_month_is_a_short_block() {
        // August 2026 has 31 days; the 5th block is the 29th-31st.
        let mut p = params();
        p.specific_week_of_month = Some(5);
        p.target_month_offset = Some(0);

        let range = DateRangeResolver::resolve(&p, date(2026, 8, 1)).unwrap();
        assert_eq!(range.start_date, date(2026, 8, 29));
        assert_eq!(range.end_date, date(2026, 8, 31));
    }

    #[test]
    fn second_week_of_next_month_resolves() {
        let mut p = params();
        p.specific_week_of_month = Some(2);
        p.target_month_offset = Some(1);

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, date(2026, 9, 8));
        assert_eq!(range.end_date, date(2026, 9, 14));
    }

    #[test]
    fn month_offset_alone_covers_the_month_capped_at_21_days() {
        let mut p = params();
        p.target_month_offset = Some(1);

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, date(2026, 9, 1));
        assert_eq!(range.end_date, date(2026, 9, 21));
        assert!(range.truncated);
        assert!(range.range_description.contains("first 21 days"));
    }

    #[test]
    fn current_month_clamps_start_to_today() {
        let mut p = params();
        p.target_month_offset = Some(0);

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.start_date, today());
    }

    #[test]
    fn preferred_days_parse_from_list_and_string() {
        let from_list = parse_preferred_days(Some(&PreferredDaysInput::List(vec![
            "Wednesday".to_string(),
            "FRI".to_string(),
        ])));
        assert_eq!(from_list, HashSet::from([Weekday::Wed, Weekday::Fri]));

        let from_string =
            parse_preferred_days(Some(&PreferredDaysInput::Delimited("tue, thu".to_string())));
        assert_eq!(from_string, HashSet::from([Weekday::Tue, Weekday::Thu]));
    }

    #[test]
    fn bad_day_tokens_are_dropped_not_fatal() {
        let days = parse_preferred_days(Some(&PreferredDaysInput::Delimited(
            "monday, someday, fri".to_string(),
        )));
        assert_eq!(days, HashSet::from([Weekday::Mon, Weekday::Fri]));
    }

    #[test]
    fn flexible_date_forms() {
        assert_eq!(parse_flexible_date("2026-09-01", today()), Some(date(2026, 9, 1)));
        assert_eq!(parse_flexible_date("09/01/2026", today()), Some(date(2026, 9, 1)));
        assert_eq!(parse_flexible_date("today", today()), Some(today()));
        assert_eq!(parse_flexible_date("tomorrow", today()), Some(date(2026, 8, 8)));
        assert_eq!(parse_flexible_date("10", today()), Some(date(2026, 8, 17)));
        assert_eq!(parse_flexible_date("gibberish", today()), None);
    }

    #[test]
    fn past_range_is_rejected() {
        let mut p = params();
        p.date_range_start = Some("2026-07-01".to_string());
        p.date_range_end = Some("2026-07-10".to_string());

        assert_matches!(
            DateRangeResolver::resolve(&p, today()),
            Err(SchedulingError::InvalidRange(_))
        );
    }

    #[test]
    fn named_preferred_days_override_the_midweek_default() {
        let mut p = params();
        p.weeks_from_now = Some(1);
        p.preferred_days = Some(PreferredDaysInput::Delimited("saturday".to_string()));

        let range = DateRangeResolver::resolve(&p, today()).unwrap();
        assert_eq!(range.preferred_weekdays, HashSet::from([Weekday::Sat]));
    }
}
