use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

/// Day-count breakdown of a calendar window.
///
/// Excluded days are the set-union of weekend dates and holiday dates, so a
/// holiday falling on a Saturday or Sunday is subtracted exactly once.
/// `weekend_days` and `holiday_days` are reported as raw counts for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBreakdown {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub period_days: i64,
    pub weekend_days: i64,
    pub holiday_days: i64,
    pub active_days: i64,
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_business_day(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date) && !holidays.contains(&date)
}

/// Inclusive trailing window of `days` calendar days ending at `today`.
pub fn trailing_window(today: NaiveDate, days: i64) -> (NaiveDate, NaiveDate) {
    let days = days.max(1);
    (today - Duration::days(days - 1), today)
}

/// Most recent Mon-Fri on or before `date`.
pub fn previous_weekday(date: NaiveDate) -> NaiveDate {
    let mut d = date;
    while is_weekend(d) {
        d -= Duration::days(1);
    }
    d
}

pub fn period_breakdown(
    from: NaiveDate,
    to: NaiveDate,
    holidays: &HashSet<NaiveDate>,
) -> PeriodBreakdown {
    let (from, to) = if from <= to { (from, to) } else { (to, from) };

    let mut period_days = 0i64;
    let mut weekend_days = 0i64;
    let mut holiday_days = 0i64;
    let mut excluded_days = 0i64;

    let mut d = from;
    while d <= to {
        period_days += 1;
        let weekend = is_weekend(d);
        let holiday = holidays.contains(&d);
        if weekend {
            weekend_days += 1;
        }
        if holiday {
            holiday_days += 1;
        }
        if weekend || holiday {
            excluded_days += 1;
        }
        d += Duration::days(1);
    }

    PeriodBreakdown {
        date_from: from,
        date_to: to,
        period_days,
        weekend_days,
        holiday_days,
        active_days: (period_days - excluded_days).max(0),
    }
}

pub fn load_holidays(conn: &Connection) -> rusqlite::Result<HashSet<NaiveDate>> {
    let mut stmt = conn.prepare("SELECT date FROM holidays")?;
    let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
    let mut out = HashSet::new();
    for row in rows {
        let raw = row?;
        if let Ok(d) = NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            out.insert(d);
        }
    }
    Ok(out)
}
