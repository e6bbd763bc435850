//! Date range helpers for ArchivesSpace date subrecords.
//!
//! ArchivesSpace stores `begin`/`end` as partial ISO dates (`YYYY`,
//! `YYYY-MM` or `YYYY-MM-DD`). Downstream consumers need full dates, so
//! partial start dates are widened to the first day of the period and
//! partial end dates to its last day.

use crate::api::{ArchivesSpaceError, ArchivesSpaceResult};
use crate::types::DateRecord;
use chrono::{Datelike, NaiveDate};

const OUTPUT_FORMAT: &str = "%Y-%m-%d";

/// Earliest begin and latest end across a list of dates.
///
/// Single dates contribute their `begin` as an end. Values are compared as
/// strings, which orders partial ISO dates correctly.
pub fn date_range(dates: &[DateRecord]) -> ArchivesSpaceResult<(String, String)> {
    let mut start: Option<&str> = None;
    let mut end: Option<&str> = None;

    for date in dates {
        let begin = date
            .begin
            .as_deref()
            .ok_or_else(|| missing_field("begin"))?;
        let finish = if date.is_single() {
            begin
        } else {
            date.end.as_deref().ok_or_else(|| missing_field("end"))?
        };

        if start.map_or(true, |current| begin < current) {
            start = Some(begin);
        }
        if end.map_or(true, |current| finish > current) {
            end = Some(finish);
        }
    }

    match (start, end) {
        (Some(start), Some(end)) => Ok((start.to_string(), end.to_string())),
        _ => Err(ArchivesSpaceError::EmptyDates),
    }
}

/// Normalizes a start/end pair to `YYYY-MM-DD`.
///
/// End dates of the form `YYYY` become December 31st and `YYYY-MM` the last
/// day of that month. Full end dates are validated and returned unchanged.
pub fn format_date_range(start: &str, end: &str) -> ArchivesSpaceResult<(String, String)> {
    let formatted_start = parse_partial_date(start)?.format(OUTPUT_FORMAT).to_string();

    let parsed_end = parse_partial_date(end)?;
    let formatted_end = match end.len() {
        4 => end_of_year(parsed_end).format(OUTPUT_FORMAT).to_string(),
        7 => end_of_month(parsed_end, end)?.format(OUTPUT_FORMAT).to_string(),
        _ => end.to_string(),
    };

    Ok((formatted_start, formatted_end))
}

/// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, filling missing parts with 1.
pub fn parse_partial_date(value: &str) -> ArchivesSpaceResult<NaiveDate> {
    let invalid = |reason: &str| ArchivesSpaceError::InvalidDate {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = value.split('-').collect();
    let expected_widths: &[usize] = match parts.len() {
        1 => &[4],
        2 => &[4, 2],
        3 => &[4, 2, 2],
        _ => return Err(invalid("expected YYYY, YYYY-MM or YYYY-MM-DD")),
    };

    let mut numbers = [1u32; 3];
    for (index, (part, width)) in parts.iter().zip(expected_widths).enumerate() {
        if part.len() != *width || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected YYYY, YYYY-MM or YYYY-MM-DD"));
        }
        numbers[index] = part
            .parse()
            .map_err(|_| invalid("component is not a number"))?;
    }

    let year = i32::try_from(numbers[0]).map_err(|_| invalid("year out of range"))?;
    NaiveDate::from_ymd_opt(year, numbers[1], numbers[2])
        .ok_or_else(|| invalid("no such calendar date"))
}

fn end_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}

fn end_of_month(date: NaiveDate, original: &str) -> ArchivesSpaceResult<NaiveDate> {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .ok_or_else(|| ArchivesSpaceError::InvalidDate {
            value: original.to_string(),
            reason: "month end out of range".to_string(),
        })
}

fn missing_field(field: &str) -> ArchivesSpaceError {
    ArchivesSpaceError::MissingDateField {
        field: field.to_string(),
    }
}
