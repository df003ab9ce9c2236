//! Transaction date handling
//!
//! Stored dates are fixed-width `DDMMYYYY`. Day-first strings do not sort
//! chronologically, so range checks compare parsed calendar dates.

use chrono::{Datelike, NaiveDate};

use crate::error::OrchestrationError;
use crate::Result;

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    if year.len() != 4 || month.len() != 2 || day.len() != 2 {
        return None;
    }
    let all_digits = [year, month, day]
        .iter()
        .all(|part| part.chars().all(|c| c.is_ascii_digit()));
    if !all_digits {
        return None;
    }

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// Parse a stored `DDMMYYYY` date. Anything else is `None`.
pub fn parse_stored_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.is_ascii() {
        return None;
    }
    ymd(&value[4..8], &value[2..4], &value[0..2])
}

/// Normalize a user or model supplied date.
///
/// Accepts `DDMMYYYY`, `DD/MM/YYYY`, `DD-MM-YYYY`, `DD.MM.YYYY` and ISO
/// `YYYY-MM-DD`. Other spellings are rejected rather than guessed.
pub fn normalize_date(input: &str) -> Result<NaiveDate> {
    let value = input.trim();

    let parsed = if let Some(date) = parse_stored_date(value) {
        Some(date)
    } else {
        let parts: Vec<&str> = value.split(['/', '-', '.']).collect();
        match parts.as_slice() {
            [year, month, day] if year.len() == 4 && value.contains('-') => ymd(year, month, day),
            [day, month, year] => ymd(year, month, day),
            _ => None,
        }
    };

    parsed.ok_or_else(|| {
        OrchestrationError::MalformedInput(format!(
            "Date '{}' is not valid; use DDMMYYYY, e.g. 01012025.",
            value
        ))
    })
}

/// Render as the stored `DDMMYYYY` form
pub fn format_ddmmyyyy(date: NaiveDate) -> String {
    format!("{:02}{:02}{:04}", date.day(), date.month(), date.year())
}

/// Human-readable `DD/MM/YYYY`; unparseable values pass through unchanged.
pub fn display_date(stored: &str) -> String {
    match parse_stored_date(stored) {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => stored.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_spellings() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        for input in ["01022025", "01/02/2025", "01-02-2025", "01.02.2025", "2025-02-01", " 01022025 "] {
            assert_eq!(normalize_date(input).unwrap(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_rejects_ambiguous_or_invalid() {
        for input in ["1/2/2025", "2025/02/01", "32012025", "01132025", "yesterday", "", "010225"] {
            let err = normalize_date(input).unwrap_err();
            assert!(matches!(err, OrchestrationError::MalformedInput(_)), "input {}", input);
        }
    }

    #[test]
    fn test_round_trip_and_display() {
        let date = normalize_date("2025-10-28").unwrap();
        assert_eq!(format_ddmmyyyy(date), "28102025");
        assert_eq!(display_date("28102025"), "28/10/2025");
        assert_eq!(display_date("20251028"), "20251028");
    }

    #[test]
    fn test_day_first_strings_do_not_sort_chronologically() {
        // 15 Jan sorts after 1 Feb as text, so comparisons must use dates
        assert!("15012025" > "01022025");
        assert!(parse_stored_date("15012025").unwrap() < parse_stored_date("01022025").unwrap());
    }
}
