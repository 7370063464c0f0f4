use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("year {0} is outside the allowed range ({MIN_YEAR}-{MAX_YEAR})")]
    YearOutOfRange(i32),
    #[error("month {0} must be between 1 and 12")]
    MonthOutOfRange(u32),
    #[error("day {day} is invalid for month {month} of year {year}")]
    DayOutOfRange { day: u32, month: u32, year: i32 },
    #[error("date \"{0}\" is not in DD.MM.YYYY format")]
    BadFormat(String),
}

/// A calendar day, validated against `[1900, 2100]` and the usual days-per-month
/// rule (including the Gregorian leap-year exception).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    year: i32,
    month: u32,
    day: u32,
}

impl Default for Date {
    fn default() -> Self {
        Date {
            year: 1970,
            month: 1,
            day: 1,
        }
    }
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(month: u32, year: i32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        2 => 28,
        _ => unreachable!("month already validated"),
    }
}

impl Date {
    pub fn new(day: u32, month: u32, year: i32) -> Result<Self, DateError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(DateError::YearOutOfRange(year));
        }
        if !(1..=12).contains(&month) {
            return Err(DateError::MonthOutOfRange(month));
        }
        let max_day = days_in_month(month, year);
        if day < 1 || day > max_day {
            return Err(DateError::DayOutOfRange { day, month, year });
        }
        Ok(Date { year, month, day })
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn month(&self) -> u32 {
        self.month
    }

    #[must_use]
    pub fn day(&self) -> u32 {
        self.day
    }

    #[must_use]
    pub fn in_range(&self, from: &Date, to: &Date) -> bool {
        *self >= *from && *self <= *to
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}.{:04}", self.day, self.month, self.year)
    }
}

impl FromStr for Date {
    type Err = DateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split('.');
        let (Some(d), Some(m), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DateError::BadFormat(value.to_string()));
        };

        let parse_err = || DateError::BadFormat(value.to_string());
        let day: u32 = d.parse().map_err(|_| parse_err())?;
        let month: u32 = m.parse().map_err(|_| parse_err())?;
        let year: i32 = y.parse().map_err(|_| parse_err())?;

        Date::new(day, month, year)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_valid_date() {
        let date: Date = "01.01.2023".parse().unwrap();
        assert_eq!(date.day(), 1);
        assert_eq!(date.month(), 1);
        assert_eq!(date.year(), 2023);
        assert_eq!(date.to_string(), "01.01.2023");
    }

    #[test]
    fn rejects_year_out_of_range() {
        assert_eq!(Date::new(1, 1, 1899), Err(DateError::YearOutOfRange(1899)));
        assert_eq!(Date::new(1, 1, 2101), Err(DateError::YearOutOfRange(2101)));
    }

    #[test]
    fn leap_year_february() {
        assert!(Date::new(29, 2, 2024).is_ok());
        assert!(Date::new(29, 2, 2023).is_err());
        assert!(Date::new(29, 2, 1900).is_err());
        assert!(Date::new(29, 2, 2000).is_ok());
    }

    #[test]
    fn rejects_bad_format() {
        assert!("2023-01-01".parse::<Date>().is_err());
        assert!("01.01".parse::<Date>().is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let a: Date = "01.01.2023".parse().unwrap();
        let b: Date = "02.01.2023".parse().unwrap();
        assert!(a < b);
        assert!(b.in_range(&a, &b));
        assert!(!a.in_range(&b, &b));
    }
}
