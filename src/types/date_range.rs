use crate::resolver::error::ResolveError;
use crate::utils::days_in_month;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// A calendar month, `Month(year, month)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Month(pub i32, pub u32);

impl Month {
    pub fn year(self) -> i32 {
        self.0
    }
    pub fn month(self) -> u32 {
        self.1
    }
    pub fn of(date: NaiveDate) -> Self {
        Self(date.year(), date.month())
    }
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.0, self.1)
    }
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Fails with [`ResolveError::InvertedDateRange`] when `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ResolveError> {
        if end < start {
            return Err(ResolveError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Months touched by the range, in order.
    pub fn months(&self) -> Vec<Month> {
        let mut months = Vec::new();
        let mut current = Month::of(self.start);
        let last = Month::of(self.end);
        while current <= last {
            months.push(current);
            current = if current.1 == 12 {
                Month(current.0 + 1, 1)
            } else {
                Month(current.0, current.1 + 1)
            };
        }
        months
    }

    pub fn years(&self) -> Vec<i32> {
        (self.start.year()..=self.end.year()).collect()
    }

    /// The requested days that fall in `month`.
    pub fn days_in_month(&self, month: Month) -> Vec<NaiveDate> {
        let Some(last) = days_in_month(month.0, month.1) else {
            return Vec::new();
        };
        (1..=last)
            .filter_map(|d| NaiveDate::from_ymd_opt(month.0, month.1, d))
            .filter(|d| self.contains(*d))
            .collect()
    }

    /// The requested months that fall in `year`.
    pub fn months_in_year(&self, year: i32) -> Vec<Month> {
        self.months().into_iter().filter(|m| m.0 == year).collect()
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}
